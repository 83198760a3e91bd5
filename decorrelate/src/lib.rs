//! ## Background
//!
//! SQL dialects that lack lateral join support cannot execute a plan containing
//! `CROSS APPLY`/`OUTER APPLY` tables, nor a scalar subquery in a projection list
//! that references columns of an enclosing scope. Decorrelation rewrites such a
//! plan into an equivalent one built only from ordinary INNER/LEFT/CROSS joins,
//! plus per-partition row numbering where a "first matching row" has to be
//! selected without lateral evaluation. The rewrite must preserve result-set
//! semantics exactly: same rows, same values, same multiplicities.
//!
//! The engine is a pure tree transformation. It consumes a fully resolved plan
//! produced by an upstream logical-plan builder and hands back a plan of the
//! same node vocabulary to a downstream SQL-text emitter. A construct whose
//! correlation cannot be extracted without changing semantics is returned
//! unchanged rather than failing: the policy is silent non-transformation, with
//! a diagnostic recorded per declined node (see [`rewrite::SkipReason`]).
//!
//! ## Design
//!
//! * [`plan`] Plan tree: [`plan::Select`] nodes, projections, orderings.
//! * [`table`] FROM-list vocabulary: base tables, joins, applies, derived tables.
//! * [`expr`] Expression tree: columns, operators, scalar subqueries, row numbering.
//! * [`analyze`] Outer-reference analysis over expressions and selects.
//! * [`rewrite`] The decorrelation passes: apply rewriting, correlated-join
//!   rewriting, scalar-subquery rewriting, plus predicate splitting and column
//!   exposure shared between them.
//! * [`validate`] Structural invariant checks used by tests and debug builds.
//!
//! ## Reference
//!
//! 1. Seshadri, P., Pirahesh, H. and Leung, T.Y.C., 1996. Complex query
//! decorrelation. In Proceedings of the Twelfth International Conference on
//! Data Engineering (pp. 450-458).
//! 2. Galindo-Legaria, C. and Joshi, M., 2001. Orthogonal optimization of
//! subqueries and aggregation. In Proceedings of the 2001 ACM SIGMOD
//! international conference on Management of data (pp. 571-581).
//! 3. Neumann, T. and Kemper, A., 2015. Unnesting arbitrary queries. In
//! Datenbanksysteme für Business, Technologie und Web (BTW 2015).

#[macro_use]
extern crate lazy_static;

pub mod analyze;
pub mod error;
pub mod expr;
pub mod plan;
pub mod rewrite;
pub mod table;
pub mod validate;
