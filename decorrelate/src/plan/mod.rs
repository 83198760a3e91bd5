//! The plan tree.
//!
//! A plan is a single [`Select`] root. Nodes are immutable and shared through
//! [`SelectRef`]; rewriters rebuild changed spines and return the original
//! reference when nothing changed, so "did anything change" is a pointer
//! comparison all the way up.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;

mod builder;
pub use builder::*;
pub mod explain;
pub mod visit;

use crate::expr::{Expr, ExprRef};
use crate::table::{Table, TableAttrs};

pub type SelectRef = Arc<Select>;

/// One output column of a select: an expression bound to an output alias.
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    pub expr: ExprRef,
    pub alias: String,
}

impl Projection {
    pub fn new(expr: ExprRef, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: alias.into(),
        }
    }
}

impl Display for Projection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS {}", self.expr, self.alias)
    }
}

/// One sort key of a select.
#[derive(Clone, Debug, PartialEq)]
pub struct Ordering {
    pub expr: ExprRef,
    pub asc: bool,
}

impl Ordering {
    pub fn asc(expr: ExprRef) -> Self {
        Self { expr, asc: true }
    }

    pub fn desc(expr: ExprRef) -> Self {
        Self { expr, asc: false }
    }
}

impl Display for Ordering {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, if self.asc { "ASC" } else { "DESC" })
    }
}

/// A select statement: ordered table list, optional predicate, grouping,
/// projections, orderings and an offset/limit window, under a unique alias.
#[derive(Clone, Debug, PartialEq)]
pub struct Select {
    alias: String,
    tables: Vec<Table>,
    predicate: Option<ExprRef>,
    group_by: Vec<ExprRef>,
    having: Option<ExprRef>,
    projections: Vec<Projection>,
    order_by: Vec<Ordering>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl Select {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn predicate(&self) -> Option<&ExprRef> {
        self.predicate.as_ref()
    }

    pub fn group_by(&self) -> &[ExprRef] {
        &self.group_by
    }

    pub fn having(&self) -> Option<&ExprRef> {
        self.having.as_ref()
    }

    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    pub fn order_by(&self) -> &[Ordering] {
        &self.order_by
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Aliases of the direct FROM-list entries, in declaration order.
    pub fn table_aliases(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.alias())
    }

    pub fn owns_alias(&self, alias: &str) -> bool {
        self.table_aliases().any(|a| a == alias)
    }

    /// Output projection whose alias is `alias`.
    pub fn projection(&self, alias: &str) -> Option<&Projection> {
        self.projections.iter().find(|p| p.alias == alias)
    }

    /// Whether any projection aggregates at this select's level.
    pub fn has_aggregate_projection(&self) -> bool {
        self.projections
            .iter()
            .any(|p| crate::expr::contains_aggregate(&p.expr))
    }

    pub fn to_builder(&self) -> SelectBuilder {
        SelectBuilder::from_select(self)
    }
}

impl Display for Select {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Select {{ alias: {:?}", self.alias)?;
        write!(
            f,
            ", projections: [{}]",
            self.projections.iter().map(|p| p.to_string()).join(", ")
        )?;
        if let Some(predicate) = &self.predicate {
            write!(f, ", predicate: {predicate}")?;
        }
        if !self.group_by.is_empty() {
            write!(
                f,
                ", group_by: [{}]",
                self.group_by.iter().map(|e| e.to_string()).join(", ")
            )?;
        }
        if let Some(having) = &self.having {
            write!(f, ", having: {having}")?;
        }
        if !self.order_by.is_empty() {
            write!(
                f,
                ", order_by: [{}]",
                self.order_by.iter().map(|o| o.to_string()).join(", ")
            )?;
        }
        if let Some(offset) = self.offset {
            write!(f, ", offset: {offset}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, ", limit: {limit}")?;
        }
        write!(f, " }}")
    }
}

/// Whether an expression tree contains any [`Expr::ScalarSubquery`].
pub fn contains_subquery(expr: &Expr) -> bool {
    match expr {
        Expr::ScalarSubquery(_) => true,
        Expr::Column(_) | Expr::Literal(_) => false,
        Expr::BinaryOp { left, right, .. } => {
            contains_subquery(left) || contains_subquery(right)
        }
        Expr::UnaryOp { operand, .. } => contains_subquery(operand),
        Expr::FunctionCall { args, .. } => args.iter().any(|a| contains_subquery(a)),
        Expr::RowNumber {
            partition_by,
            order_by,
        } => {
            partition_by.iter().any(|e| contains_subquery(e))
                || order_by.iter().any(|o| contains_subquery(&o.expr))
        }
    }
}
