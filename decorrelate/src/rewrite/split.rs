//! Conjunct classification.
//!
//! A predicate is flattened along AND and each conjunct is filed into one of
//! four buckets. The split itself never fails; whether a "complex" conjunct
//! can actually be lifted is decided later, when the column exposure manager
//! tries to remap it.

use smallvec::SmallVec;

use crate::analyze::{contains_outer_reference, AliasSet};
use crate::expr::{conjuncts, Column, Expr, ExprRef};

/// A conjunct of the form `outer <op> inner` (already oriented: the outer
/// column on the left, the operator mirrored if the input had it on the
/// right). The inner side contains no outer reference.
#[derive(Clone, Debug)]
pub struct CorrelatedComparison {
    pub outer: Column,
    pub op: crate::expr::BinaryOperator,
    pub inner: ExprRef,
}

#[derive(Default)]
pub struct SplitPredicates {
    /// Correlated comparisons, join-condition candidates.
    pub comparisons: Vec<CorrelatedComparison>,
    /// Conjuncts whose columns all live in ancestor scopes; liftable verbatim,
    /// no inner projection needed.
    pub both_outer: SmallVec<[ExprRef; 2]>,
    /// Other outer-referencing conjuncts; lifted after inner-column remapping.
    pub complex: SmallVec<[ExprRef; 2]>,
    /// Conjuncts with no outer reference; they stay where they are.
    pub local: SmallVec<[ExprRef; 4]>,
}

impl SplitPredicates {
    pub fn has_correlation(&self) -> bool {
        !self.comparisons.is_empty() || !self.both_outer.is_empty() || !self.complex.is_empty()
    }
}

pub fn split(predicate: Option<&ExprRef>, outer: &AliasSet) -> SplitPredicates {
    let mut out = SplitPredicates::default();
    let Some(predicate) = predicate else {
        return out;
    };

    for conjunct in conjuncts(predicate) {
        if !contains_outer_reference(&conjunct, outer) {
            out.local.push(conjunct);
            continue;
        }
        classify_correlated(conjunct, outer, &mut out);
    }
    out
}

fn classify_correlated(conjunct: ExprRef, outer: &AliasSet, out: &mut SplitPredicates) {
    if let Expr::BinaryOp { op, left, right } = &*conjunct {
        if op.is_comparison() {
            let left_outer = outer_column(left, outer);
            let right_outer = outer_column(right, outer);
            match (left_outer, right_outer) {
                (Some(_), Some(_)) => {
                    out.both_outer.push(conjunct.clone());
                    return;
                }
                (Some(outer_col), None) if !contains_outer_reference(right, outer) => {
                    out.comparisons.push(CorrelatedComparison {
                        outer: outer_col.clone(),
                        op: *op,
                        inner: right.clone(),
                    });
                    return;
                }
                (None, Some(outer_col)) if !contains_outer_reference(left, outer) => {
                    out.comparisons.push(CorrelatedComparison {
                        outer: outer_col.clone(),
                        op: op.mirror(),
                        inner: left.clone(),
                    });
                    return;
                }
                _ => {}
            }
        }
    }
    out.complex.push(conjunct);
}

/// The column itself when `expr` is a bare reference into `outer`.
fn outer_column<'a>(expr: &'a ExprRef, outer: &AliasSet) -> Option<&'a Column> {
    expr.as_column().filter(|c| outer.contains(&c.table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{and, binary, col, eq, BinaryOperator, ScalarType};
    use maplit::hashset;

    fn outer() -> AliasSet {
        hashset! {"o".to_string(), "g".to_string()}
    }

    #[test]
    fn test_split_files_local_and_comparisons() {
        let pred = and(
            eq(
                col("i", "parent", ScalarType::Int),
                col("o", "id", ScalarType::Int),
            ),
            eq(col("i", "kind", ScalarType::Int), crate::expr::lit(3i64)),
        );
        let parts = split(Some(&pred), &outer());

        assert_eq!(1, parts.comparisons.len());
        assert_eq!(1, parts.local.len());
        assert!(parts.complex.is_empty());

        // Orientation: outer column moved to the left, operator mirrored.
        let cmp = &parts.comparisons[0];
        assert_eq!("id", cmp.outer.name);
        assert_eq!(BinaryOperator::Eq, cmp.op);
        assert_eq!("i.parent", cmp.inner.to_string());
    }

    #[test]
    fn test_split_mirrors_relational_operator() {
        let pred = binary(
            BinaryOperator::Lt,
            col("i", "v", ScalarType::Int),
            col("o", "cap", ScalarType::Int),
        );
        let parts = split(Some(&pred), &outer());
        let cmp = &parts.comparisons[0];
        assert_eq!("cap", cmp.outer.name);
        assert_eq!(BinaryOperator::Gt, cmp.op);
    }

    #[test]
    fn test_split_detects_both_outer() {
        let pred = eq(
            col("o", "x", ScalarType::Int),
            col("g", "y", ScalarType::Int),
        );
        let parts = split(Some(&pred), &outer());
        assert_eq!(1, parts.both_outer.len());
        assert!(parts.comparisons.is_empty());
    }

    #[test]
    fn test_split_keeps_inequality_as_comparison() {
        let pred = binary(
            BinaryOperator::NotEq,
            col("o", "flag", ScalarType::Bool),
            col("i", "flag", ScalarType::Bool),
        );
        let parts = split(Some(&pred), &outer());
        assert_eq!(1, parts.comparisons.len());
        assert_eq!(BinaryOperator::NotEq, parts.comparisons[0].op);
    }

    #[test]
    fn test_split_files_or_trees_as_complex() {
        let pred = binary(
            BinaryOperator::Or,
            eq(
                col("o", "id", ScalarType::Int),
                col("i", "a", ScalarType::Int),
            ),
            eq(
                col("i", "b", ScalarType::Int),
                crate::expr::lit(1i64),
            ),
        );
        let parts = split(Some(&pred), &outer());
        assert_eq!(1, parts.complex.len());
        assert!(parts.comparisons.is_empty());
    }

    #[test]
    fn test_split_mixed_sides_is_complex() {
        // Outer column on one side, but the other side references outer too.
        let pred = eq(
            col("o", "id", ScalarType::Int),
            binary(
                BinaryOperator::Add,
                col("o", "base", ScalarType::Int),
                col("i", "x", ScalarType::Int),
            ),
        );
        let parts = split(Some(&pred), &outer());
        assert_eq!(1, parts.complex.len());
    }

    #[test]
    fn test_split_empty_predicate() {
        let parts = split(None, &outer());
        assert!(!parts.has_correlation());
        assert!(parts.local.is_empty());
    }
}
