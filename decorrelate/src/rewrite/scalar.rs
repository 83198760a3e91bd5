//! Scalar-subquery lifting.
//!
//! A correlated scalar subquery in a projection becomes a LEFT JOIN against a
//! rebuilt derived select keyed by the correlated equality columns, and the
//! subquery expression becomes a plain column reference into that select. The
//! rebuilt select guarantees at most one row per key either by grouping
//! (aggregate value) or by a `ROW_NUMBER` filtered to 1 (top-1 value).
//!
//! Only the equality-keyed shape lifts. Anything else still referencing the
//! outer scope after the predicate split, a windowed subquery beyond the plain
//! top-1 form, or a subquery that nests another correlated subquery inside its
//! value expression is declined and left in place.

use std::sync::Arc;

use crate::analyze::{
    contains_outer_reference, only_outer_references, select_references, table_references,
    AliasSet,
};
use crate::error::RewriteResult;
use crate::expr::{
    self, conjoin, contains_aggregate, eq, infer_type, lit, BinaryOperator, Column, Expr,
    ExprRef, Literal, ScalarType,
};
use crate::plan::{Ordering, Projection, SelectBuilder, SelectRef};
use crate::rewrite::split::split;
use crate::rewrite::{Decorrelator, SkipReason};
use crate::table::{DerivedTable, Join, JoinKind, Table};

/// Rewrite one projection expression: correlated scalar subqueries are lifted
/// into `pending` joins and replaced with `_value` references; everything else
/// is recursed into so nested subqueries still get their own internals
/// decorrelated.
pub(crate) fn rewrite_projection_expr(
    dec: &mut Decorrelator,
    expr: &ExprRef,
    outer: &AliasSet,
    pending: &mut Vec<Table>,
) -> RewriteResult<ExprRef> {
    let mapped = match &**expr {
        Expr::Column(_) | Expr::Literal(_) | Expr::RowNumber { .. } => expr.clone(),
        Expr::ScalarSubquery(sub) => {
            let body = dec.rewrite_select(sub, outer)?;
            if select_references(&body, outer) {
                match lift_scalar(dec, &body, outer) {
                    Ok((replacement, join)) => {
                        pending.push(Table::Join(join));
                        return Ok(replacement);
                    }
                    Err(reason) => {
                        dec.note(body.alias(), reason);
                        kept_subquery(expr, sub, body)
                    }
                }
            } else {
                kept_subquery(expr, sub, body)
            }
        }
        Expr::BinaryOp { op, left, right } => {
            let new_left = rewrite_projection_expr(dec, left, outer, pending)?;
            let new_right = rewrite_projection_expr(dec, right, outer, pending)?;
            if Arc::ptr_eq(&new_left, left) && Arc::ptr_eq(&new_right, right) {
                expr.clone()
            } else {
                Arc::new(Expr::BinaryOp {
                    op: *op,
                    left: new_left,
                    right: new_right,
                })
            }
        }
        Expr::UnaryOp { op, operand } => {
            let new_operand = rewrite_projection_expr(dec, operand, outer, pending)?;
            if Arc::ptr_eq(&new_operand, operand) {
                expr.clone()
            } else {
                Arc::new(Expr::UnaryOp {
                    op: op.clone(),
                    operand: new_operand,
                })
            }
        }
        Expr::FunctionCall { name, args } => {
            let mut changed = false;
            let mut new_args = Vec::with_capacity(args.len());
            for a in args {
                let mapped = rewrite_projection_expr(dec, a, outer, pending)?;
                changed |= !Arc::ptr_eq(&mapped, a);
                new_args.push(mapped);
            }
            if changed {
                Arc::new(Expr::FunctionCall {
                    name: name.clone(),
                    args: new_args,
                })
            } else {
                expr.clone()
            }
        }
    };
    Ok(mapped)
}

fn kept_subquery(expr: &ExprRef, original: &SelectRef, body: SelectRef) -> ExprRef {
    if Arc::ptr_eq(&body, original) {
        expr.clone()
    } else {
        Arc::new(Expr::ScalarSubquery(body))
    }
}

fn lift_scalar(
    dec: &mut Decorrelator,
    select: &SelectRef,
    outer: &AliasSet,
) -> Result<(ExprRef, Join), SkipReason> {
    // The validator rejects multi-column scalar subqueries up front.
    if select.projections().len() != 1 {
        return Err(SkipReason::CompoundCorrelatedProjection);
    }
    let value = &select.projections()[0].expr;

    if !select.group_by().is_empty() {
        return Err(SkipReason::CorrelatedGrouping);
    }
    if select.having().is_some() {
        return Err(SkipReason::CorrelatedHaving);
    }
    if select.offset().is_some() || matches!(select.limit(), Some(n) if n != 1) {
        return Err(SkipReason::OffsetLimit);
    }
    if select.tables().iter().any(|t| table_references(t, outer)) {
        return Err(SkipReason::NestedCorrelatedSubquery);
    }
    if contains_outer_reference(value, outer) {
        return Err(if has_correlated_subquery(value, outer) {
            SkipReason::NestedCorrelatedSubquery
        } else {
            SkipReason::CompoundCorrelatedProjection
        });
    }

    let parts = split(select.predicate(), outer);
    if !parts.both_outer.is_empty() || !parts.complex.is_empty() {
        return Err(SkipReason::NonEqualityCorrelation);
    }
    if parts.comparisons.iter().any(|c| c.op != BinaryOperator::Eq) {
        return Err(SkipReason::NonEqualityCorrelation);
    }
    if parts.comparisons.is_empty() {
        return Err(SkipReason::NoExtractableCorrelation);
    }

    let mut order_by = Vec::new();
    for o in select.order_by() {
        if contains_outer_reference(&o.expr, outer) {
            if only_outer_references(&o.expr, outer) {
                continue;
            }
            return Err(SkipReason::MixedOrdering);
        }
        order_by.push(o.clone());
    }

    let aggregate = contains_aggregate(value);
    let alias = dec.fresh_alias();
    let partitions: Vec<ExprRef> = parts.comparisons.iter().map(|c| c.inner.clone()).collect();

    let mut builder = SelectBuilder::new(alias.as_str());
    builder.tables = select.tables().to_vec();
    builder.predicate = conjoin(parts.local);
    let mut projections = vec![Projection::new(value.clone(), "_value")];
    for (i, p) in partitions.iter().enumerate() {
        projections.push(Projection::new(p.clone(), format!("_partition{i}")));
    }
    if aggregate {
        builder.group_by = partitions.clone();
    } else {
        // Row numbering needs at least one ordering key.
        let window_order = if !order_by.is_empty() {
            order_by
        } else if !partitions.is_empty() {
            partitions.iter().cloned().map(Ordering::asc).collect()
        } else {
            vec![Ordering::asc(lit(1i64))]
        };
        projections.push(Projection::new(
            Arc::new(Expr::RowNumber {
                partition_by: partitions.clone(),
                order_by: window_order,
            }),
            "_rn",
        ));
    }
    builder.projections = projections;
    let inner = builder.build();

    let mut conditions = Vec::with_capacity(parts.comparisons.len() + 1);
    for (i, cmp) in parts.comparisons.iter().enumerate() {
        let ty = infer_type(&cmp.inner).unwrap_or(cmp.outer.ty);
        conditions.push(eq(
            expr::column(cmp.outer.clone()),
            expr::column(Column::new(alias.as_str(), format!("_partition{i}"), ty)),
        ));
    }
    if !aggregate {
        conditions.push(eq(
            expr::column(Column::new(alias.as_str(), "_rn", ScalarType::Int)),
            lit(1i64),
        ));
    }
    let join = Join::new(
        JoinKind::Left,
        Table::Derived(DerivedTable::new(inner)),
        conjoin(conditions),
    );

    // An outer row with no matching inner row gets null from the LEFT JOIN;
    // numeric aggregates owe it the aggregate identity instead.
    let value_ty = infer_type(value);
    let value_ref = expr::column(
        Column::new(alias.as_str(), "_value", value_ty.unwrap_or(ScalarType::Int)).nullable(),
    );
    let replacement = match value_ty.filter(|_| aggregate).and_then(Literal::zero) {
        Some(zero) => expr::func("COALESCE", vec![value_ref, lit(zero)]),
        None => value_ref,
    };
    Ok((replacement, join))
}

fn has_correlated_subquery(expr: &Expr, outer: &AliasSet) -> bool {
    match expr {
        Expr::ScalarSubquery(s) => select_references(s, outer),
        Expr::Column(_) | Expr::Literal(_) => false,
        Expr::BinaryOp { left, right, .. } => {
            has_correlated_subquery(left, outer) || has_correlated_subquery(right, outer)
        }
        Expr::UnaryOp { operand, .. } => has_correlated_subquery(operand, outer),
        Expr::FunctionCall { args, .. } => {
            args.iter().any(|a| has_correlated_subquery(a, outer))
        }
        Expr::RowNumber { .. } => false,
    }
}
