//! Copy-on-write traversals.
//!
//! All mappers share one contract: when the callback changes nothing, the
//! original reference is returned (pointer-equal), so callers can tell whether
//! a subtree was rebuilt without comparing structures.

use std::sync::Arc;

use crate::expr::{Column, Expr, ExprRef};
use crate::plan::{Ordering, Projection, SelectRef};
use crate::table::{Apply, DerivedTable, Table, TableAttrs};

/// Rewrite every column reference in an expression, descending into scalar
/// subquery bodies. The callback returns `Ok(Some(_))` to substitute,
/// `Ok(None)` to keep the column, or `Err` to abort the whole traversal.
pub fn map_columns<E>(
    expr: &ExprRef,
    f: &mut dyn FnMut(&Column) -> Result<Option<ExprRef>, E>,
) -> Result<ExprRef, E> {
    let mapped = match &**expr {
        Expr::Column(c) => match f(c)? {
            Some(replacement) => replacement,
            None => expr.clone(),
        },
        Expr::Literal(_) => expr.clone(),
        Expr::BinaryOp { op, left, right } => {
            let new_left = map_columns(left, f)?;
            let new_right = map_columns(right, f)?;
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
            let new_operand = map_columns(operand, f)?;
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
            let new_args = map_exprs(args, f)?;
            match new_args {
                Some(args) => Arc::new(Expr::FunctionCall {
                    name: name.clone(),
                    args,
                }),
                None => expr.clone(),
            }
        }
        Expr::ScalarSubquery(select) => {
            let new_select = map_select_columns(select, f)?;
            if Arc::ptr_eq(&new_select, select) {
                expr.clone()
            } else {
                Arc::new(Expr::ScalarSubquery(new_select))
            }
        }
        Expr::RowNumber {
            partition_by,
            order_by,
        } => {
            let new_partition = map_exprs(partition_by, f)?;
            let new_order = map_orderings(order_by, f)?;
            if new_partition.is_none() && new_order.is_none() {
                expr.clone()
            } else {
                Arc::new(Expr::RowNumber {
                    partition_by: new_partition.unwrap_or_else(|| partition_by.clone()),
                    order_by: new_order.unwrap_or_else(|| order_by.clone()),
                })
            }
        }
    };
    Ok(mapped)
}

/// `Some(new)` when any element changed, `None` when all were kept.
fn map_exprs<E>(
    exprs: &[ExprRef],
    f: &mut dyn FnMut(&Column) -> Result<Option<ExprRef>, E>,
) -> Result<Option<Vec<ExprRef>>, E> {
    let mut changed = false;
    let mut out = Vec::with_capacity(exprs.len());
    for e in exprs {
        let mapped = map_columns(e, f)?;
        changed |= !Arc::ptr_eq(&mapped, e);
        out.push(mapped);
    }
    Ok(changed.then_some(out))
}

fn map_orderings<E>(
    orderings: &[Ordering],
    f: &mut dyn FnMut(&Column) -> Result<Option<ExprRef>, E>,
) -> Result<Option<Vec<Ordering>>, E> {
    let mut changed = false;
    let mut out = Vec::with_capacity(orderings.len());
    for o in orderings {
        let mapped = map_columns(&o.expr, f)?;
        changed |= !Arc::ptr_eq(&mapped, &o.expr);
        out.push(Ordering {
            expr: mapped,
            asc: o.asc,
        });
    }
    Ok(changed.then_some(out))
}

/// Rewrite every column reference in a select, including join conditions and
/// the bodies of derived tables and applied subqueries.
pub fn map_select_columns<E>(
    select: &SelectRef,
    f: &mut dyn FnMut(&Column) -> Result<Option<ExprRef>, E>,
) -> Result<SelectRef, E> {
    let mut changed = false;

    let mut tables = Vec::with_capacity(select.tables().len());
    for table in select.tables() {
        let mapped = map_table_columns(table, f)?;
        match mapped {
            Some(t) => {
                tables.push(t);
                changed = true;
            }
            None => tables.push(table.clone()),
        }
    }

    let predicate = match select.predicate() {
        Some(p) => {
            let mapped = map_columns(p, f)?;
            changed |= !Arc::ptr_eq(&mapped, p);
            Some(mapped)
        }
        None => None,
    };
    let having = match select.having() {
        Some(h) => {
            let mapped = map_columns(h, f)?;
            changed |= !Arc::ptr_eq(&mapped, h);
            Some(mapped)
        }
        None => None,
    };
    let group_by = map_exprs(select.group_by(), f)?;
    changed |= group_by.is_some();
    let order_by = map_orderings(select.order_by(), f)?;
    changed |= order_by.is_some();

    let mut projections = Vec::with_capacity(select.projections().len());
    for p in select.projections() {
        let mapped = map_columns(&p.expr, f)?;
        changed |= !Arc::ptr_eq(&mapped, &p.expr);
        projections.push(Projection {
            expr: mapped,
            alias: p.alias.clone(),
        });
    }

    if !changed {
        return Ok(select.clone());
    }

    let mut builder = select.to_builder();
    builder.tables = tables;
    builder.predicate = predicate;
    builder.having = having;
    builder.group_by = group_by.unwrap_or_else(|| select.group_by().to_vec());
    builder.order_by = order_by.unwrap_or_else(|| select.order_by().to_vec());
    builder.projections = projections;
    Ok(builder.build())
}

/// `Some(new)` when the table changed, `None` when it was kept.
pub fn map_table_columns<E>(
    table: &Table,
    f: &mut dyn FnMut(&Column) -> Result<Option<ExprRef>, E>,
) -> Result<Option<Table>, E> {
    match table {
        Table::Base(_) => Ok(None),
        Table::Join(join) => {
            let inner = map_table_columns(join.table(), f)?;
            let condition = match join.condition() {
                Some(c) => {
                    let mapped = map_columns(c, f)?;
                    if Arc::ptr_eq(&mapped, c) && inner.is_none() {
                        return Ok(None);
                    }
                    Some(mapped)
                }
                None => {
                    if inner.is_none() {
                        return Ok(None);
                    }
                    None
                }
            };
            let inner = inner.unwrap_or_else(|| join.table().clone());
            Ok(Some(Table::Join(join.rebuilt(inner, condition))))
        }
        Table::Apply(apply) => Ok(map_table_columns(apply.table(), f)?
            .map(|inner| Table::Apply(Apply::new(apply.kind(), inner)))),
        Table::Derived(derived) => {
            let mapped = map_select_columns(derived.select(), f)?;
            if Arc::ptr_eq(&mapped, derived.select()) {
                Ok(None)
            } else {
                Ok(Some(Table::Derived(DerivedTable::new(mapped))))
            }
        }
    }
}

/// Replace scalar subqueries appearing in an expression. Does not descend into
/// a subquery the callback keeps; the callback owns any deeper recursion.
pub fn map_subqueries<E>(
    expr: &ExprRef,
    f: &mut dyn FnMut(&SelectRef) -> Result<Option<SelectRef>, E>,
) -> Result<ExprRef, E> {
    let mapped = match &**expr {
        Expr::Column(_) | Expr::Literal(_) => expr.clone(),
        Expr::ScalarSubquery(select) => match f(select)? {
            Some(new_select) => Arc::new(Expr::ScalarSubquery(new_select)),
            None => expr.clone(),
        },
        Expr::BinaryOp { op, left, right } => {
            let new_left = map_subqueries(left, f)?;
            let new_right = map_subqueries(right, f)?;
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
            let new_operand = map_subqueries(operand, f)?;
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
                let mapped = map_subqueries(a, f)?;
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
        Expr::RowNumber { .. } => expr.clone(),
    };
    Ok(mapped)
}
