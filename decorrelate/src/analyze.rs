//! Outer-reference analysis.
//!
//! Every rewriter starts by asking the same questions of an expression or a
//! whole select: does it reference any alias from an enclosing scope, which
//! columns are those, and is it made of *nothing but* such columns. Aliases
//! are globally unique in a resolved plan (the upstream alias allocator
//! guarantees it), so membership in an alias set is a complete answer.

use std::collections::HashSet;

use crate::expr::{Column, Expr};
use crate::plan::{Ordering, Select};
use crate::table::Table;

pub type AliasSet = HashSet<String>;

/// Every column in `expr` whose table alias belongs to `outer`, in first-seen
/// order, deduplicated. Scalar subquery bodies are entered: a correlated
/// reference may sit arbitrarily deep.
pub fn find_outer_columns(expr: &Expr, outer: &AliasSet) -> Vec<Column> {
    let mut found = Vec::new();
    collect_outer_columns(expr, outer, &mut found);
    found
}

fn collect_outer_columns(expr: &Expr, outer: &AliasSet, found: &mut Vec<Column>) {
    match expr {
        Expr::Column(c) => {
            if outer.contains(&c.table) && !found.iter().any(|f| f.same_source(c)) {
                found.push(c.clone());
            }
        }
        Expr::Literal(_) => {}
        Expr::BinaryOp { left, right, .. } => {
            collect_outer_columns(left, outer, found);
            collect_outer_columns(right, outer, found);
        }
        Expr::UnaryOp { operand, .. } => collect_outer_columns(operand, outer, found),
        Expr::FunctionCall { args, .. } => {
            for a in args {
                collect_outer_columns(a, outer, found);
            }
        }
        Expr::ScalarSubquery(select) => {
            each_select_expr(select, &mut |e| collect_outer_columns(e, outer, found))
        }
        Expr::RowNumber {
            partition_by,
            order_by,
        } => {
            for e in partition_by {
                collect_outer_columns(e, outer, found);
            }
            for o in order_by {
                collect_outer_columns(&o.expr, outer, found);
            }
        }
    }
}

/// Short-circuiting variant of [`find_outer_columns`].
pub fn contains_outer_reference(expr: &Expr, outer: &AliasSet) -> bool {
    match expr {
        Expr::Column(c) => outer.contains(&c.table),
        Expr::Literal(_) => false,
        Expr::BinaryOp { left, right, .. } => {
            contains_outer_reference(left, outer) || contains_outer_reference(right, outer)
        }
        Expr::UnaryOp { operand, .. } => contains_outer_reference(operand, outer),
        Expr::FunctionCall { args, .. } => {
            args.iter().any(|a| contains_outer_reference(a, outer))
        }
        Expr::ScalarSubquery(select) => select_references(select, outer),
        Expr::RowNumber {
            partition_by,
            order_by,
        } => {
            partition_by.iter().any(|e| contains_outer_reference(e, outer))
                || order_by
                    .iter()
                    .any(|o| contains_outer_reference(&o.expr, outer))
        }
    }
}

/// True iff every column in `expr` belongs to `outer`. Vacuously true for a
/// column-free expression. Used to decide whether an ordering or projection is
/// constant with respect to the inner scope and can be dropped or remapped
/// whole instead of partially rewritten.
pub fn only_outer_references(expr: &Expr, outer: &AliasSet) -> bool {
    match expr {
        Expr::Column(c) => outer.contains(&c.table),
        Expr::Literal(_) => true,
        Expr::BinaryOp { left, right, .. } => {
            only_outer_references(left, outer) && only_outer_references(right, outer)
        }
        Expr::UnaryOp { operand, .. } => only_outer_references(operand, outer),
        Expr::FunctionCall { args, .. } => {
            args.iter().all(|a| only_outer_references(a, outer))
        }
        // A subquery owns local tables of its own; never droppable as outer.
        Expr::ScalarSubquery(_) => false,
        Expr::RowNumber {
            partition_by,
            order_by,
        } => {
            partition_by.iter().all(|e| only_outer_references(e, outer))
                && order_by.iter().all(|o| only_outer_references(&o.expr, outer))
        }
    }
}

/// Whether any expression anywhere inside `select` references `outer`.
pub fn select_references(select: &Select, outer: &AliasSet) -> bool {
    let mut found = false;
    each_select_expr(select, &mut |e| {
        found |= contains_outer_reference(e, outer);
    });
    found
}

/// Whether any expression inside `table` (join condition or subquery body)
/// references `outer`.
pub fn table_references(table: &Table, outer: &AliasSet) -> bool {
    let mut found = false;
    each_table_expr(table, &mut |e| {
        found |= contains_outer_reference(e, outer);
    });
    found
}

/// Invoke `f` on every expression position of `select`, including positions
/// inside its FROM-list entries.
fn each_select_expr(select: &Select, f: &mut impl FnMut(&Expr)) {
    for table in select.tables() {
        each_table_expr(table, f);
    }
    if let Some(p) = select.predicate() {
        f(p);
    }
    for e in select.group_by() {
        f(e);
    }
    if let Some(h) = select.having() {
        f(h);
    }
    for p in select.projections() {
        f(&p.expr);
    }
    for Ordering { expr, .. } in select.order_by() {
        f(expr);
    }
}

fn each_table_expr(table: &Table, f: &mut impl FnMut(&Expr)) {
    match table {
        Table::Base(_) => {}
        Table::Join(join) => {
            if let Some(c) = join.condition() {
                f(c);
            }
            each_table_expr(join.table(), f);
        }
        Table::Apply(apply) => each_table_expr(apply.table(), f),
        Table::Derived(derived) => each_select_expr(derived.select(), f),
    }
}
