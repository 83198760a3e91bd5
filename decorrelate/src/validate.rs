//! Plan well-formedness checks.
//!
//! Rewriters assume a resolved tree: every column's alias is visible in its
//! lexical scope, anything referenced from outside a derived select is
//! actually projected by it, aliases never collide along a scope path, and a
//! scalar subquery projects exactly one column. A plan violating any of these
//! is a translator bug, not an unsupported shape, so the check fails hard
//! instead of falling back to silent non-transformation.
//!
//! Visibility rules mirror SQL: a plain derived table's body sees only
//! ancestor scopes, an applied (lateral) body additionally sees the tables to
//! its left, and a join condition sees ancestors, left siblings and the
//! joined table itself.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, ensure};

use crate::error::{RewriteError, RewriteResult};
use crate::expr::Expr;
use crate::plan::{Select, SelectRef};
use crate::table::{Table, TableAttrs};

/// Visible aliases. `None` marks a base table, whose column set is unknown to
/// the engine; `Some` holds a derived select's projected output aliases.
type Scope = HashMap<String, Option<HashSet<String>>>;

pub fn check(plan: &SelectRef) -> RewriteResult<()> {
    check_select(plan, &Scope::new())
}

fn check_select(select: &Select, ancestors: &Scope) -> RewriteResult<()> {
    let mut scope = ancestors.clone();
    for table in select.tables() {
        check_table(table, ancestors, &mut scope)?;
    }

    if let Some(p) = select.predicate() {
        check_expr(p, &scope)?;
    }
    for g in select.group_by() {
        check_expr(g, &scope)?;
    }
    if let Some(h) = select.having() {
        check_expr(h, &scope)?;
    }
    ensure!(
        !select.projections().is_empty(),
        RewriteError::MalformedPlan(format!("select {} projects nothing", select.alias()))
    );
    for p in select.projections() {
        check_expr(&p.expr, &scope)?;
    }
    for o in select.order_by() {
        check_expr(&o.expr, &scope)?;
    }
    Ok(())
}

fn check_table(table: &Table, ancestors: &Scope, scope: &mut Scope) -> RewriteResult<()> {
    match table {
        Table::Base(b) => add_alias(scope, b.alias(), None),
        Table::Derived(derived) => {
            check_select(derived.select(), ancestors)?;
            add_alias(scope, derived.alias(), Some(output_columns(derived.select())))
        }
        Table::Apply(a) => match a.table() {
            Table::Derived(derived) => {
                check_select(derived.select(), scope)?;
                add_alias(scope, derived.alias(), Some(output_columns(derived.select())))
            }
            other => {
                let lateral = scope.clone();
                check_table(other, &lateral, scope)
            }
        },
        Table::Join(j) => {
            check_table(j.table(), ancestors, scope)?;
            if let Some(c) = j.condition() {
                check_expr(c, scope)?;
            }
            Ok(())
        }
    }
}

fn output_columns(select: &Select) -> HashSet<String> {
    select
        .projections()
        .iter()
        .map(|p| p.alias.clone())
        .collect()
}

fn add_alias(
    scope: &mut Scope,
    alias: &str,
    columns: Option<HashSet<String>>,
) -> RewriteResult<()> {
    if scope.insert(alias.to_string(), columns).is_some() {
        bail!(RewriteError::MalformedPlan(format!(
            "duplicate table alias {alias}"
        )));
    }
    Ok(())
}

fn check_expr(expr: &Expr, scope: &Scope) -> RewriteResult<()> {
    match expr {
        Expr::Column(c) => match scope.get(&c.table) {
            None => bail!(RewriteError::MalformedPlan(format!(
                "column {c} references an alias not visible in scope"
            ))),
            Some(Some(columns)) => {
                ensure!(
                    columns.contains(&c.name),
                    RewriteError::MalformedPlan(format!("column {c} is not projected"))
                );
                Ok(())
            }
            Some(None) => Ok(()),
        },
        Expr::Literal(_) => Ok(()),
        Expr::BinaryOp { left, right, .. } => {
            check_expr(left, scope)?;
            check_expr(right, scope)
        }
        Expr::UnaryOp { operand, .. } => check_expr(operand, scope),
        Expr::FunctionCall { args, .. } => {
            for a in args {
                check_expr(a, scope)?;
            }
            Ok(())
        }
        Expr::ScalarSubquery(sub) => {
            ensure!(
                sub.projections().len() == 1,
                RewriteError::MalformedPlan(format!(
                    "scalar subquery {} must project exactly one column",
                    sub.alias()
                ))
            );
            check_select(sub, scope)
        }
        Expr::RowNumber {
            partition_by,
            order_by,
        } => {
            for e in partition_by {
                check_expr(e, scope)?;
            }
            for o in order_by {
                check_expr(&o.expr, scope)?;
            }
            Ok(())
        }
    }
}
