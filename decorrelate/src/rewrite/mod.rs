//! The decorrelation driver.
//!
//! One top-down, scope-tracking traversal of the plan. For every select the
//! driver walks the FROM list left to right, growing the outer-alias set as
//! each table's alias becomes visible, and fires the three rewriters where
//! their shapes appear: applies collapse into joins, joins over correlated
//! derived selects absorb lifted conditions, and correlated scalar subqueries
//! in projections become LEFT JOINs appended to the table list.
//!
//! Unsupported shapes are never an error. The rewriter that declines records
//! a [`Diagnostic`] and the node passes through untouched, so the output is
//! always a complete plan; whether leftover correlation is acceptable is the
//! downstream emitter's problem. Errors surface only for malformed input
//! trees, caught by [`crate::validate`] before any rewriting starts.

mod apply;
mod expose;
mod join;
mod scalar;
pub mod split;

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::mem;
use std::sync::Arc;

use log::debug;
use strum_macros::AsRefStr;

use crate::analyze::AliasSet;
use crate::error::RewriteResult;
use crate::expr::ExprRef;
use crate::plan::visit::{map_subqueries, map_table_columns};
use crate::plan::{Ordering, Projection, SelectRef};
use crate::table::{Apply, DerivedTable, Table, TableAttrs};

/// Why a rewriter declined to transform a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr)]
pub enum SkipReason {
    /// An ordering mixes inner and outer columns; neither scope can keep it.
    MixedOrdering,
    /// A projection reaches the outer scope through a compound expression.
    CompoundCorrelatedProjection,
    /// A lifted predicate needs a column the inner select cannot expose.
    UnprojectableColumn,
    /// GROUP BY references an enclosing scope, or a scalar subquery carries
    /// grouping of its own.
    CorrelatedGrouping,
    /// HAVING references an enclosing scope.
    CorrelatedHaving,
    /// An OFFSET/LIMIT window pins row counts the rewrite would change.
    OffsetLimit,
    /// A deeper subquery still references the outer scope.
    NestedCorrelatedSubquery,
    /// Correlation under a LEFT JOIN; lifting would break its null-extension.
    CorrelatedOuterJoinCondition,
    /// Correlation not reducible to equality keys where equality is required.
    NonEqualityCorrelation,
    /// The node had no correlation the rewriter could act on.
    NoExtractableCorrelation,
}

/// One declined rewrite, identified by the select alias it applies to.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub select: String,
    pub reason: SkipReason,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.select, self.reason.as_ref())
    }
}

/// Remap rules from removed echo projections: `(select alias, projection
/// alias)` to the outer expression the projection echoed.
type RemapTable = HashMap<(String, String), ExprRef>;

pub struct Decorrelator {
    next_alias: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Default for Decorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl Decorrelator {
    pub fn new() -> Self {
        Self {
            next_alias: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Rewrite a whole plan. The input is validated first; a malformed tree
    /// is an error, an unsupported-but-well-formed shape never is.
    pub fn rewrite(&mut self, plan: &SelectRef) -> RewriteResult<SelectRef> {
        crate::validate::check(plan)?;
        self.rewrite_select(plan, &AliasSet::new())
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        mem::take(&mut self.diagnostics)
    }

    pub(crate) fn fresh_alias(&mut self) -> String {
        self.next_alias += 1;
        format!("_q{}", self.next_alias)
    }

    pub(crate) fn note(&mut self, select: &str, reason: SkipReason) {
        debug!("declining to decorrelate {select}: {}", reason.as_ref());
        self.diagnostics.push(Diagnostic {
            select: select.to_string(),
            reason,
        });
    }

    pub(crate) fn rewrite_select(
        &mut self,
        select: &SelectRef,
        ancestors: &AliasSet,
    ) -> RewriteResult<SelectRef> {
        let mut outer = ancestors.clone();
        let mut changed = false;
        let mut tables = Vec::with_capacity(select.tables().len());
        let mut remaps = RemapTable::new();

        for table in select.tables() {
            match self.rewrite_table(table, &outer, &mut remaps)? {
                Some(t) => {
                    outer.insert(t.alias().to_string());
                    tables.push(t);
                    changed = true;
                }
                None => {
                    outer.insert(table.alias().to_string());
                    tables.push(table.clone());
                }
            }
        }

        // Echo remaps apply everywhere at this level, derived bodies included:
        // anything that referenced a removed `inner.echoed` projection now
        // reads the true outer column directly.
        if !remaps.is_empty() {
            for slot in tables.iter_mut() {
                let mapped = map_table_columns(slot, &mut |c: &crate::expr::Column| {
                    Ok::<_, anyhow::Error>(
                        remaps.get(&(c.table.clone(), c.name.clone())).cloned(),
                    )
                })?;
                if let Some(t) = mapped {
                    *slot = t;
                    changed = true;
                }
            }
        }

        let predicate = match select.predicate() {
            Some(p) => {
                let e = apply_remaps(p, &remaps);
                let e = self.rewrite_embedded(&e, &outer)?;
                changed |= !Arc::ptr_eq(&e, p);
                Some(e)
            }
            None => None,
        };
        let mut group_by = Vec::with_capacity(select.group_by().len());
        for g in select.group_by() {
            let e = apply_remaps(g, &remaps);
            let e = self.rewrite_embedded(&e, &outer)?;
            changed |= !Arc::ptr_eq(&e, g);
            group_by.push(e);
        }
        let having = match select.having() {
            Some(h) => {
                let e = apply_remaps(h, &remaps);
                let e = self.rewrite_embedded(&e, &outer)?;
                changed |= !Arc::ptr_eq(&e, h);
                Some(e)
            }
            None => None,
        };
        let mut order_by = Vec::with_capacity(select.order_by().len());
        for o in select.order_by() {
            let e = apply_remaps(&o.expr, &remaps);
            let e = self.rewrite_embedded(&e, &outer)?;
            changed |= !Arc::ptr_eq(&e, &o.expr);
            order_by.push(Ordering { expr: e, asc: o.asc });
        }

        // Scalar subqueries lift out of the projection list only; each lifted
        // one appends a LEFT JOIN after the original tables.
        let mut pending: Vec<Table> = Vec::new();
        let mut projections = Vec::with_capacity(select.projections().len());
        for p in select.projections() {
            let e = apply_remaps(&p.expr, &remaps);
            let e = scalar::rewrite_projection_expr(self, &e, &outer, &mut pending)?;
            changed |= !Arc::ptr_eq(&e, &p.expr);
            projections.push(Projection {
                expr: e,
                alias: p.alias.clone(),
            });
        }
        if !pending.is_empty() {
            debug!(
                "select {}: appended {} scalar-subquery join(s)",
                select.alias(),
                pending.len()
            );
            tables.extend(pending);
            changed = true;
        }

        if !changed {
            return Ok(select.clone());
        }
        let mut builder = select.to_builder();
        builder.tables = tables;
        builder.predicate = predicate;
        builder.group_by = group_by;
        builder.having = having;
        builder.order_by = order_by;
        builder.projections = projections;
        Ok(builder.build())
    }

    /// Rewrite one FROM-list entry. `Ok(None)` means untouched.
    fn rewrite_table(
        &mut self,
        table: &Table,
        outer: &AliasSet,
        remaps: &mut RemapTable,
    ) -> RewriteResult<Option<Table>> {
        match table {
            Table::Base(_) => Ok(None),
            Table::Derived(derived) => {
                let body = self.rewrite_select(derived.select(), outer)?;
                if Arc::ptr_eq(&body, derived.select()) {
                    Ok(None)
                } else {
                    Ok(Some(Table::Derived(DerivedTable::new(body))))
                }
            }
            Table::Apply(a) => match a.table() {
                Table::Derived(derived) => {
                    // Inner shapes first, so correlation produced by deeper
                    // rewrites is visible to the extraction.
                    let body = self.rewrite_select(derived.select(), outer)?;
                    match apply::try_rewrite_apply(a, &body, outer) {
                        Ok((join, new_remaps)) => {
                            debug!(
                                "select {}: {:?} apply rewritten to {:?} join",
                                body.alias(),
                                a.kind(),
                                join.kind()
                            );
                            for r in new_remaps {
                                remaps.insert((r.select, r.alias), r.target);
                            }
                            Ok(Some(Table::Join(join)))
                        }
                        Err(reason) => {
                            self.note(body.alias(), reason);
                            if Arc::ptr_eq(&body, derived.select()) {
                                Ok(None)
                            } else {
                                Ok(Some(Table::Apply(Apply::new(
                                    a.kind(),
                                    Table::Derived(DerivedTable::new(body)),
                                ))))
                            }
                        }
                    }
                }
                other => {
                    let inner = self.rewrite_table(other, outer, remaps)?;
                    Ok(inner.map(|t| Table::Apply(Apply::new(a.kind(), t))))
                }
            },
            Table::Join(j) => {
                let inner_rewritten = self.rewrite_table(j.table(), outer, remaps)?;
                let inner_changed = inner_rewritten.is_some();
                let inner = inner_rewritten.unwrap_or_else(|| j.table().clone());

                if let Table::Derived(derived) = &inner {
                    if crate::analyze::select_references(derived.select(), outer) {
                        match join::try_rewrite_join(j, derived.select(), outer) {
                            Ok((new_join, new_remaps)) => {
                                debug!(
                                    "select {}: correlated join absorbed {} lifted condition(s)",
                                    derived.select().alias(),
                                    new_join.condition().map_or(0, |c| {
                                        crate::expr::conjuncts(c).len()
                                    })
                                );
                                for r in new_remaps {
                                    remaps.insert((r.select, r.alias), r.target);
                                }
                                return Ok(Some(Table::Join(new_join)));
                            }
                            Err(reason) => self.note(derived.select().alias(), reason),
                        }
                    }
                }

                Ok(inner_changed
                    .then(|| Table::Join(j.rebuilt(inner, j.condition().cloned()))))
            }
        }
    }

    /// Recurse into scalar subqueries embedded in a non-projection position.
    /// They are not lifted from here, but their own internals still get
    /// decorrelated.
    fn rewrite_embedded(&mut self, expr: &ExprRef, outer: &AliasSet) -> RewriteResult<ExprRef> {
        map_subqueries(expr, &mut |s| {
            let body = self.rewrite_select(s, outer)?;
            Ok((!Arc::ptr_eq(&body, s)).then_some(body))
        })
    }
}

fn apply_remaps(expr: &ExprRef, remaps: &RemapTable) -> ExprRef {
    if remaps.is_empty() {
        return expr.clone();
    }
    expose::substitute_columns(expr, &mut |c| {
        remaps.get(&(c.table.clone(), c.name.clone())).cloned()
    })
}

/// Convenience entry point: rewrite `plan` with a fresh [`Decorrelator`] and
/// hand back the diagnostics alongside the result.
pub fn decorrelate(plan: &SelectRef) -> RewriteResult<(SelectRef, Vec<Diagnostic>)> {
    let mut dec = Decorrelator::new();
    let rewritten = dec.rewrite(plan)?;
    Ok((rewritten, dec.take_diagnostics()))
}
