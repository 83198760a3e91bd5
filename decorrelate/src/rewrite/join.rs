//! Correlation extraction.
//!
//! [`extract_correlations`] is the engine shared by the apply and join
//! rewriters: given a select and the alias set of every enclosing scope, it
//! pulls the correlated parts out and returns the cleaned select together with
//! the join conditions that replace them. It recurses into the select's own
//! FROM list first, so a predicate sitting two or more scopes below the
//! destination join is lifted through every intermediate select in one pass,
//! each of them gaining the `_corr_*` projections the lifted condition needs.
//!
//! Extraction refuses (returns a [`SkipReason`]) whenever lifting would change
//! what the select computes: windowed selects (OFFSET/LIMIT), correlated
//! grouping or HAVING, orderings that mix scopes, anything correlated under a
//! LEFT JOIN (moving a conjunct out of its null-extending condition changes
//! which rows survive), and non-equality conditions against a grouped select
//! (only an equality against a bare grouping key pins one group per outer
//! row).

use std::collections::HashMap;
use std::sync::Arc;

use crate::analyze::{
    contains_outer_reference, only_outer_references, select_references, table_references,
    AliasSet,
};
use crate::expr::{self, binary, conjoin, conjuncts, BinaryOperator, ExprRef};
use crate::plan::{Ordering, Projection, SelectRef};
use crate::rewrite::expose::{dummy_projection, substitute_columns, ExposedSelect};
use crate::rewrite::split::split;
use crate::rewrite::SkipReason;
use crate::table::{DerivedTable, JoinKind, Table};

/// A projection removed from an inner select because it merely echoed an
/// outer column. References to `select.alias` at the enclosing level must be
/// rewritten to `target`.
#[derive(Clone, Debug)]
pub(crate) struct Remap {
    pub select: String,
    pub alias: String,
    pub target: ExprRef,
}

/// Result of a successful extraction.
pub(crate) struct Extraction {
    /// The select with correlated predicates, projections and orderings
    /// removed, and `_corr_*` projections added. Pointer-equal to the input
    /// when there was nothing to extract.
    pub select: SelectRef,
    /// Lifted conjuncts for the destination join condition. They reference
    /// only outer aliases and `select`'s own output alias.
    pub conditions: Vec<ExprRef>,
    pub remaps: Vec<Remap>,
}

pub(crate) fn extract_correlations(
    select: &SelectRef,
    outer: &AliasSet,
) -> Result<Extraction, SkipReason> {
    if select.offset().is_some() || select.limit().is_some() {
        return Err(SkipReason::OffsetLimit);
    }

    // FROM list first: conditions lifted from nested scopes join this level's
    // predicate pool, remaps from removed nested echoes rewrite this level's
    // own expressions.
    let mut lifted: Vec<ExprRef> = Vec::new();
    let mut nested_remaps: Vec<Remap> = Vec::new();
    let mut tables = Vec::with_capacity(select.tables().len());
    let mut changed = false;
    for table in select.tables() {
        match extract_from_table(table, outer, &mut lifted, &mut nested_remaps)? {
            Some(t) => {
                tables.push(t);
                changed = true;
            }
            None => tables.push(table.clone()),
        }
    }

    let remap_table: HashMap<(&str, &str), &ExprRef> = nested_remaps
        .iter()
        .map(|r| ((r.select.as_str(), r.alias.as_str()), &r.target))
        .collect();
    let mut subst = |e: &ExprRef| {
        substitute_columns(e, &mut |c| {
            remap_table
                .get(&(c.table.as_str(), c.name.as_str()))
                .map(|t| (*t).clone())
        })
    };

    let predicate = select.predicate().map(&mut subst);
    let group_by = select
        .group_by()
        .iter()
        .map(&mut subst)
        .collect::<Vec<_>>();
    let having = select.having().map(&mut subst);
    changed |= predicate
        .iter()
        .zip(select.predicate())
        .any(|(new, old)| !Arc::ptr_eq(new, old));
    changed |= group_by
        .iter()
        .zip(select.group_by())
        .any(|(new, old)| !Arc::ptr_eq(new, old));
    changed |= having
        .iter()
        .zip(select.having())
        .any(|(new, old)| !Arc::ptr_eq(new, old));

    if group_by.iter().any(|e| contains_outer_reference(e, outer)) {
        return Err(SkipReason::CorrelatedGrouping);
    }
    if having
        .as_ref()
        .map_or(false, |h| contains_outer_reference(h, outer))
    {
        return Err(SkipReason::CorrelatedHaving);
    }

    // Orderings over nothing but outer columns are constant per outer row and
    // can be dropped; an ordering mixing scopes has no post-rewrite home.
    let mut order_by = Vec::with_capacity(select.order_by().len());
    for o in select.order_by() {
        let e = subst(&o.expr);
        if contains_outer_reference(&e, outer) {
            if only_outer_references(&e, outer) {
                changed = true;
                continue;
            }
            return Err(SkipReason::MixedOrdering);
        }
        changed |= !Arc::ptr_eq(&e, &o.expr);
        order_by.push(Ordering { expr: e, asc: o.asc });
    }

    // Projections that echo an outer column are removed; the enclosing select
    // rewrites its references through the remap instead. Anything else
    // correlated in a projection cannot be expressed after decorrelation.
    let mut projections = Vec::with_capacity(select.projections().len());
    let mut remaps = Vec::new();
    for p in select.projections() {
        let e = subst(&p.expr);
        if contains_outer_reference(&e, outer) {
            if e.as_column().is_some() {
                remaps.push(Remap {
                    select: select.alias().to_string(),
                    alias: p.alias.clone(),
                    target: e,
                });
                changed = true;
                continue;
            }
            return Err(SkipReason::CompoundCorrelatedProjection);
        }
        changed |= !Arc::ptr_eq(&e, &p.expr);
        projections.push(Projection {
            expr: e,
            alias: p.alias.clone(),
        });
    }
    if projections.is_empty() && !remaps.is_empty() {
        projections.push(dummy_projection());
    }

    let mut exposed = ExposedSelect::new(select);
    {
        let b = exposed.builder_mut();
        b.tables = tables;
        b.predicate = None;
        b.group_by = group_by;
        b.having = having;
        b.order_by = order_by;
        b.projections = projections;
    }
    if changed {
        exposed.mark_changed();
    }

    // One predicate pool: the select's own conjuncts plus everything lifted
    // from nested scopes, split and lifted uniformly.
    let mut pool: Vec<ExprRef> = predicate
        .as_ref()
        .map(|p| conjuncts(p).to_vec())
        .unwrap_or_default();
    let pool_grew = !lifted.is_empty();
    pool.extend(lifted);
    let combined = conjoin(pool);
    let parts = split(combined.as_ref(), outer);
    let correlated = parts.has_correlation();

    let mut conditions = Vec::new();
    for cmp in &parts.comparisons {
        if exposed.grouped() && cmp.op != BinaryOperator::Eq {
            return Err(SkipReason::NonEqualityCorrelation);
        }
        let inner_ref = match cmp.inner.as_column() {
            Some(c) => exposed
                .ensure_projected(c)
                .map(expr::column)
                .ok_or(SkipReason::UnprojectableColumn)?,
            None => exposed
                .remap(&cmp.inner, outer)
                .ok_or(SkipReason::UnprojectableColumn)?,
        };
        conditions.push(binary(cmp.op, expr::column(cmp.outer.clone()), inner_ref));
    }
    conditions.extend(parts.both_outer);
    for e in &parts.complex {
        let remapped = exposed
            .remap(e, outer)
            .ok_or(SkipReason::UnprojectableColumn)?;
        conditions.push(remapped);
    }

    if correlated || pool_grew {
        exposed.mark_changed();
    }
    exposed.builder_mut().predicate = conjoin(parts.local);

    Ok(Extraction {
        select: exposed.finish(select),
        conditions,
        remaps,
    })
}

/// Rewrite an ordinary join whose joined select (or something nested inside
/// it) references enclosing scopes: extract the correlations and AND them
/// onto the join's own condition. The join keeps its kind; a LEFT join stays
/// null-extending, with the lifted conditions deciding matches.
pub(crate) fn try_rewrite_join(
    join: &crate::table::Join,
    select: &SelectRef,
    outer: &AliasSet,
) -> Result<(crate::table::Join, Vec<Remap>), SkipReason> {
    let ext = extract_correlations(select, outer)?;
    if ext.conditions.is_empty() && ext.remaps.is_empty() && Arc::ptr_eq(&ext.select, select) {
        return Err(SkipReason::NoExtractableCorrelation);
    }
    let mut conjs: Vec<ExprRef> = join
        .condition()
        .map(|c| conjuncts(c).to_vec())
        .unwrap_or_default();
    conjs.extend(ext.conditions);
    let rebuilt = join.rebuilt(
        Table::Derived(DerivedTable::new(ext.select)),
        conjoin(conjs),
    );
    Ok((rebuilt, ext.remaps))
}

/// Extract from one FROM-list entry. `Ok(None)` means the entry is untouched.
fn extract_from_table(
    table: &Table,
    outer: &AliasSet,
    lifted: &mut Vec<ExprRef>,
    remaps: &mut Vec<Remap>,
) -> Result<Option<Table>, SkipReason> {
    match table {
        Table::Base(_) => Ok(None),
        // A leftover apply is one the driver already declined to rewrite;
        // lifting around it cannot be sound either.
        Table::Apply(_) => {
            if table_references(table, outer) {
                Err(SkipReason::NestedCorrelatedSubquery)
            } else {
                Ok(None)
            }
        }
        Table::Derived(derived) => {
            if !select_references(derived.select(), outer) {
                return Ok(None);
            }
            let ext = extract_correlations(derived.select(), outer)?;
            lifted.extend(ext.conditions);
            remaps.extend(ext.remaps);
            if Arc::ptr_eq(&ext.select, derived.select()) {
                Ok(None)
            } else {
                Ok(Some(Table::Derived(DerivedTable::new(ext.select))))
            }
        }
        Table::Join(join) => {
            if !table_references(table, outer) {
                return Ok(None);
            }
            if join.kind() == JoinKind::Left {
                return Err(SkipReason::CorrelatedOuterJoinCondition);
            }
            let inner = extract_from_table(join.table(), outer, lifted, remaps)?;
            let mut condition_changed = false;
            let condition = match join.condition() {
                Some(c) => {
                    let mut kept = Vec::new();
                    for conj in conjuncts(c) {
                        if contains_outer_reference(&conj, outer) {
                            lifted.push(conj);
                            condition_changed = true;
                        } else {
                            kept.push(conj);
                        }
                    }
                    conjoin(kept)
                }
                None => None,
            };
            if inner.is_none() && !condition_changed {
                return Ok(None);
            }
            let inner = inner.unwrap_or_else(|| join.table().clone());
            Ok(Some(Table::Join(join.rebuilt(inner, condition))))
        }
    }
}
