//! Apply-to-join conversion.
//!
//! An apply node carries no condition of its own, so once every correlated
//! piece of the applied select has been extracted, the apply collapses into an
//! ordinary join carrying the lifted conditions: `CrossApply` keeps inner-join
//! semantics, `OuterApply` keeps its null-extending row and becomes a LEFT
//! JOIN. An apply whose body turns out to reference nothing outer is left
//! alone; it never had a correlation to extract.

use std::sync::Arc;

use crate::analyze::AliasSet;
use crate::expr::{conjoin, lit};
use crate::rewrite::join::{extract_correlations, Remap};
use crate::rewrite::SkipReason;
use crate::table::{Apply, DerivedTable, Join, Table};

pub(crate) fn try_rewrite_apply(
    apply: &Apply,
    select: &crate::plan::SelectRef,
    outer: &AliasSet,
) -> Result<(Join, Vec<Remap>), SkipReason> {
    let ext = extract_correlations(select, outer)?;
    if ext.conditions.is_empty()
        && ext.remaps.is_empty()
        && Arc::ptr_eq(&ext.select, select)
    {
        return Err(SkipReason::NoExtractableCorrelation);
    }

    // Correlation carried only by echoed projections produces no condition;
    // the join still needs one to stay non-prunable downstream.
    let condition = conjoin(ext.conditions).unwrap_or_else(|| lit(true));
    let join = Join::new(
        apply.kind().join_kind(),
        Table::Derived(DerivedTable::new(ext.select)),
        Some(condition),
    );
    Ok((join, ext.remaps))
}
