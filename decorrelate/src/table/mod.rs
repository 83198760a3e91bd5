//! FROM-list vocabulary.
//!
//! A [`crate::plan::Select`] owns an ordered table list. The first entry is
//! usually a [`BaseTable`] or [`DerivedTable`]; subsequent entries are
//! [`Join`]s or [`Apply`]s against everything to their left. Aliases become
//! visible left to right, which is what the rewriters' growing outer-alias set
//! models.

mod base;
pub use base::*;
mod join;
pub use join::*;
mod apply;
pub use apply::*;
mod derived;
pub use derived::*;

use std::fmt::{self, Display, Formatter};

use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;
use strum_macros::AsRefStr;

#[enum_dispatch(Table)]
pub trait TableAttrs {
    /// Alias under which this table's columns are visible.
    fn alias(&self) -> &str;

    fn display(&self, f: &mut Formatter<'_>) -> fmt::Result;
}

#[derive(Clone, Debug, PartialEq, EnumAsInner, AsRefStr)]
#[enum_dispatch]
pub enum Table {
    Base(BaseTable),
    Join(Join),
    Apply(Apply),
    Derived(DerivedTable),
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())?;
        TableAttrs::display(self, f)
    }
}
