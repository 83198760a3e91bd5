use std::fmt::{self, Formatter};

use crate::plan::SelectRef;
use crate::table::TableAttrs;

/// A nested select used as a table.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedTable {
    select: SelectRef,
}

impl DerivedTable {
    pub fn new(select: SelectRef) -> Self {
        Self { select }
    }

    pub fn select(&self) -> &SelectRef {
        &self.select
    }
}

impl TableAttrs for DerivedTable {
    fn alias(&self) -> &str {
        self.select.alias()
    }

    fn display(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("")
            .field("alias", &self.select.alias())
            .finish()
    }
}
