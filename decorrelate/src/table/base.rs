use std::fmt::{self, Formatter};

use crate::table::TableAttrs;

/// A named table from the catalog, bound to an alias.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct BaseTable {
    name: String,
    alias: String,
}

impl BaseTable {
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TableAttrs for BaseTable {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn display(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .finish()
    }
}
