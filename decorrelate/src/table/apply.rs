use std::fmt::{self, Formatter};

use strum_macros::AsRefStr;

use crate::table::{JoinKind, Table, TableAttrs};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, AsRefStr)]
pub enum ApplyKind {
    Cross,
    Outer,
}

impl ApplyKind {
    /// Join kind an apply of this kind turns into once its correlation has
    /// been extracted.
    pub fn join_kind(&self) -> JoinKind {
        match self {
            ApplyKind::Cross => JoinKind::Inner,
            ApplyKind::Outer => JoinKind::Left,
        }
    }
}

/// A lateral join: the applied table is re-evaluated per row of the tables to
/// its left, so its body may reference their aliases. Carries no join
/// condition; correlation lives inside the applied subquery.
#[derive(Clone, Debug, PartialEq)]
pub struct Apply {
    kind: ApplyKind,
    table: Box<Table>,
}

impl Apply {
    pub fn new(kind: ApplyKind, table: Table) -> Self {
        Self {
            kind,
            table: Box::new(table),
        }
    }

    pub fn kind(&self) -> ApplyKind {
        self.kind
    }

    pub fn table(&self) -> &Table {
        &self.table
    }
}

impl TableAttrs for Apply {
    fn alias(&self) -> &str {
        self.table.alias()
    }

    fn display(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("").field("kind", &self.kind).finish()
    }
}
