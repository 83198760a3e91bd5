use std::fmt::{self, Formatter};

use strum_macros::AsRefStr;

use crate::expr::ExprRef;
use crate::table::{Table, TableAttrs};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, AsRefStr)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

/// An ordinary join against the tables to its left in the FROM list.
///
/// A join with no condition matches every pair of rows, which is how a
/// `CrossJoin` and a condition-stripped `InnerJoin` are both represented.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    kind: JoinKind,
    table: Box<Table>,
    condition: Option<ExprRef>,
    /// Whether a downstream optimizer may remove the join when nothing
    /// references its columns. Joins synthesized by decorrelation are never
    /// prunable: their conditions carry filtering semantics.
    prunable: bool,
}

impl Join {
    pub fn new(kind: JoinKind, table: Table, condition: Option<ExprRef>) -> Self {
        Self {
            kind,
            table: Box::new(table),
            condition,
            prunable: false,
        }
    }

    pub fn with_prunable(mut self, prunable: bool) -> Self {
        self.prunable = prunable;
        self
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn condition(&self) -> Option<&ExprRef> {
        self.condition.as_ref()
    }

    pub fn prunable(&self) -> bool {
        self.prunable
    }

    /// Copy of this join with a replaced joined table and condition.
    pub fn rebuilt(&self, table: Table, condition: Option<ExprRef>) -> Join {
        Join {
            kind: self.kind,
            table: Box::new(table),
            condition,
            prunable: self.prunable,
        }
    }
}

impl TableAttrs for Join {
    fn alias(&self) -> &str {
        self.table.alias()
    }

    fn display(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("");
        s.field("kind", &self.kind);
        if let Some(condition) = &self.condition {
            s.field("condition", &format_args!("{condition}"));
        }
        s.finish()
    }
}
