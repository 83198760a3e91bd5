use std::sync::Arc;

use crate::expr::ExprRef;
use crate::plan::{Ordering, Projection, Select, SelectRef};
use crate::table::{
    Apply, ApplyKind, BaseTable, DerivedTable, Join, JoinKind, Table,
};

/// Builder for [`Select`] nodes, used by the upstream plan translator, the
/// rewriters and tests.
#[derive(Clone, Debug)]
pub struct SelectBuilder {
    pub(crate) alias: String,
    pub(crate) tables: Vec<Table>,
    pub(crate) predicate: Option<ExprRef>,
    pub(crate) group_by: Vec<ExprRef>,
    pub(crate) having: Option<ExprRef>,
    pub(crate) projections: Vec<Projection>,
    pub(crate) order_by: Vec<Ordering>,
    pub(crate) offset: Option<u64>,
    pub(crate) limit: Option<u64>,
}

impl SelectBuilder {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            tables: vec![],
            predicate: None,
            group_by: vec![],
            having: None,
            projections: vec![],
            order_by: vec![],
            offset: None,
            limit: None,
        }
    }

    pub(crate) fn from_select(select: &Select) -> Self {
        Self {
            alias: select.alias().to_string(),
            tables: select.tables().to_vec(),
            predicate: select.predicate().cloned(),
            group_by: select.group_by().to_vec(),
            having: select.having().cloned(),
            projections: select.projections().to_vec(),
            order_by: select.order_by().to_vec(),
            offset: select.offset(),
            limit: select.limit(),
        }
    }

    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn base(self, name: &str, alias: &str) -> Self {
        self.table(Table::Base(BaseTable::new(name, alias)))
    }

    pub fn derived(self, select: SelectRef) -> Self {
        self.table(Table::Derived(DerivedTable::new(select)))
    }

    pub fn join(self, kind: JoinKind, table: Table, condition: Option<ExprRef>) -> Self {
        self.table(Table::Join(Join::new(kind, table, condition)))
    }

    pub fn join_derived(
        self,
        kind: JoinKind,
        select: SelectRef,
        condition: Option<ExprRef>,
    ) -> Self {
        self.join(kind, Table::Derived(DerivedTable::new(select)), condition)
    }

    pub fn cross_apply(self, select: SelectRef) -> Self {
        self.table(Table::Apply(Apply::new(
            ApplyKind::Cross,
            Table::Derived(DerivedTable::new(select)),
        )))
    }

    pub fn outer_apply(self, select: SelectRef) -> Self {
        self.table(Table::Apply(Apply::new(
            ApplyKind::Outer,
            Table::Derived(DerivedTable::new(select)),
        )))
    }

    pub fn predicate(mut self, predicate: ExprRef) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn group_by(mut self, expr: ExprRef) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, having: ExprRef) -> Self {
        self.having = Some(having);
        self
    }

    pub fn project(mut self, expr: ExprRef, alias: &str) -> Self {
        self.projections.push(Projection::new(expr, alias));
        self
    }

    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.order_by.push(ordering);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(self) -> SelectRef {
        Arc::new(Select {
            alias: self.alias,
            tables: self.tables,
            predicate: self.predicate,
            group_by: self.group_by,
            having: self.having,
            projections: self.projections,
            order_by: self.order_by,
            offset: self.offset,
            limit: self.limit,
        })
    }
}
