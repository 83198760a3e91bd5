//! Column exposure.
//!
//! A predicate lifted out of a subquery may only reference the subquery
//! through its output list. [`ExposedSelect`] wraps a select being rebuilt and
//! hands out outer-facing references, synthesizing `_corr_*` projections for
//! inner columns that were not already projected.
//!
//! Exposure has hard limits. A column can only be exposed when its alias is
//! one of the select's *direct* FROM-list entries: an alias from an enclosing
//! scope is a true correlation (the caller lifts it verbatim instead), and an
//! alias from a deeper nested scope cannot be reached from here at all. On a
//! grouped select, only a bare column may be exposed (it joins the grouping
//! key, which an equality against it pins to one value per outer row);
//! exposing through an arbitrary expression would refine the grouping and
//! change aggregate results. A select with aggregate projections but no GROUP
//! BY cannot expose anything.

use crate::analyze::AliasSet;
use crate::expr::{self, Column, Expr, ExprRef};
use crate::plan::visit::map_columns;
use crate::plan::{Projection, Select, SelectBuilder, SelectRef};

/// Marker for a column that cannot be exposed at this level.
pub(crate) struct Unprojectable;

pub(crate) struct ExposedSelect {
    builder: SelectBuilder,
    own_aliases: AliasSet,
    grouped: bool,
    implicitly_grouped: bool,
    changed: bool,
}

impl ExposedSelect {
    pub fn new(select: &Select) -> Self {
        let own_aliases = select
            .table_aliases()
            .map(|a| a.to_string())
            .collect::<AliasSet>();
        let grouped = !select.group_by().is_empty();
        let implicitly_grouped = !grouped && select.has_aggregate_projection();
        Self {
            builder: select.to_builder(),
            own_aliases,
            grouped,
            implicitly_grouped,
            changed: false,
        }
    }

    pub fn alias(&self) -> &str {
        &self.builder.alias
    }

    pub fn owns(&self, alias: &str) -> bool {
        self.own_aliases.contains(alias)
    }

    /// Whether the select carries an explicit GROUP BY.
    pub fn grouped(&self) -> bool {
        self.grouped
    }

    pub fn builder_mut(&mut self) -> &mut SelectBuilder {
        &mut self.builder
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Outer-facing reference for `column`, reusing an existing projection or
    /// synthesizing `column AS _corr_<name>`. `None` when the column does not
    /// belong to this select's direct table list or the select cannot expose
    /// a new column without changing its semantics.
    pub fn ensure_projected(&mut self, column: &Column) -> Option<Column> {
        if !self.owns(&column.table) || self.implicitly_grouped {
            return None;
        }

        let existing = self.builder.projections.iter().find(|p| {
            p.expr
                .as_column()
                .map(|c| c.same_source(column))
                .unwrap_or(false)
        });
        let alias = match existing {
            Some(p) => p.alias.clone(),
            None => {
                let alias = self.fresh_alias(&format!("_corr_{}", column.name));
                let expr = expr::column(column.clone());
                self.builder
                    .projections
                    .push(Projection::new(expr.clone(), &alias));
                if self.grouped && !self.builder.group_by.iter().any(|g| *g == expr) {
                    self.builder.group_by.push(expr);
                }
                self.changed = true;
                alias
            }
        };

        let mut exposed = Column::new(self.alias(), alias, column.ty);
        exposed.nullable = column.nullable;
        Some(exposed)
    }

    /// Rewrite `expr` so it can live in the destination join condition: outer
    /// columns are kept, columns of this select's own tables are exposed and
    /// substituted, anything else aborts.
    pub fn remap(&mut self, expr: &ExprRef, outer: &AliasSet) -> Option<ExprRef> {
        let expose_allowed = !self.grouped && !self.implicitly_grouped;
        let result = map_columns(expr, &mut |c: &Column| {
            if outer.contains(&c.table) {
                return Ok(None);
            }
            if !expose_allowed {
                return Err(Unprojectable);
            }
            match self.ensure_projected_inner(c) {
                Some(exposed) => Ok(Some(expr::column(exposed))),
                None => Err(Unprojectable),
            }
        });
        result.ok()
    }

    // Borrow-splitting helper so `remap`'s closure can expose columns.
    fn ensure_projected_inner(&mut self, column: &Column) -> Option<Column> {
        self.ensure_projected(column)
    }

    fn fresh_alias(&self, base: &str) -> String {
        let taken = |candidate: &str| {
            self.builder
                .projections
                .iter()
                .any(|p| p.alias == candidate)
        };
        if !taken(base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// The rebuilt select, or `original` itself (pointer-equal) when nothing
    /// changed.
    pub fn finish(self, original: &SelectRef) -> SelectRef {
        if self.changed {
            self.builder.build()
        } else {
            original.clone()
        }
    }
}

/// Non-failing remap used when applying a projection remap table: unmatched
/// columns are kept as-is.
pub(crate) fn substitute_columns(
    expr: &ExprRef,
    f: &mut dyn FnMut(&Column) -> Option<ExprRef>,
) -> ExprRef {
    enum Never {}
    let result: Result<ExprRef, Never> = map_columns(expr, &mut |c| Ok(f(c)));
    match result {
        Ok(mapped) => mapped,
        Err(never) => match never {},
    }
}

/// Dummy projection used when every original projection was a correlated echo.
pub(crate) fn dummy_projection() -> Projection {
    Projection::new(expr::lit(1i64), "_one")
}

/// Whether `expr` still is exactly the dummy projection.
#[allow(dead_code)]
pub(crate) fn is_dummy(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(crate::expr::Literal::Int(1)))
}
