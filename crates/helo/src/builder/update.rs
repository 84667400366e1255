//! UPDATE builder.

use super::clause::AssignmentList;
use super::Statement;
use crate::error::OrmResult;
use crate::expr::{Expr, IntoExpr, and_};
use crate::row::Row;
use crate::schema::Table;
use crate::sql::{Dialect, Node, RenderContext, Scope};

/// UPDATE statement builder.
///
/// SET parameters always precede WHERE parameters in the rendered query.
#[must_use]
#[derive(Debug, Clone)]
pub struct Update {
    table: Table,
    assignments: AssignmentList,
    from: Option<Table>,
    filter: Option<Expr>,
}

impl Update {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            assignments: AssignmentList::default(),
            from: None,
            filter: None,
        }
    }

    /// `SET column = value`. The value may be a plain value, a column or any
    /// expression (`col("n") + 1`).
    pub fn set(mut self, column: impl Into<String>, value: impl IntoExpr) -> Self {
        self.assignments.set(column.into(), value.into_expr());
        self
    }

    /// `SET` every column of `values`.
    pub fn set_row(mut self, values: Row) -> Self {
        for (column, value) in values {
            self.assignments.set(column, Expr::Value(value));
        }
        self
    }

    /// Update from a second table: `UPDATE t SET ... FROM other` on postgres,
    /// `UPDATE t, other SET t.col = ...` on mysql. Column references are
    /// qualified with their table name.
    pub fn from(mut self, table: Table) -> Self {
        self.from = Some(table);
        self
    }

    /// Set the WHERE condition, replacing any earlier one.
    #[doc(alias = "where")]
    pub fn filter(mut self, condition: Expr) -> Self {
        self.filter = Some(condition);
        self
    }

    pub fn filter_all(mut self, conditions: impl IntoIterator<Item = Expr>) -> Self {
        let conditions: Vec<Expr> = conditions.into_iter().collect();
        self.filter = (!conditions.is_empty()).then(|| and_(conditions));
        self
    }
}

impl Node for Update {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        let Some(from) = &self.from else {
            ctx.literal("UPDATE ");
            self.table.render(ctx)?;
            ctx.literal(" SET ");
            self.assignments.render(ctx)?;
            if let Some(filter) = &self.filter {
                ctx.literal(" WHERE ").sql(filter)?;
            }
            return Ok(());
        };

        // two tables in play: every column reference names its table
        ctx.scope(Scope::qualified(), |ctx| {
            ctx.literal("UPDATE ");
            self.table.render(ctx)?;
            match ctx.dialect() {
                Dialect::MySql => {
                    ctx.literal(", ");
                    from.render(ctx)?;
                    ctx.literal(" SET ");
                    self.assignments
                        .render_targets_of(Some(&self.table.name), ctx)?;
                }
                Dialect::Postgres => {
                    ctx.literal(" SET ");
                    self.assignments.render(ctx)?;
                    ctx.literal(" FROM ");
                    from.render(ctx)?;
                }
            }
            if let Some(filter) = &self.filter {
                ctx.literal(" WHERE ").sql(filter)?;
            }
            Ok(())
        })
    }
}

impl Statement for Update {
    fn expects_rows(&self) -> bool {
        false
    }
}

impl Table {
    pub fn update(&self) -> Update {
        Update::new(self.clone())
    }
}
