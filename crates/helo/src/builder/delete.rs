//! DELETE builder.

use super::Statement;
use crate::error::{OrmError, OrmResult};
use crate::expr::{Expr, and_};
use crate::schema::Table;
use crate::sql::{Dialect, Node, RenderContext};

/// DELETE statement builder.
///
/// A delete without a WHERE condition is refused unless [`Delete::force`] was
/// called.
#[must_use]
#[derive(Debug, Clone)]
pub struct Delete {
    table: Table,
    filter: Option<Expr>,
    limit: Option<u64>,
    force: bool,
}

impl Delete {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            filter: None,
            limit: None,
            force: false,
        }
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

    /// Allow deleting every row.
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    /// `LIMIT n` (mysql only).
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Node for Delete {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        ctx.literal("DELETE FROM ");
        self.table.render(ctx)?;
        match &self.filter {
            Some(filter) => {
                ctx.literal(" WHERE ").sql(filter)?;
            }
            None if !self.force => {
                return Err(OrmError::DangerousOperation(
                    "delete is too dangerous as no where clause".into(),
                ));
            }
            None => {}
        }
        if let Some(limit) = self.limit {
            if ctx.dialect() != Dialect::MySql {
                return Err(OrmError::Unsupported(format!(
                    "DELETE ... LIMIT on {}",
                    ctx.dialect()
                )));
            }
            ctx.literal(&format!(" LIMIT {limit}"));
        }
        Ok(())
    }
}

impl Statement for Delete {
    fn expects_rows(&self) -> bool {
        false
    }
}

impl Table {
    pub fn delete(&self) -> Delete {
        Delete::new(self.clone())
    }
}
