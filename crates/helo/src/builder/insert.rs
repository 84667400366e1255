//! INSERT and REPLACE builders.

use super::clause::ValuesClause;
use super::select::Select;
use super::{BuildErrors, Statement, usage_message};
use crate::error::{OrmError, OrmResult};
use crate::expr::{Expr, IntoExpr};
use crate::row::Row;
use crate::schema::Table;
use crate::sql::{Dialect, Node, RenderContext};

#[derive(Debug, Clone)]
enum Payload {
    Empty,
    Values(ValuesClause),
    Select {
        columns: Vec<String>,
        query: Box<Select>,
    },
}

fn pairs<I, K, V>(row: I) -> Vec<(String, Expr)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: IntoExpr,
{
    row.into_iter()
        .map(|(k, v)| (k.into(), v.into_expr()))
        .collect()
}

fn row_pairs(row: Row) -> Vec<(String, Expr)> {
    row.into_iter().map(|(k, v)| (k, Expr::Value(v))).collect()
}

/// INSERT statement builder.
///
/// Holds a single row, a batch of rows sharing one column set, or a SELECT
/// feeding an explicit column list. Each payload call replaces the previous one.
#[must_use]
#[derive(Debug, Clone)]
pub struct Insert {
    table: Table,
    payload: Payload,
    returning: Option<String>,
    build_errors: BuildErrors,
}

impl Insert {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            payload: Payload::Empty,
            returning: None,
            build_errors: BuildErrors::default(),
        }
    }

    fn set_rows(mut self, rows: Vec<Vec<(String, Expr)>>) -> Self {
        match ValuesClause::from_rows(rows) {
            Ok(values) => {
                self.payload = Payload::Values(values);
                self.build_errors.set("payload", None);
            }
            Err(e) => self.build_errors.set("payload", Some(usage_message(e))),
        }
        self
    }

    /// A single row of `(column, value)` pairs.
    pub fn row<I, K, V>(self, row: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoExpr,
    {
        self.set_rows(vec![pairs(row)])
    }

    /// A batch of rows. All rows must name the same columns.
    pub fn rows<R, I, K, V>(self, rows: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoExpr,
    {
        self.set_rows(rows.into_iter().map(pairs).collect())
    }

    /// A single [`Row`] of values.
    pub fn values(self, row: Row) -> Self {
        self.set_rows(vec![row_pairs(row)])
    }

    /// A batch of [`Row`]s.
    pub fn values_many(self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.set_rows(rows.into_iter().map(row_pairs).collect())
    }

    /// `INSERT INTO t (columns) SELECT ...`. The column list is required.
    pub fn from_select<I, S>(mut self, columns: I, query: Select) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let error = columns
            .is_empty()
            .then(|| "insert from select needs an explicit column list".to_string());
        self.build_errors.set("payload", error);
        self.payload = Payload::Select {
            columns,
            query: Box::new(query),
        };
        self
    }

    /// `RETURNING column` (postgres), so the backend reports the generated id.
    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning = Some(column.into());
        self
    }
}

impl Node for Insert {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        self.build_errors.check()?;

        ctx.literal("INSERT INTO ");
        self.table.render(ctx)?;
        ctx.literal(" ");
        match &self.payload {
            Payload::Empty => return Err(OrmError::usage("insert has no values")),
            Payload::Values(values) => values.render(ctx)?,
            Payload::Select { columns, query } => {
                ValuesClause::render_columns(columns, ctx)?;
                ctx.literal(" ");
                ctx.subquery(|ctx| query.render(ctx))?;
            }
        }

        if let Some(column) = &self.returning {
            if ctx.dialect() == Dialect::MySql {
                return Err(OrmError::Unsupported("RETURNING on mysql".into()));
            }
            ctx.literal(" RETURNING ").ident(column)?;
        }
        Ok(())
    }
}

impl Statement for Insert {
    fn expects_rows(&self) -> bool {
        self.returning.is_some()
    }

    fn is_many(&self) -> bool {
        matches!(&self.payload, Payload::Values(v) if v.is_many())
    }
}

/// REPLACE statement builder: insert, or overwrite the row with the same key.
///
/// Renders `REPLACE INTO` on mysql and an `ON CONFLICT (pk) DO UPDATE` upsert
/// on postgres, which needs the table's primary key.
#[must_use]
#[derive(Debug, Clone)]
pub struct Replace {
    table: Table,
    values: Option<ValuesClause>,
    build_errors: BuildErrors,
}

impl Replace {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            values: None,
            build_errors: BuildErrors::default(),
        }
    }

    fn set_rows(mut self, rows: Vec<Vec<(String, Expr)>>) -> Self {
        match ValuesClause::from_rows(rows) {
            Ok(values) => {
                self.values = Some(values);
                self.build_errors.set("payload", None);
            }
            Err(e) => self.build_errors.set("payload", Some(usage_message(e))),
        }
        self
    }

    pub fn row<I, K, V>(self, row: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoExpr,
    {
        self.set_rows(vec![pairs(row)])
    }

    pub fn rows<R, I, K, V>(self, rows: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoExpr,
    {
        self.set_rows(rows.into_iter().map(pairs).collect())
    }

    pub fn values(self, row: Row) -> Self {
        self.set_rows(vec![row_pairs(row)])
    }

    pub fn values_many(self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.set_rows(rows.into_iter().map(row_pairs).collect())
    }
}

impl Node for Replace {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        self.build_errors.check()?;
        let values = self
            .values
            .as_ref()
            .ok_or_else(|| OrmError::usage("replace has no values"))?;

        match ctx.dialect() {
            Dialect::MySql => {
                ctx.literal("REPLACE INTO ");
                self.table.render(ctx)?;
                ctx.literal(" ");
                values.render(ctx)
            }
            Dialect::Postgres => {
                let pk = self.table.require_primary_key()?;
                ctx.literal("INSERT INTO ");
                self.table.render(ctx)?;
                ctx.literal(" ");
                values.render(ctx)?;
                ctx.literal(" ON CONFLICT (").ident(&pk.name)?.literal(") DO ");

                let updates: Vec<&String> =
                    values.columns.iter().filter(|c| **c != pk.name).collect();
                if updates.is_empty() {
                    ctx.literal("NOTHING");
                    return Ok(());
                }
                ctx.literal("UPDATE SET ");
                for (i, column) in updates.into_iter().enumerate() {
                    if i > 0 {
                        ctx.literal(", ");
                    }
                    ctx.ident(column)?.literal(" = EXCLUDED.").ident(column)?;
                }
                Ok(())
            }
        }
    }
}

impl Statement for Replace {
    fn expects_rows(&self) -> bool {
        false
    }

    fn is_many(&self) -> bool {
        self.values.as_ref().is_some_and(ValuesClause::is_many)
    }
}

impl Table {
    pub fn insert(&self) -> Insert {
        Insert::new(self.clone())
    }

    pub fn replace(&self) -> Replace {
        Replace::new(self.clone())
    }
}
