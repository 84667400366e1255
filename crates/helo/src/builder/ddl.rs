//! Parameter-free schema statements: SHOW, CREATE TABLE, DROP TABLE.

use super::Statement;
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::ident::Ident;
use crate::row::Row;
use crate::schema::Table;
use crate::sql::{Dialect, Node, Query, RenderContext};
use crate::value::quote_literal;

/// What a [`Show`] statement reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowKind {
    /// The `CREATE TABLE` statement (mysql only).
    CreateSyntax,
    Columns,
    Indexes,
}

/// Table introspection.
///
/// Mysql uses its `SHOW` statements; postgres reads `information_schema` and
/// `pg_indexes` with the table name inlined as a quoted literal.
#[must_use]
#[derive(Debug, Clone)]
pub struct Show {
    table: Table,
    kind: ShowKind,
}

impl Show {
    pub fn new(table: Table, kind: ShowKind) -> Self {
        Self { table, kind }
    }

    /// Text of `SHOW CREATE TABLE`.
    pub async fn create_syntax(table: Table, ex: &impl Executor) -> OrmResult<Option<String>> {
        let rows = Self::new(table, ShowKind::CreateSyntax).query(ex).await?;
        match rows.first() {
            Some(row) if row.contains("Create Table") => row.get("Create Table"),
            Some(row) => row.get_idx(1),
            None => Ok(None),
        }
    }

    pub async fn columns(table: Table, ex: &impl Executor) -> OrmResult<Vec<Row>> {
        Self::new(table, ShowKind::Columns).query(ex).await
    }

    pub async fn indexes(table: Table, ex: &impl Executor) -> OrmResult<Vec<Row>> {
        Self::new(table, ShowKind::Indexes).query(ex).await
    }
}

impl Node for Show {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        match (ctx.dialect(), self.kind) {
            (Dialect::MySql, ShowKind::CreateSyntax) => {
                ctx.literal("SHOW CREATE TABLE ");
                self.table.render(ctx)
            }
            (Dialect::MySql, ShowKind::Columns) => {
                ctx.literal("SHOW FULL COLUMNS FROM ");
                self.table.render(ctx)
            }
            (Dialect::MySql, ShowKind::Indexes) => {
                ctx.literal("SHOW INDEX FROM ");
                self.table.render(ctx)
            }
            (Dialect::Postgres, ShowKind::CreateSyntax) => Err(OrmError::Unsupported(
                "SHOW CREATE TABLE on postgres".into(),
            )),
            (Dialect::Postgres, ShowKind::Columns) => {
                let name = quote_literal(Ident::parse(&self.table.name)?.name());
                ctx.literal(
                    "SELECT column_name, data_type, is_nullable, column_default \
                     FROM information_schema.columns WHERE table_name = ",
                )
                .literal(&name)
                .literal(" ORDER BY ordinal_position");
                Ok(())
            }
            (Dialect::Postgres, ShowKind::Indexes) => {
                let name = quote_literal(Ident::parse(&self.table.name)?.name());
                ctx.literal("SELECT indexname, indexdef FROM pg_indexes WHERE tablename = ")
                    .literal(&name);
                Ok(())
            }
        }
    }
}

impl Statement for Show {
    fn expects_rows(&self) -> bool {
        true
    }
}

/// `CREATE TABLE` from a [`Table`] description.
///
/// `IF NOT EXISTS` is on by default. On postgres, non-unique indexes cannot be
/// declared inline; [`CreateTable::index_queries`] returns the extra
/// `CREATE INDEX` statements.
#[must_use]
#[derive(Debug, Clone)]
pub struct CreateTable {
    table: Table,
    if_not_exists: bool,
    temporary: bool,
}

impl CreateTable {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            if_not_exists: true,
            temporary: false,
        }
    }

    pub fn if_not_exists(mut self, yes: bool) -> Self {
        self.if_not_exists = yes;
        self
    }

    pub fn temporary(mut self, yes: bool) -> Self {
        self.temporary = yes;
        self
    }

    /// Separate index statements needed after the table is created.
    pub fn index_queries(&self, dialect: Dialect) -> OrmResult<Vec<Query>> {
        if dialect != Dialect::Postgres {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for index in self.table.indexes.iter().filter(|i| !i.unique) {
            let mut ctx = RenderContext::new(dialect);
            ctx.literal("CREATE INDEX ");
            if self.if_not_exists {
                ctx.literal("IF NOT EXISTS ");
            }
            ctx.ident(&index.name)?.literal(" ON ");
            self.table.render(&mut ctx)?;
            render_column_list(&index.columns, &mut ctx)?;
            out.push(ctx.finish(false).query);
        }
        Ok(out)
    }
}

fn render_column_list(columns: &[String], ctx: &mut RenderContext) -> OrmResult<()> {
    ctx.literal(" ");
    ctx.parens(|ctx| {
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                ctx.literal(", ");
            }
            ctx.ident(column)?;
        }
        Ok(())
    })
}

impl Node for CreateTable {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        self.table.validate()?;
        let dialect = ctx.dialect();

        ctx.literal("CREATE ");
        if self.temporary {
            ctx.literal("TEMPORARY ");
        }
        ctx.literal("TABLE ");
        if self.if_not_exists {
            ctx.literal("IF NOT EXISTS ");
        }
        self.table.render(ctx)?;
        ctx.literal(" ");

        ctx.parens(|ctx| {
            for (i, column) in self.table.columns.iter().enumerate() {
                if i > 0 {
                    ctx.literal(", ");
                }
                column.render_definition(ctx)?;
            }
            if let Some(pk) = self.table.primary_key() {
                ctx.literal(", PRIMARY KEY");
                render_column_list(std::slice::from_ref(&pk.name), ctx)?;
            }
            for index in &self.table.indexes {
                match (dialect, index.unique) {
                    (Dialect::MySql, true) => {
                        ctx.literal(", UNIQUE KEY ").ident(&index.name)?;
                    }
                    (Dialect::MySql, false) => {
                        ctx.literal(", KEY ").ident(&index.name)?;
                    }
                    (Dialect::Postgres, true) => {
                        ctx.literal(", CONSTRAINT ").ident(&index.name)?.literal(" UNIQUE");
                    }
                    (Dialect::Postgres, false) => continue,
                }
                render_column_list(&index.columns, ctx)?;
            }
            Ok(())
        })?;

        if let (Some(comment), Dialect::MySql) = (&self.table.comment, dialect) {
            ctx.literal(" COMMENT=").literal(&quote_literal(comment));
        }
        Ok(())
    }
}

impl Statement for CreateTable {
    fn expects_rows(&self) -> bool {
        false
    }
}

/// `DROP TABLE`.
#[must_use]
#[derive(Debug, Clone)]
pub struct DropTable {
    table: Table,
    if_exists: bool,
}

impl DropTable {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            if_exists: false,
        }
    }

    pub fn if_exists(mut self, yes: bool) -> Self {
        self.if_exists = yes;
        self
    }
}

impl Node for DropTable {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        ctx.literal("DROP TABLE ");
        if self.if_exists {
            ctx.literal("IF EXISTS ");
        }
        self.table.render(ctx)
    }
}

impl Statement for DropTable {
    fn expects_rows(&self) -> bool {
        false
    }
}

impl Table {
    pub fn create(&self) -> CreateTable {
        CreateTable::new(self.clone())
    }

    pub fn drop(&self) -> DropTable {
        DropTable::new(self.clone())
    }

    pub fn show(&self, kind: ShowKind) -> Show {
        Show::new(self.clone(), kind)
    }
}
