//! Clause nodes shared by the statement builders.

use crate::error::{OrmError, OrmResult};
use crate::expr::Expr;
use crate::schema::Table;
use crate::sql::{Dialect, Node, RenderContext, Scope};

/// `FROM` source: a single table or a chain of joins.
#[derive(Debug, Clone)]
pub enum Source {
    Table(Table),
    Join(Box<Join>),
}

impl Source {
    /// Every table in the source, leftmost first.
    pub fn tables(&self) -> Vec<&Table> {
        match self {
            Source::Table(t) => vec![t],
            Source::Join(join) => {
                let mut tables = join.left.tables();
                tables.push(&join.right);
                tables
            }
        }
    }

    /// The leftmost table.
    pub fn root(&self) -> &Table {
        match self {
            Source::Table(t) => t,
            Source::Join(join) => join.left.root(),
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(self, Source::Join(_))
    }
}

impl Node for Source {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        match self {
            Source::Table(t) => t.render(ctx),
            Source::Join(join) => join.render(ctx),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => " INNER JOIN ",
            JoinKind::Left => " LEFT JOIN ",
            JoinKind::Right => " RIGHT JOIN ",
            JoinKind::Full => " FULL OUTER JOIN ",
            JoinKind::Cross => " CROSS JOIN ",
        }
    }
}

/// `left KIND JOIN right [ON cond]`
#[derive(Debug, Clone)]
pub struct Join {
    pub left: Source,
    pub right: Table,
    pub kind: JoinKind,
    pub on: Option<Expr>,
}

impl Node for Join {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        if self.kind == JoinKind::Full && ctx.dialect() == Dialect::MySql {
            return Err(OrmError::Unsupported("FULL OUTER JOIN on mysql".into()));
        }
        if self.kind == JoinKind::Cross && self.on.is_some() {
            return Err(OrmError::usage("CROSS JOIN takes no ON condition"));
        }

        self.left.render(ctx)?;
        ctx.literal(self.kind.keyword());
        self.right.render(ctx)?;
        if let Some(on) = &self.on {
            ctx.literal(" ON ");
            let mut fragment = ctx.fragment();
            on.render(&mut fragment)?;
            ctx.splice(fragment)?;
        }
        Ok(())
    }
}

/// `(c1, c2) VALUES (v1, v2), (v3, v4)`
///
/// Every row carries one value per column, in column order.
#[derive(Debug, Clone)]
pub struct ValuesClause {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expr>>,
}

impl ValuesClause {
    /// Build from rows of `(column, value)` pairs.
    ///
    /// Column order follows the first row; every other row must name exactly
    /// the same columns.
    pub fn from_rows(rows: Vec<Vec<(String, Expr)>>) -> OrmResult<Self> {
        let mut iter = rows.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| OrmError::usage("insert has no rows"))?;
        if first.is_empty() {
            return Err(OrmError::usage("insert row has no columns"));
        }

        let columns: Vec<String> = first.iter().map(|(c, _)| c.clone()).collect();
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].contains(column) {
                return Err(OrmError::usage(format!("column {column} given twice")));
            }
        }

        let mut out = vec![first.into_iter().map(|(_, v)| v).collect::<Vec<_>>()];
        for (n, mut row) in iter.enumerate() {
            if row.len() != columns.len() {
                return Err(OrmError::usage(format!(
                    "row {} has {} columns, expected {}",
                    n + 1,
                    row.len(),
                    columns.len()
                )));
            }
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                let idx = row.iter().position(|(c, _)| c == column).ok_or_else(|| {
                    OrmError::usage(format!("row {} is missing column {column}", n + 1))
                })?;
                values.push(row.swap_remove(idx).1);
            }
            out.push(values);
        }

        Ok(Self { columns, rows: out })
    }

    pub fn is_many(&self) -> bool {
        self.rows.len() > 1
    }

    pub(crate) fn render_columns(columns: &[String], ctx: &mut RenderContext) -> OrmResult<()> {
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
}

impl Node for ValuesClause {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        Self::render_columns(&self.columns, ctx)?;
        ctx.literal(" VALUES ");
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(OrmError::usage("values row does not match the column list"));
            }
            if i > 0 {
                ctx.literal(", ");
            }
            ctx.scope(
                Scope {
                    parens: true,
                    in_values: true,
                    qualify: false,
                },
                |ctx| {
                    for (j, value) in row.iter().enumerate() {
                        if j > 0 {
                            ctx.literal(", ");
                        }
                        value.render(ctx)?;
                    }
                    Ok(())
                },
            )?;
        }
        Ok(())
    }
}

/// `column = value` in an `UPDATE ... SET` list.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

/// The `SET` list of an update.
#[derive(Debug, Clone, Default)]
pub struct AssignmentList(pub Vec<Assignment>);

impl AssignmentList {
    /// Set `column`, replacing an earlier assignment to the same column.
    pub fn set(&mut self, column: String, value: Expr) {
        match self.0.iter_mut().find(|a| a.column == column) {
            Some(slot) => slot.value = value,
            None => self.0.push(Assignment { column, value }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AssignmentList {
    /// Render with every target column qualified by `table`, as a mysql
    /// multi-table update needs.
    pub fn render_targets_of(
        &self,
        table: Option<&str>,
        ctx: &mut RenderContext,
    ) -> OrmResult<()> {
        if self.0.is_empty() {
            return Err(OrmError::usage("update has nothing to set"));
        }
        for (i, Assignment { column, value }) in self.0.iter().enumerate() {
            if i > 0 {
                ctx.literal(", ");
            }
            if let Some(table) = table {
                ctx.ident(table)?.literal(".");
            }
            ctx.ident(column)?.literal(" = ");
            match value {
                Expr::Value(_) | Expr::Column(_) => value.render(ctx)?,
                _ => {
                    let mut fragment = ctx.fragment();
                    value.render(&mut fragment)?;
                    ctx.splice(fragment)?;
                }
            }
        }
        Ok(())
    }
}

impl Node for AssignmentList {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        self.render_targets_of(None, ctx)
    }
}
