//! SELECT builder.

use super::clause::{Join, JoinKind, Source};
use super::{BuildErrors, Statement};
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::expr::{Expr, IntoExpr, Ordering, and_, count_all};
use crate::row::{FromRow, Row};
use crate::schema::Table;
use crate::sql::{CommaList, Node, RenderContext, Scope};
use crate::value::{FromValue, Value};

/// SELECT statement builder.
///
/// ```ignore
/// let user = users
///     .select()
///     .filter(users.col("id").eq(1))
///     .get(&session)
///     .await?;
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct Select {
    from: Source,
    columns: Vec<Expr>,
    distinct: bool,
    filter: Option<Expr>,
    group_by: Vec<Expr>,
    having: Option<Expr>,
    order_by: Vec<Ordering>,
    limit: Option<u64>,
    offset: Option<u64>,
    build_errors: BuildErrors,
}

impl Select {
    /// `SELECT * FROM table`.
    pub fn new(table: Table) -> Self {
        Self {
            from: Source::Table(table),
            columns: Vec::new(),
            distinct: false,
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            build_errors: BuildErrors::default(),
        }
    }

    /// Replace the column list. An empty list selects `*`.
    pub fn columns<I, T>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoExpr,
    {
        self.columns = columns.into_iter().map(IntoExpr::into_expr).collect();
        self
    }

    /// Append one column.
    pub fn column(mut self, column: impl IntoExpr) -> Self {
        self.columns.push(column.into_expr());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Join another table of the same logical database.
    pub fn join_with(mut self, kind: JoinKind, table: Table, on: Option<Expr>) -> Self {
        let root_db = self.from.root().database.clone();
        if table.database != root_db {
            self.build_errors.push(
                "join",
                format!(
                    "illegal join: {} and {} belong to different databases",
                    self.from.root().name,
                    table.name
                ),
            );
            return self;
        }
        let left = std::mem::replace(&mut self.from, Source::Table(Table::new("")));
        self.from = Source::Join(Box::new(Join {
            left,
            right: table,
            kind,
            on,
        }));
        self
    }

    pub fn join(self, table: Table, on: Expr) -> Self {
        self.join_with(JoinKind::Inner, table, Some(on))
    }

    pub fn left_join(self, table: Table, on: Expr) -> Self {
        self.join_with(JoinKind::Left, table, Some(on))
    }

    pub fn right_join(self, table: Table, on: Expr) -> Self {
        self.join_with(JoinKind::Right, table, Some(on))
    }

    pub fn full_join(self, table: Table, on: Expr) -> Self {
        self.join_with(JoinKind::Full, table, Some(on))
    }

    pub fn cross_join(self, table: Table) -> Self {
        self.join_with(JoinKind::Cross, table, None)
    }

    /// Set the WHERE condition, replacing any earlier one.
    #[doc(alias = "where")]
    pub fn filter(mut self, condition: Expr) -> Self {
        self.filter = Some(condition);
        self
    }

    /// Set the WHERE condition to all of `conditions` joined with `AND`.
    pub fn filter_all(mut self, conditions: impl IntoIterator<Item = Expr>) -> Self {
        let conditions: Vec<Expr> = conditions.into_iter().collect();
        self.filter = (!conditions.is_empty()).then(|| and_(conditions));
        self
    }

    /// Replace the GROUP BY list. An empty list is an error.
    pub fn group_by<I, T>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoExpr,
    {
        let columns: Vec<Expr> = columns.into_iter().map(IntoExpr::into_expr).collect();
        let error = columns
            .is_empty()
            .then(|| "group by clause cannot be empty".to_string());
        self.build_errors.set("group_by", error);
        self.group_by = columns;
        self
    }

    pub fn having(mut self, condition: Expr) -> Self {
        self.having = Some(condition);
        self
    }

    /// Replace the ORDER BY list. An empty list is an error.
    pub fn order_by<I, T>(mut self, orderings: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Ordering>,
    {
        let orderings: Vec<Ordering> = orderings.into_iter().map(Into::into).collect();
        let error = orderings
            .is_empty()
            .then(|| "order by clause cannot be empty".to_string());
        self.build_errors.set("order_by", error);
        self.order_by = orderings;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set OFFSET. Requires a prior [`Select::limit`].
    pub fn offset(mut self, offset: u64) -> Self {
        let error = self
            .limit
            .is_none()
            .then(|| "offset clause has no limit".to_string());
        self.build_errors.set("offset", error);
        self.offset = Some(offset);
        self
    }

    /// The leftmost table of the FROM clause.
    pub fn table(&self) -> &Table {
        self.from.root()
    }

    // ==================== terminal operations ====================

    /// The caller's own LIMIT and OFFSET.
    pub(super) fn window(&self) -> (Option<u64>, Option<u64>) {
        (self.limit, self.offset)
    }

    pub(super) async fn fetch_rows(
        self,
        ex: &impl Executor,
        limit: Option<usize>,
    ) -> OrmResult<Vec<Row>> {
        let rendered = self.build(ex.dialect())?;
        let mut rows = ex.fetch(&rendered.query, limit).await?;
        for row in &mut rows {
            row.remap_aliases(&rendered.aliases);
        }
        Ok(rows)
    }

    /// All matching rows.
    pub async fn all(self, ex: &impl Executor) -> OrmResult<Vec<Row>> {
        self.fetch_rows(ex, None).await
    }

    /// The first matching row, with `LIMIT 1` applied.
    pub async fn get(self, ex: &impl Executor) -> OrmResult<Option<Row>> {
        let rows = self.limit(1).fetch_rows(ex, Some(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Same as [`Select::get`].
    pub async fn first(self, ex: &impl Executor) -> OrmResult<Option<Row>> {
        self.get(ex).await
    }

    /// `n` rows starting at row `start`.
    pub async fn rows(self, n: u64, start: u64, ex: &impl Executor) -> OrmResult<Vec<Row>> {
        if n == 0 {
            return Err(OrmError::usage(format!("invalid select rows: {n}")));
        }
        self.limit(n).offset(start).all(ex).await
    }

    /// One page of `size` rows. Pages are 1-based; page 0 is read as page 1.
    pub async fn paginate(self, page: u64, size: u64, ex: &impl Executor) -> OrmResult<Vec<Row>> {
        if size == 0 {
            return Err(OrmError::usage("invalid page size: 0"));
        }
        let page = page.saturating_sub(1);
        self.limit(size).offset(page.saturating_mul(size)).all(ex).await
    }

    /// First column of the first row.
    pub async fn scalar(self, ex: &impl Executor) -> OrmResult<Option<Value>> {
        let row = self.get(ex).await?;
        Ok(row.and_then(|r| r.into_iter().next().map(|(_, v)| v)))
    }

    /// Typed [`Select::scalar`].
    pub async fn scalar_as<T: FromValue>(self, ex: &impl Executor) -> OrmResult<Option<T>> {
        match self.scalar(ex).await? {
            Some(value) => T::from_value("scalar", &value).map(Some),
            None => Ok(None),
        }
    }

    /// `COUNT(1)` of the matching rows. Orderings are dropped.
    pub async fn count(mut self, ex: &impl Executor) -> OrmResult<i64> {
        self.columns = vec![count_all()];
        self.order_by.clear();
        self.build_errors.set("order_by", None);
        let value = self.scalar(ex).await?;
        match value {
            None | Some(Value::Null) => Ok(0),
            Some(v) => i64::from_value("count", &v),
        }
    }

    /// Whether any row matches.
    pub async fn exist(self, ex: &impl Executor) -> OrmResult<bool> {
        Ok(self.limit(1).count(ex).await? > 0)
    }

    pub async fn all_as<T: FromRow>(self, ex: &impl Executor) -> OrmResult<Vec<T>> {
        let rows = self.all(ex).await?;
        rows.iter().map(T::from_row).collect()
    }

    pub async fn get_as<T: FromRow>(self, ex: &impl Executor) -> OrmResult<Option<T>> {
        let row = self.get(ex).await?;
        row.as_ref().map(T::from_row).transpose()
    }

    pub async fn first_as<T: FromRow>(self, ex: &impl Executor) -> OrmResult<Option<T>> {
        self.get_as(ex).await
    }
}

impl Node for Select {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        self.build_errors.check()?;

        let scope = if self.from.is_join() {
            Scope::qualified()
        } else {
            Scope::default()
        };
        ctx.scope(scope, |ctx| {
            ctx.literal("SELECT ");
            if self.distinct {
                ctx.literal("DISTINCT ");
            }
            if self.columns.is_empty() {
                ctx.literal("*");
            } else {
                ctx.sql(&CommaList(self.columns.iter().collect()))?;
            }
            ctx.literal(" FROM ");
            self.from.render(ctx)?;

            if let Some(filter) = &self.filter {
                ctx.literal(" WHERE ").sql(filter)?;
            }
            if !self.group_by.is_empty() {
                ctx.literal(" GROUP BY ")
                    .sql(&CommaList(self.group_by.iter().collect()))?;
            }
            if let Some(having) = &self.having {
                ctx.literal(" HAVING ").sql(having)?;
            }
            if !self.order_by.is_empty() {
                ctx.literal(" ORDER BY ")
                    .sql(&CommaList(self.order_by.iter().collect()))?;
            }
            if let Some(limit) = self.limit {
                ctx.literal(&format!(" LIMIT {limit}"));
            }
            if let Some(offset) = self.offset {
                ctx.literal(&format!(" OFFSET {offset}"));
            }
            Ok(())
        })
    }
}

impl Statement for Select {
    fn expects_rows(&self) -> bool {
        true
    }
}

impl Table {
    /// `SELECT * FROM` this table.
    pub fn select(&self) -> Select {
        Select::new(self.clone())
    }
}
