//! The process-wide database handle.

use crate::backend::{Backend, Pool};
use crate::builder::Statement;
use crate::config::{DatabaseConfig, redact};
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::row::Row;
use crate::schema::Table;
use crate::session::Session;
use crate::sql::{Dialect, ExecResult, Query, RawSql, RenderContext};
use crate::value::Value;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Result of [`Database::execute`]: rows for a row-returning query, the
/// execution outcome otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Rows(Vec<Row>),
    Exec(ExecResult),
}

impl Outcome {
    pub fn rows(self) -> Option<Vec<Row>> {
        match self {
            Outcome::Rows(rows) => Some(rows),
            Outcome::Exec(_) => None,
        }
    }

    pub fn exec(self) -> Option<ExecResult> {
        match self {
            Outcome::Exec(result) => Some(result),
            Outcome::Rows(_) => None,
        }
    }
}

/// A backend plus its pool once connected.
///
/// ```ignore
/// let db = Database::new(PostgresBackend, DatabaseConfig::from_env()?);
/// db.connect().await?;
/// let session = db.session()?;
/// let rows = users.select().filter(col("age").gt(18)).all(&session).await?;
/// db.close().await?;
/// ```
pub struct Database<B: Backend> {
    backend: B,
    config: DatabaseConfig,
    pool: RwLock<Option<Arc<B::Pool>>>,
}

impl<B: Backend> std::fmt::Debug for Database<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &redact(&self.config.url))
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<B: Backend> Database<B> {
    pub fn new(backend: B, config: DatabaseConfig) -> Self {
        Self {
            backend,
            config,
            pool: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    fn current_pool(&self) -> Option<Arc<B::Pool>> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn pool(&self) -> OrmResult<Arc<B::Pool>> {
        self.current_pool().ok_or(OrmError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.current_pool().is_some()
    }

    /// Open the pool. Fails with [`OrmError::AlreadyConnected`] when called twice.
    pub async fn connect(&self) -> OrmResult<()> {
        if self.is_connected() {
            return Err(OrmError::AlreadyConnected);
        }
        let pool = Arc::new(self.backend.create_pool(&self.config).await?);
        let dialect = pool.dialect();
        {
            let mut slot = self.pool.write().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return Err(OrmError::AlreadyConnected);
            }
            *slot = Some(pool);
        }
        tracing::info!(
            target: "helo",
            url = %redact(&self.config.url),
            %dialect,
            max_size = self.config.max_size,
            "database connected"
        );
        Ok(())
    }

    /// Close the pool. Sessions still holding it fail their next acquire with
    /// a state error.
    pub async fn close(&self) -> OrmResult<()> {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(OrmError::NotConnected)?;
        pool.close().await?;
        tracing::info!(target: "helo", url = %redact(&self.config.url), "database closed");
        Ok(())
    }

    /// Dialect of the connected pool, or the configured one before connecting.
    pub fn dialect(&self) -> OrmResult<Dialect> {
        match self.current_pool() {
            Some(pool) => Ok(pool.dialect()),
            None => self.config.resolved_dialect(),
        }
    }

    /// A fresh logical connection scope.
    pub fn session(&self) -> OrmResult<Session<B::Pool>> {
        Ok(Session::with_options(
            self.pool()?,
            self.config.echo,
            self.config.query_timeout,
        ))
    }

    /// Run a finished query in a one-off scope, fetching rows when it
    /// returns any.
    pub async fn execute(&self, query: &Query) -> OrmResult<Outcome> {
        let session = self.session()?;
        if query.expects_rows() {
            session.fetch(query, None).await.map(Outcome::Rows)
        } else {
            session.execute(query).await.map(Outcome::Exec)
        }
    }

    /// Run caller-written SQL. `?` marks placeholders on every dialect.
    pub async fn raw(&self, sql: &str, params: Vec<Value>) -> OrmResult<Outcome> {
        let mut ctx = RenderContext::new(self.dialect()?);
        ctx.sql(&RawSql::new(sql, params))?;
        let (sql, params) = ctx.finish(false).query.into_parts();
        self.execute(&Query::with_params(sql, params)).await
    }

    /// Run `work` inside a transaction on a fresh session.
    pub async fn transaction<T, F, Fut>(&self, work: F) -> OrmResult<T>
    where
        F: FnOnce(Session<B::Pool>) -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        self.session()?.transaction(work).await
    }

    /// `CREATE TABLE` every table, with its extra index statements, in one
    /// transaction.
    pub async fn create_tables(&self, tables: &[Table]) -> OrmResult<()> {
        self.transaction(|session| async move {
            for table in tables {
                table.create_table(&session).await?;
            }
            Ok(())
        })
        .await
    }

    /// `DROP TABLE IF EXISTS` every table, in reverse order.
    pub async fn drop_tables(&self, tables: &[Table]) -> OrmResult<()> {
        self.transaction(|session| async move {
            for table in tables.iter().rev() {
                table.drop().if_exists(true).execute(&session).await?;
            }
            Ok(())
        })
        .await
    }
}

/// Each statement runs in its own one-off session.
impl<B: Backend> Executor for Database<B> {
    fn dialect(&self) -> Dialect {
        Database::dialect(self).unwrap_or_default()
    }

    async fn fetch(&self, query: &Query, limit: Option<usize>) -> OrmResult<Vec<Row>> {
        self.session()?.fetch(query, limit).await
    }

    async fn execute(&self, query: &Query) -> OrmResult<ExecResult> {
        Executor::execute(&self.session()?, query).await
    }
}
