//! Backend seam: the pool and physical connections sessions run on.
//!
//! A backend knows how to open a pool from a [`DatabaseConfig`]. The pool
//! hands out physical connections, which execute finished SQL text with its
//! parameters. Everything above this module (leasing, transactions, echo)
//! is backend-independent.

pub mod mock;
#[cfg(feature = "pool")]
pub mod postgres;

pub use mock::{Executed, MockBackend, MockConnection, MockPool};
#[cfg(feature = "pool")]
pub use postgres::{PgConnection, PgPool, PostgresBackend};

use crate::config::DatabaseConfig;
use crate::error::OrmResult;
use crate::row::Row;
use crate::sql::{Dialect, ExecResult};
use crate::value::Value;
use std::future::Future;

/// A database driver able to open a connection pool.
pub trait Backend: Send + Sync + 'static {
    type Pool: Pool;

    fn create_pool(
        &self,
        config: &DatabaseConfig,
    ) -> impl Future<Output = OrmResult<Self::Pool>> + Send;
}

/// A process-wide pool of physical connections. Synchronizes itself.
pub trait Pool: Send + Sync + 'static {
    type Conn: PhysicalConnection;

    /// Dialect of the server behind the pool.
    fn dialect(&self) -> Dialect;

    /// `false` once [`Pool::close`] has been called.
    fn is_running(&self) -> bool;

    fn acquire(&self) -> impl Future<Output = OrmResult<Self::Conn>> + Send;

    /// Hand a connection back to the pool.
    fn release(&self, conn: Self::Conn) -> impl Future<Output = OrmResult<()>> + Send;

    fn close(&self) -> impl Future<Output = OrmResult<()>> + Send;
}

/// One physical connection, owned by a session while it is leased.
pub trait PhysicalConnection: Send + Sync + 'static {
    /// Run a statement for its effect. `many` marks a batch write.
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        many: bool,
    ) -> impl Future<Output = OrmResult<ExecResult>> + Send;

    /// Run a row-returning statement, reading back at most `limit` rows.
    fn fetch(
        &mut self,
        sql: &str,
        params: &[Value],
        limit: Option<usize>,
    ) -> impl Future<Output = OrmResult<Vec<Row>>> + Send;

    fn begin(&mut self) -> impl Future<Output = OrmResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = OrmResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = OrmResult<()>> + Send;

    /// Run parameter-free command text, used for savepoints.
    fn batch(&mut self, sql: &str) -> impl Future<Output = OrmResult<()>> + Send;
}
