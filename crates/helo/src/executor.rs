//! The execution seam shared by sessions, transactions and the database handle.

use crate::error::OrmResult;
use crate::row::Row;
use crate::sql::{Dialect, ExecResult, Query};
use std::future::Future;

/// Anything that can run a finished [`Query`].
///
/// Builders only ever see this trait, so the same statement runs unchanged on
/// a [`Session`](crate::Session), inside a [`Transaction`](crate::Transaction)
/// or as a one-off through the [`Database`](crate::Database).
pub trait Executor: Send + Sync {
    /// Dialect used to render statements for this executor.
    fn dialect(&self) -> Dialect;

    /// Run a row-returning query. `limit` caps how many rows are read back.
    fn fetch(
        &self,
        query: &Query,
        limit: Option<usize>,
    ) -> impl Future<Output = OrmResult<Vec<Row>>> + Send;

    /// Run a statement for its effect.
    fn execute(&self, query: &Query) -> impl Future<Output = OrmResult<ExecResult>> + Send;
}
