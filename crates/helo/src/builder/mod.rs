//! Statement builders.
//!
//! Builders are single-use and consuming: every call takes `self` and returns
//! the updated builder. Repeated calls replace what an earlier call set. The
//! first malformed call is recorded and reported when the statement is
//! rendered, before anything reaches the backend.

mod clause;
mod ddl;
mod delete;
mod insert;
mod select;
mod stream;
mod update;

pub use clause::{Assignment, AssignmentList, Join, JoinKind, Source, ValuesClause};
pub use ddl::{CreateTable, DropTable, Show, ShowKind};
pub use delete::Delete;
pub use insert::{Insert, Replace};
pub use select::Select;
pub use stream::STREAM_BATCH;
pub use update::Update;

use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::row::{FromRow, Row};
use crate::sql::{Dialect, ExecResult, Node, RenderContext, Rendered};
use std::future::Future;

/// A complete statement that can be rendered and run.
pub trait Statement: Node {
    /// Whether running the statement yields rows.
    fn expects_rows(&self) -> bool;

    /// Whether the statement is a batch write.
    fn is_many(&self) -> bool {
        false
    }

    /// Render into a finished query for `dialect`.
    fn build(&self, dialect: Dialect) -> OrmResult<Rendered> {
        let mut ctx = RenderContext::new(dialect);
        self.render(&mut ctx)?;
        let mut rendered = ctx.finish(self.expects_rows());
        if self.is_many() {
            rendered.query = rendered.query.batch(true);
        }
        Ok(rendered)
    }

    /// Debug helper returning the SQL text only.
    fn to_sql(&self, dialect: Dialect) -> OrmResult<String> {
        Ok(self.build(dialect)?.query.sql().to_string())
    }

    /// Run and return all rows, with aliased columns renamed back.
    fn query(&self, ex: &impl Executor) -> impl Future<Output = OrmResult<Vec<Row>>> + Send
    where
        Self: Sized,
    {
        async move {
            let rendered = self.build(ex.dialect())?;
            let mut rows = ex.fetch(&rendered.query, None).await?;
            for row in &mut rows {
                row.remap_aliases(&rendered.aliases);
            }
            Ok(rows)
        }
    }

    /// Run and map all rows to `T`.
    fn fetch_all<T: FromRow>(
        &self,
        ex: &impl Executor,
    ) -> impl Future<Output = OrmResult<Vec<T>>> + Send
    where
        Self: Sized,
    {
        async move {
            let rows = self.query(ex).await?;
            rows.iter().map(T::from_row).collect()
        }
    }

    /// Run for effect.
    fn execute(&self, ex: &impl Executor) -> impl Future<Output = OrmResult<ExecResult>> + Send
    where
        Self: Sized,
    {
        async move {
            let rendered = self.build(ex.dialect())?;
            ex.execute(&rendered.query).await
        }
    }
}

/// Usage errors recorded by builder calls, one per builder slot.
///
/// A later call to the same slot replaces or clears that slot's error. The
/// earliest error still standing is the one reported at render time.
#[derive(Debug, Clone, Default)]
pub(crate) struct BuildErrors(Vec<(&'static str, String)>);

impl BuildErrors {
    /// Set or clear the error of `slot`.
    pub(crate) fn set(&mut self, slot: &'static str, error: Option<String>) {
        self.0.retain(|(s, _)| *s != slot);
        if let Some(message) = error {
            self.0.push((slot, message));
        }
    }

    /// Record an error without clearing earlier ones for the same slot.
    pub(crate) fn push(&mut self, slot: &'static str, message: impl Into<String>) {
        self.0.push((slot, message.into()));
    }

    pub(crate) fn check(&self) -> OrmResult<()> {
        match self.0.first() {
            Some((_, message)) => Err(OrmError::usage(message.clone())),
            None => Ok(()),
        }
    }
}

/// The bare message of a usage error, so it is not wrapped twice when
/// reported again.
pub(crate) fn usage_message(error: OrmError) -> String {
    match error {
        OrmError::Usage(message) => message,
        other => other.to_string(),
    }
}
