//! Transaction guard and the [`transaction!`] macro.
//!
//! Prefer [`Session::transaction`] for closures, or the macro for a block of
//! statements:
//!
//! ```ignore
//! use helo::{OrmError, Statement, col};
//!
//! helo::transaction!(session, tx, {
//!     accounts.update().set("balance", col("balance") - 100).filter(col("id").eq(1)).execute(&tx).await?;
//!     accounts.update().set("balance", col("balance") + 100).filter(col("id").eq(2)).execute(&tx).await?;
//!     Ok::<(), OrmError>(())
//! })?;
//! ```

use crate::backend::Pool;
use crate::error::OrmResult;
use crate::executor::Executor;
use crate::row::Row;
use crate::session::Session;
use crate::sql::{Dialect, ExecResult, Query};

/// Runs the given block inside a transaction on a [`Session`].
///
/// - Begins via `$session.begin_transaction().await`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)` and returns the original error; a failing
///   rollback is reported together with it.
///
/// The block must evaluate to `helo::OrmResult<T>`. Nested uses open
/// savepoints.
#[macro_export]
macro_rules! transaction {
    ($session:expr, $tx:ident, $body:block) => {{
        let $tx = ($session).begin_transaction().await?;

        let __helo_tx_body_result = async { $body }.await;
        match __helo_tx_body_result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::OrmError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

/// An open transaction level on a [`Session`].
///
/// Finish it with [`Transaction::commit`] or [`Transaction::rollback`]. A guard
/// dropped while still open logs a warning; the level and its lease stay open
/// on the session.
#[must_use = "a transaction must be committed or rolled back"]
pub struct Transaction<P: Pool> {
    session: Session<P>,
    open: bool,
}

impl<P: Pool> Transaction<P> {
    pub(crate) fn new(session: Session<P>) -> Self {
        Self {
            session,
            open: true,
        }
    }

    /// The session the transaction runs on.
    pub fn session(&self) -> &Session<P> {
        &self.session
    }

    pub async fn commit(mut self) -> OrmResult<()> {
        self.open = false;
        self.session.commit().await
    }

    pub async fn rollback(mut self) -> OrmResult<()> {
        self.open = false;
        self.session.rollback().await
    }
}

impl<P: Pool> std::fmt::Debug for Transaction<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("session", &self.session.id())
            .field("open", &self.open)
            .finish()
    }
}

impl<P: Pool> Drop for Transaction<P> {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!(
                target: "helo.session",
                session = self.session.id(),
                "transaction dropped without commit or rollback"
            );
        }
    }
}

/// Statements run on the transaction's lease.
impl<P: Pool> Executor for Transaction<P> {
    fn dialect(&self) -> Dialect {
        self.session.dialect()
    }

    async fn fetch(&self, query: &Query, limit: Option<usize>) -> OrmResult<Vec<Row>> {
        self.session.fetch_leased(query, limit).await
    }

    async fn execute(&self, query: &Query) -> OrmResult<ExecResult> {
        self.session.execute_leased(query).await
    }
}
