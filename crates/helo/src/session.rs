//! Reentrant, transactional leasing of one physical connection.
//!
//! A [`Session`] is one logical connection scope. Nested acquires share a
//! single physical connection: only the outermost acquire takes it from the
//! pool and only the matching outermost release hands it back. Transactions
//! ride on the same lease, and a `begin` inside an open transaction opens a
//! savepoint instead.
//!
//! Three locks keep the bookkeeping consistent under concurrent use of clones:
//! the lease lock guards the acquire counter, the transaction lock serializes
//! begin/commit/rollback, and the execute lock owns the physical handle so
//! only one round trip is in flight at a time. Lock order is always
//! transaction, lease, execute.

use crate::backend::{PhysicalConnection, Pool};
use crate::error::{OrmError, OrmResult, StateError};
use crate::executor::Executor;
use crate::row::Row;
use crate::sql::{Dialect, ExecResult, Query};
use crate::transaction::Transaction;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Where a session is in its lease/transaction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No physical connection is held.
    Idle,
    /// A physical connection is held, no transaction is open.
    Leased,
    /// A physical connection is held with a transaction open.
    InTransaction,
}

struct Inner<P: Pool> {
    id: u64,
    pool: Arc<P>,
    echo: bool,
    query_timeout: Option<Duration>,
    /// Transaction lock; the value is the nesting depth.
    tx_depth: Mutex<usize>,
    /// Lease lock; the value is the acquire counter.
    leases: Mutex<usize>,
    /// Execute lock; holds the physical connection while leased.
    conn: Mutex<Option<P::Conn>>,
}

/// A logical connection scope over a pool.
///
/// Cheap to clone; clones are the same scope and share one lease.
///
/// ```ignore
/// let session = db.session()?;
/// session.transaction(|s| async move {
///     users.update().set("name", "bob").filter(col("id").eq(1)).execute(&s).await?;
///     Ok(())
/// })
/// .await?;
/// ```
pub struct Session<P: Pool> {
    inner: Arc<Inner<P>>,
}

impl<P: Pool> Clone for Session<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Pool> std::fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("dialect", &self.inner.pool.dialect())
            .finish_non_exhaustive()
    }
}

fn savepoint_name(level: usize) -> String {
    format!("helo_sp_{level}")
}

const OWES_NOTHING: u8 = 0;
const OWES_RELEASE: u8 = 1;
const OWES_ROLLBACK: u8 = 2;

/// What a session is still owed by an operation that is part way through.
///
/// Each step updates it right after the counter it touches changes, with no
/// await in between.
#[derive(Debug, Default)]
struct Owed(AtomicU8);

impl Owed {
    fn set(&self, owed: u8) {
        self.0.store(owed, Ordering::SeqCst);
    }

    fn get(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Settles whatever an operation still owes when its future is dropped.
///
/// The settling release or rollback is spawned on the current runtime since
/// `Drop` cannot await.
struct Unwind<P: Pool> {
    session: Session<P>,
    owed: Owed,
}

impl<P: Pool> Unwind<P> {
    fn new(session: &Session<P>) -> Self {
        Self {
            session: session.clone(),
            owed: Owed::default(),
        }
    }
}

impl<P: Pool> Drop for Unwind<P> {
    fn drop(&mut self) {
        let owed = self.owed.get();
        if owed == OWES_NOTHING {
            return;
        }
        let session = self.session.clone();
        let id = session.inner.id;
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                target: "helo.session",
                session = id,
                "operation abandoned outside a runtime; the lease stays pinned"
            );
            return;
        };
        tracing::debug!(target: "helo.session", session = id, owed, "settling abandoned operation");
        handle.spawn(async move {
            let settled = if owed == OWES_ROLLBACK {
                session.rollback().await
            } else {
                session.release().await
            };
            if let Err(e) = settled {
                tracing::warn!(
                    target: "helo.session",
                    session = id,
                    error = %e,
                    "settling abandoned operation failed"
                );
            }
        });
    }
}

impl<P: Pool> Session<P> {
    pub fn new(pool: Arc<P>) -> Self {
        Self::with_echo(pool, false)
    }

    /// A session that logs every statement on the `helo.sql` target.
    pub fn with_echo(pool: Arc<P>, echo: bool) -> Self {
        Self::with_options(pool, echo, None)
    }

    /// `query_timeout` bounds every statement run on the leased connection.
    pub fn with_options(pool: Arc<P>, echo: bool, query_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                pool,
                echo,
                query_timeout,
                tx_depth: Mutex::new(0),
                leases: Mutex::new(0),
                conn: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.pool.dialect()
    }

    pub async fn state(&self) -> SessionState {
        let depth = *self.inner.tx_depth.lock().await;
        let leases = *self.inner.leases.lock().await;
        match (leases, depth) {
            (0, _) => SessionState::Idle,
            (_, 0) => SessionState::Leased,
            _ => SessionState::InTransaction,
        }
    }

    /// Current acquire nesting.
    pub async fn lease_count(&self) -> usize {
        *self.inner.leases.lock().await
    }

    /// Current transaction nesting; 0 outside a transaction.
    pub async fn transaction_depth(&self) -> usize {
        *self.inner.tx_depth.lock().await
    }

    /// Take a lease. Only the outermost acquire takes a physical connection.
    ///
    /// The counter is bumped only once the connection is attached, so a
    /// cancelled acquire leaves the session unchanged.
    pub async fn acquire(&self) -> OrmResult<()> {
        let mut leases = self.inner.leases.lock().await;
        if *leases == 0 {
            if !self.inner.pool.is_running() {
                return Err(StateError::PoolNotRunning.into());
            }
            let conn = self.inner.pool.acquire().await?;
            let mut slot = self.inner.conn.lock().await;
            if slot.is_some() {
                drop(slot);
                self.inner.pool.release(conn).await?;
                return Err(StateError::AlreadyAcquired.into());
            }
            *slot = Some(conn);
            tracing::trace!(target: "helo.session", session = self.inner.id, "connection acquired");
        }
        *leases += 1;
        Ok(())
    }

    /// Drop a lease. The outermost release returns the connection to the pool.
    pub async fn release(&self) -> OrmResult<()> {
        self.release_owed(&Owed::default()).await
    }

    async fn release_owed(&self, owed: &Owed) -> OrmResult<()> {
        let mut leases = self.inner.leases.lock().await;
        match *leases {
            0 => {
                owed.set(OWES_NOTHING);
                Err(StateError::NotAcquired.into())
            }
            1 => {
                let conn = self.inner.conn.lock().await.take();
                *leases = 0;
                owed.set(OWES_NOTHING);
                let conn = conn.ok_or(StateError::NotAcquired)?;
                self.inner.pool.release(conn).await?;
                tracing::trace!(target: "helo.session", session = self.inner.id, "connection released");
                Ok(())
            }
            _ => {
                *leases -= 1;
                owed.set(OWES_NOTHING);
                Ok(())
            }
        }
    }

    async fn acquire_owed(&self, owed: &Owed) -> OrmResult<()> {
        self.acquire().await?;
        owed.set(OWES_RELEASE);
        Ok(())
    }

    /// Run `work` inside one lease, releasing it whatever the outcome.
    ///
    /// Dropping the returned future part way still releases the lease.
    pub async fn scoped<T, F, Fut>(&self, work: F) -> OrmResult<T>
    where
        F: FnOnce(Session<P>) -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        let unwind = Unwind::new(self);
        self.acquire_owed(&unwind.owed).await?;
        let result = work(self.clone()).await;
        let released = self.release_owed(&unwind.owed).await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    fn echo(&self, query: &Query) {
        if self.inner.echo {
            tracing::info!(
                target: "helo.sql",
                session = self.inner.id,
                sql = query.sql(),
                params = ?query.params(),
                "statement"
            );
        }
    }

    async fn timed<T>(&self, work: impl Future<Output = OrmResult<T>>) -> OrmResult<T> {
        let Some(limit) = self.inner.query_timeout else {
            return work.await;
        };
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    target: "helo.session",
                    session = self.inner.id,
                    timeout = ?limit,
                    "statement timed out"
                );
                Err(OrmError::Timeout(limit))
            }
        }
    }

    /// Run a row-returning query on the leased connection.
    ///
    /// Fails with [`StateError::NotAcquired`] without a lease.
    pub async fn fetch_leased(&self, query: &Query, limit: Option<usize>) -> OrmResult<Vec<Row>> {
        let mut slot = self.inner.conn.lock().await;
        let conn = slot.as_mut().ok_or(StateError::NotAcquired)?;
        self.echo(query);
        self.timed(conn.fetch(query.sql(), query.params(), limit))
            .await
    }

    /// Run a statement on the leased connection.
    ///
    /// Fails with [`StateError::NotAcquired`] without a lease.
    pub async fn execute_leased(&self, query: &Query) -> OrmResult<ExecResult> {
        let mut slot = self.inner.conn.lock().await;
        let conn = slot.as_mut().ok_or(StateError::NotAcquired)?;
        self.echo(query);
        self.timed(conn.execute(query.sql(), query.params(), query.is_many()))
            .await
    }

    /// Open a transaction, or a savepoint when one is already open.
    ///
    /// Performs a (possibly nested) acquire that the matching commit or
    /// rollback releases.
    pub async fn begin(&self) -> OrmResult<()> {
        let unwind = Unwind::new(self);
        self.begin_owed(&unwind.owed).await?;
        unwind.owed.set(OWES_NOTHING);
        Ok(())
    }

    async fn begin_owed(&self, owed: &Owed) -> OrmResult<()> {
        let mut depth = self.inner.tx_depth.lock().await;
        self.acquire_owed(owed).await?;

        let opened = {
            let mut slot = self.inner.conn.lock().await;
            match slot.as_mut() {
                None => Err(StateError::NotAcquired.into()),
                Some(conn) if *depth == 0 => conn.begin().await,
                Some(conn) => conn.batch(&format!("SAVEPOINT {}", savepoint_name(*depth))).await,
            }
        };

        match opened {
            Ok(()) => {
                *depth += 1;
                owed.set(OWES_ROLLBACK);
                tracing::debug!(target: "helo.session", session = self.inner.id, depth = *depth, "transaction begun");
                Ok(())
            }
            Err(e) => match self.release_owed(owed).await {
                Ok(()) => Err(e),
                Err(release_err) => Err(OrmError::Other(format!(
                    "{e} (release failed: {release_err})"
                ))),
            },
        }
    }

    /// Commit the innermost level. The level is closed and its lease released
    /// whether or not the server accepts the commit.
    pub async fn commit(&self) -> OrmResult<()> {
        let unwind = Unwind::new(self);
        self.finish(true, &unwind.owed).await
    }

    /// Roll back the innermost level. The level is closed and its lease
    /// released whether or not the server accepts the rollback.
    pub async fn rollback(&self) -> OrmResult<()> {
        let unwind = Unwind::new(self);
        self.finish(false, &unwind.owed).await
    }

    async fn finish(&self, commit: bool, owed: &Owed) -> OrmResult<()> {
        let mut depth = self.inner.tx_depth.lock().await;
        if *depth == 0 {
            owed.set(OWES_NOTHING);
            return Err(StateError::NoTransaction.into());
        }

        let result = {
            let mut slot = self.inner.conn.lock().await;
            match slot.as_mut() {
                None => Err(StateError::NotAcquired.into()),
                Some(conn) if *depth == 1 => {
                    if commit {
                        conn.commit().await
                    } else {
                        conn.rollback().await
                    }
                }
                Some(conn) => {
                    let name = savepoint_name(*depth - 1);
                    let sql = if commit {
                        format!("RELEASE SAVEPOINT {name}")
                    } else {
                        format!("ROLLBACK TO SAVEPOINT {name}")
                    };
                    conn.batch(&sql).await
                }
            }
        };

        *depth -= 1;
        owed.set(OWES_RELEASE);
        tracing::debug!(
            target: "helo.session",
            session = self.inner.id,
            depth = *depth,
            commit,
            ok = result.is_ok(),
            "transaction finished"
        );
        let released = self.release_owed(owed).await;
        result?;
        released
    }

    /// Run `work` inside a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// The original error is returned after the rollback; a failing rollback
    /// is reported together with it. Dropping the returned future part way
    /// rolls the level back in the background.
    pub async fn transaction<T, F, Fut>(&self, work: F) -> OrmResult<T>
    where
        F: FnOnce(Session<P>) -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        let unwind = Unwind::new(self);
        self.begin_owed(&unwind.owed).await?;
        match work(self.clone()).await {
            Ok(value) => {
                self.finish(true, &unwind.owed).await?;
                Ok(value)
            }
            Err(error) => match self.finish(false, &unwind.owed).await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err(OrmError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }

    /// Begin and return a guard to commit or roll back explicitly.
    pub async fn begin_transaction(&self) -> OrmResult<Transaction<P>> {
        self.begin().await?;
        Ok(Transaction::new(self.clone()))
    }
}

/// Each statement runs inside its own (nested) lease.
impl<P: Pool> Executor for Session<P> {
    fn dialect(&self) -> Dialect {
        self.inner.pool.dialect()
    }

    async fn fetch(&self, query: &Query, limit: Option<usize>) -> OrmResult<Vec<Row>> {
        let unwind = Unwind::new(self);
        self.acquire_owed(&unwind.owed).await?;
        let result = self.fetch_leased(query, limit).await;
        let released = self.release_owed(&unwind.owed).await;
        let rows = result?;
        released?;
        Ok(rows)
    }

    async fn execute(&self, query: &Query) -> OrmResult<ExecResult> {
        let unwind = Unwind::new(self);
        self.acquire_owed(&unwind.owed).await?;
        let result = self.execute_leased(query).await;
        let released = self.release_owed(&unwind.owed).await;
        let outcome = result?;
        released?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests;
