//! In-memory backend for tests.
//!
//! Records every statement each physical connection runs and answers from a
//! script of queued responses. Clones of a [`MockBackend`] share the same
//! recording, so a test keeps one handle to inspect what a `Database` did.

use super::{Backend, PhysicalConnection, Pool};
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::sql::{Dialect, ExecResult};
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One statement as a connection received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    /// Id of the physical connection, starting at 1.
    pub conn: u64,
    pub sql: String,
    pub params: Vec<Value>,
    pub many: bool,
}

#[derive(Debug)]
enum Response {
    Rows(Vec<Row>),
    Exec(ExecResult),
    Error(String),
}

#[derive(Debug, Default)]
struct Shared {
    log: Mutex<Vec<Executed>>,
    script: Mutex<VecDeque<Response>>,
    failures: Mutex<Vec<String>>,
    latency: Mutex<Option<Duration>>,
    next_conn: AtomicU64,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scriptable backend that never touches a server.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    dialect: Dialect,
    shared: Arc<Shared>,
}

impl MockBackend {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            shared: Arc::default(),
        }
    }

    /// Queue the rows returned by the next fetch.
    pub fn push_rows(&self, rows: Vec<Row>) -> &Self {
        lock(&self.shared.script).push_back(Response::Rows(rows));
        self
    }

    /// Queue the result of the next execute.
    pub fn push_exec(&self, affected_rows: u64, last_insert_id: Option<i64>) -> &Self {
        lock(&self.shared.script)
            .push_back(Response::Exec(ExecResult::new(affected_rows, last_insert_id)));
        self
    }

    /// Make the next statement fail with a backend error.
    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        lock(&self.shared.script).push_back(Response::Error(message.into()));
        self
    }

    /// Fail every statement whose text contains `pattern`, including
    /// `BEGIN`/`COMMIT`/`ROLLBACK` and savepoint commands.
    pub fn fail_when(&self, pattern: impl Into<String>) -> &Self {
        lock(&self.shared.failures).push(pattern.into());
        self
    }

    /// Hold every execute and fetch for `latency` before answering.
    pub fn latency(&self, latency: Duration) -> &Self {
        *lock(&self.shared.latency) = Some(latency);
        self
    }

    /// Every statement run so far, in order.
    pub fn executed(&self) -> Vec<Executed> {
        lock(&self.shared.log).clone()
    }

    /// SQL text of every statement run so far.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.shared.log).iter().map(|e| e.sql.clone()).collect()
    }

    pub fn clear(&self) {
        lock(&self.shared.log).clear();
    }

    /// Physical connections taken from the pool.
    pub fn acquired(&self) -> usize {
        self.shared.acquired.load(Ordering::SeqCst)
    }

    /// Physical connections handed back to the pool.
    pub fn released(&self) -> usize {
        self.shared.released.load(Ordering::SeqCst)
    }

    /// Connections currently out of the pool.
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

impl Backend for MockBackend {
    type Pool = MockPool;

    async fn create_pool(&self, config: &DatabaseConfig) -> OrmResult<MockPool> {
        Ok(MockPool {
            dialect: config.dialect.unwrap_or(self.dialect),
            shared: Arc::clone(&self.shared),
            running: AtomicBool::new(true),
        })
    }
}

#[derive(Debug)]
pub struct MockPool {
    dialect: Dialect,
    shared: Arc<Shared>,
    running: AtomicBool,
}

impl MockPool {
    /// A running pool outside any [`Database`](crate::Database).
    pub fn new(backend: &MockBackend) -> Self {
        Self {
            dialect: backend.dialect,
            shared: Arc::clone(&backend.shared),
            running: AtomicBool::new(true),
        }
    }
}

impl Pool for MockPool {
    type Conn = MockConnection;

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn acquire(&self) -> OrmResult<MockConnection> {
        if !self.is_running() {
            return Err(OrmError::Backend("pool is closed".into()));
        }
        self.shared.acquired.fetch_add(1, Ordering::SeqCst);
        let id = self.shared.next_conn.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConnection {
            id,
            shared: Arc::clone(&self.shared),
        })
    }

    async fn release(&self, conn: MockConnection) -> OrmResult<()> {
        drop(conn);
        self.shared.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> OrmResult<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    shared: Arc<Shared>,
}

impl MockConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn record(&self, sql: &str, params: &[Value], many: bool) -> OrmResult<Option<Response>> {
        lock(&self.shared.log).push(Executed {
            conn: self.id,
            sql: sql.to_string(),
            params: params.to_vec(),
            many,
        });
        if let Some(pattern) = lock(&self.shared.failures).iter().find(|p| sql.contains(p.as_str())) {
            return Err(OrmError::Backend(format!("scripted failure on {pattern:?}")));
        }
        match lock(&self.shared.script).pop_front() {
            Some(Response::Error(message)) => Err(OrmError::Backend(message)),
            other => Ok(other),
        }
    }

    async fn wait(&self) {
        let latency = *lock(&self.shared.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn command(&self, sql: &str) -> OrmResult<()> {
        let failures = lock(&self.shared.failures);
        lock(&self.shared.log).push(Executed {
            conn: self.id,
            sql: sql.to_string(),
            params: Vec::new(),
            many: false,
        });
        match failures.iter().find(|p| sql.contains(p.as_str())) {
            Some(pattern) => Err(OrmError::Backend(format!("scripted failure on {pattern:?}"))),
            None => Ok(()),
        }
    }
}

impl PhysicalConnection for MockConnection {
    async fn execute(&mut self, sql: &str, params: &[Value], many: bool) -> OrmResult<ExecResult> {
        self.wait().await;
        match self.record(sql, params, many)? {
            Some(Response::Exec(result)) => Ok(result),
            _ => Ok(ExecResult::default()),
        }
    }

    async fn fetch(
        &mut self,
        sql: &str,
        params: &[Value],
        limit: Option<usize>,
    ) -> OrmResult<Vec<Row>> {
        self.wait().await;
        match self.record(sql, params, false)? {
            Some(Response::Rows(mut rows)) => {
                if let Some(limit) = limit {
                    rows.truncate(limit);
                }
                Ok(rows)
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn begin(&mut self) -> OrmResult<()> {
        self.command("BEGIN")
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.command("COMMIT")
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.command("ROLLBACK")
    }

    async fn batch(&mut self, sql: &str) -> OrmResult<()> {
        self.command(sql)
    }
}
