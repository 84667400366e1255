use super::*;
use crate::backend::{MockBackend, MockPool};

fn session(backend: &MockBackend) -> Session<MockPool> {
    Session::new(Arc::new(MockPool::new(backend)))
}

#[tokio::test]
async fn test_nested_acquire_shares_one_connection() {
    let backend = MockBackend::new(Dialect::MySql);
    let s = session(&backend);

    s.acquire().await.unwrap();
    s.acquire().await.unwrap();
    assert_eq!(backend.acquired(), 1);
    assert_eq!(s.lease_count().await, 2);

    s.release().await.unwrap();
    assert_eq!(s.state().await, SessionState::Leased);
    assert_eq!(backend.released(), 0);

    s.release().await.unwrap();
    assert_eq!(s.state().await, SessionState::Idle);
    assert_eq!(backend.released(), 1);
}

#[tokio::test]
async fn test_same_handle_while_leased() {
    let backend = MockBackend::new(Dialect::MySql);
    let s = session(&backend);

    s.acquire().await.unwrap();
    s.acquire().await.unwrap();
    s.execute_leased(&Query::new("UPDATE t SET a = 1")).await.unwrap();
    s.release().await.unwrap();
    s.execute_leased(&Query::new("UPDATE t SET a = 2")).await.unwrap();
    s.release().await.unwrap();

    let conns: Vec<u64> = backend.executed().iter().map(|e| e.conn).collect();
    assert_eq!(conns, vec![1, 1]);
}

#[tokio::test]
async fn test_release_without_lease_is_state_error() {
    let backend = MockBackend::new(Dialect::MySql);
    let s = session(&backend);

    let err = s.release().await.unwrap_err();
    assert!(matches!(err, OrmError::State(StateError::NotAcquired)));

    let err = s
        .execute_leased(&Query::new("DELETE FROM t WHERE id = 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::State(StateError::NotAcquired)));
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn test_acquire_after_close_is_state_error() {
    let backend = MockBackend::new(Dialect::MySql);
    let pool = Arc::new(MockPool::new(&backend));
    let s = Session::new(Arc::clone(&pool));

    pool.close().await.unwrap();
    let err = s.acquire().await.unwrap_err();
    assert!(matches!(err, OrmError::State(StateError::PoolNotRunning)));
    assert_eq!(s.lease_count().await, 0);
}

#[tokio::test]
async fn test_commit_without_transaction() {
    let backend = MockBackend::new(Dialect::MySql);
    let s = session(&backend);
    assert!(matches!(
        s.commit().await.unwrap_err(),
        OrmError::State(StateError::NoTransaction)
    ));
    assert!(matches!(
        s.rollback().await.unwrap_err(),
        OrmError::State(StateError::NoTransaction)
    ));
}

#[tokio::test]
async fn test_begin_commit_round_trip() {
    let backend = MockBackend::new(Dialect::MySql);
    let s = session(&backend);

    s.begin().await.unwrap();
    assert_eq!(s.state().await, SessionState::InTransaction);
    s.commit().await.unwrap();
    assert_eq!(s.state().await, SessionState::Idle);
    assert_eq!(backend.statements(), vec!["BEGIN", "COMMIT"]);
    assert_eq!(backend.outstanding(), 0);
}

#[tokio::test]
async fn test_nested_begin_uses_savepoints() {
    let backend = MockBackend::new(Dialect::Postgres);
    let s = session(&backend);

    s.begin().await.unwrap();
    s.begin().await.unwrap();
    assert_eq!(s.transaction_depth().await, 2);
    s.rollback().await.unwrap();
    s.begin().await.unwrap();
    s.commit().await.unwrap();
    s.commit().await.unwrap();

    assert_eq!(
        backend.statements(),
        vec![
            "BEGIN",
            "SAVEPOINT helo_sp_1",
            "ROLLBACK TO SAVEPOINT helo_sp_1",
            "SAVEPOINT helo_sp_1",
            "RELEASE SAVEPOINT helo_sp_1",
            "COMMIT",
        ]
    );
    assert_eq!(s.state().await, SessionState::Idle);
    assert_eq!(backend.acquired(), 1);
}

#[tokio::test]
async fn test_failed_begin_releases_its_lease() {
    let backend = MockBackend::new(Dialect::MySql);
    backend.fail_when("BEGIN");
    let s = session(&backend);

    assert!(s.begin().await.is_err());
    assert_eq!(s.state().await, SessionState::Idle);
    assert_eq!(s.transaction_depth().await, 0);
    assert_eq!(backend.outstanding(), 0);
}

#[tokio::test]
async fn test_failed_commit_still_closes_level() {
    let backend = MockBackend::new(Dialect::MySql);
    backend.fail_when("COMMIT");
    let s = session(&backend);

    s.begin().await.unwrap();
    assert!(s.commit().await.is_err());
    assert_eq!(s.state().await, SessionState::Idle);
    assert_eq!(backend.outstanding(), 0);
}

#[tokio::test]
async fn test_executor_scopes_each_statement() {
    let backend = MockBackend::new(Dialect::MySql);
    let s = session(&backend);

    s.execute(&Query::new("UPDATE t SET a = 1")).await.unwrap();
    s.execute(&Query::new("UPDATE t SET a = 2")).await.unwrap();
    assert_eq!(backend.acquired(), 2);
    assert_eq!(s.state().await, SessionState::Idle);

    s.acquire().await.unwrap();
    s.execute(&Query::new("UPDATE t SET a = 3")).await.unwrap();
    assert_eq!(s.state().await, SessionState::Leased);
    s.release().await.unwrap();
    assert_eq!(backend.acquired(), 3);
}

#[tokio::test]
async fn test_clones_share_the_lease() {
    let backend = MockBackend::new(Dialect::MySql);
    let s = session(&backend);
    let other = s.clone();

    s.acquire().await.unwrap();
    assert_eq!(other.state().await, SessionState::Leased);
    other.release().await.unwrap();
    assert_eq!(s.state().await, SessionState::Idle);
}

#[tokio::test]
async fn test_scoped_releases_on_error() {
    let backend = MockBackend::new(Dialect::MySql);
    let s = session(&backend);

    let result: OrmResult<()> = s
        .scoped(|inner| async move {
            assert_eq!(inner.state().await, SessionState::Leased);
            Err(OrmError::Other("boom".into()))
        })
        .await;
    assert!(result.is_err());
    assert_eq!(s.state().await, SessionState::Idle);
}

/// Gives the background settle task a chance to run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_cancelled_fetch_releases_its_lease() {
    let backend = MockBackend::new(Dialect::MySql);
    backend.latency(Duration::from_millis(200));
    let s = session(&backend);

    let query = Query::new("SELECT 1");
    let cancelled = tokio::time::timeout(Duration::from_millis(20), s.fetch(&query, None)).await;
    assert!(cancelled.is_err());

    settle().await;
    assert_eq!(s.lease_count().await, 0);
    assert_eq!(s.state().await, SessionState::Idle);
    assert_eq!(backend.outstanding(), 0);
}

#[tokio::test]
async fn test_cancelled_scope_keeps_outer_lease() {
    let backend = MockBackend::new(Dialect::MySql);
    backend.latency(Duration::from_millis(200));
    let s = session(&backend);

    s.acquire().await.unwrap();
    let work = s.scoped(|inner| async move {
        inner.execute(&Query::new("UPDATE t SET a = 1")).await?;
        Ok(())
    });
    assert!(tokio::time::timeout(Duration::from_millis(20), work).await.is_err());

    settle().await;
    assert_eq!(s.lease_count().await, 1);
    assert_eq!(backend.outstanding(), 1);

    s.release().await.unwrap();
    assert_eq!(backend.outstanding(), 0);
}

#[tokio::test]
async fn test_cancelled_transaction_rolls_back() {
    let backend = MockBackend::new(Dialect::MySql);
    backend.latency(Duration::from_millis(200));
    let s = session(&backend);

    let work = s.transaction(|inner| async move {
        inner.execute(&Query::new("UPDATE t SET a = 1")).await?;
        Ok(())
    });
    assert!(tokio::time::timeout(Duration::from_millis(20), work).await.is_err());

    settle().await;
    assert_eq!(backend.statements(), vec!["BEGIN", "ROLLBACK"]);
    assert_eq!(s.transaction_depth().await, 0);
    assert_eq!(s.state().await, SessionState::Idle);
    assert_eq!(backend.outstanding(), 0);
}
