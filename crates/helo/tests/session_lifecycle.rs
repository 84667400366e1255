//! Lease and transaction lifecycle through a `Database` on the mock backend.

use futures_util::future::join_all;
use helo::{
    Database, DatabaseConfig, Dialect, MockBackend, OrmError, OrmResult, SessionState, StateError,
    Statement, Table, col,
};
use std::time::Duration;

async fn connected(dialect: Dialect) -> (Database<MockBackend>, MockBackend) {
    let backend = MockBackend::new(dialect);
    let db = Database::new(
        backend.clone(),
        DatabaseConfig::new("mock://localhost/app").dialect(dialect),
    );
    db.connect().await.unwrap();
    (db, backend)
}

fn users() -> Table {
    Table::new("users")
}

#[tokio::test]
async fn test_connect_twice_and_close_twice() {
    let (db, _) = connected(Dialect::MySql).await;
    assert!(db.is_connected());
    assert!(matches!(db.connect().await, Err(OrmError::AlreadyConnected)));

    db.close().await.unwrap();
    assert!(!db.is_connected());
    assert!(matches!(db.close().await, Err(OrmError::NotConnected)));
    assert!(matches!(db.session(), Err(OrmError::NotConnected)));
}

#[tokio::test]
async fn test_session_outliving_close_cannot_acquire() {
    let (db, _) = connected(Dialect::MySql).await;
    let session = db.session().unwrap();
    db.close().await.unwrap();

    let err = session.acquire().await.unwrap_err();
    assert!(matches!(err, OrmError::State(StateError::PoolNotRunning)));
}

#[tokio::test]
async fn test_failed_unit_of_work_rolls_back_to_outer_lease() {
    let (db, backend) = connected(Dialect::MySql).await;
    let session = db.session().unwrap();

    session.acquire().await.unwrap();
    let result: OrmResult<()> = session
        .transaction(|s| async move {
            users()
                .update()
                .set("name", "a")
                .filter(col("id").eq(2))
                .execute(&s)
                .await?;
            Err(OrmError::Other("unit of work failed".into()))
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "unit of work failed");
    assert_eq!(session.state().await, SessionState::Leased);
    assert_eq!(
        backend.statements(),
        vec!["BEGIN", "UPDATE users SET name = ? WHERE id = ?", "ROLLBACK"]
    );

    session.release().await.unwrap();
    assert_eq!(session.state().await, SessionState::Idle);
    assert_eq!(backend.outstanding(), 0);
}

#[tokio::test]
async fn test_failing_rollback_reports_both_errors() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.fail_when("ROLLBACK");

    let result: OrmResult<()> = db
        .transaction(|_| async { Err(OrmError::Other("first".into())) })
        .await;
    let message = result.unwrap_err().to_string();
    assert!(message.starts_with("first (rollback failed:"), "{message}");
    assert_eq!(backend.outstanding(), 0);
}

#[tokio::test]
async fn test_transaction_commits_on_ok() {
    let (db, backend) = connected(Dialect::Postgres).await;
    backend.push_exec(1, None);

    let affected = db
        .transaction(|s| async move {
            let result = users()
                .delete()
                .filter(col("id").eq(7))
                .execute(&s)
                .await?;
            Ok(result.affected_rows)
        })
        .await
        .unwrap();

    assert_eq!(affected, 1);
    let executed = backend.executed();
    assert_eq!(executed[1].sql, "DELETE FROM users WHERE id = $1");
    assert_eq!(executed[1].params, vec![helo::Value::Int(7)]);
    assert_eq!(executed.last().map(|e| e.sql.as_str()), Some("COMMIT"));
    // one physical connection for the whole unit of work
    assert!(executed.iter().all(|e| e.conn == executed[0].conn));
}

#[tokio::test]
async fn test_transaction_macro_and_guard() {
    let (db, backend) = connected(Dialect::MySql).await;
    let session = db.session().unwrap();

    let result: OrmResult<u64> = async {
        helo::transaction!(session, tx, {
            let outcome = users()
                .update()
                .set("age", col("age") + 1)
                .filter(col("id").eq(1))
                .execute(&tx)
                .await?;
            Ok::<u64, OrmError>(outcome.affected_rows)
        })
    }
    .await;
    assert!(result.is_ok());
    assert_eq!(backend.statements().last().map(String::as_str), Some("COMMIT"));

    let tx = session.begin_transaction().await.unwrap();
    assert_eq!(session.state().await, SessionState::InTransaction);
    tx.rollback().await.unwrap();
    assert_eq!(session.state().await, SessionState::Idle);
}

#[tokio::test]
async fn test_nested_transactions_share_connection() {
    let (db, backend) = connected(Dialect::MySql).await;
    let session = db.session().unwrap();

    let result: OrmResult<()> = session
        .transaction(|outer| async move {
            let inner: OrmResult<()> = outer
                .transaction(|_| async { Err(OrmError::Other("inner".into())) })
                .await;
            assert!(inner.is_err());
            assert_eq!(outer.transaction_depth().await, 1);
            Ok(())
        })
        .await;
    assert!(result.is_ok());
    assert_eq!(
        backend.statements(),
        vec![
            "BEGIN",
            "SAVEPOINT helo_sp_1",
            "ROLLBACK TO SAVEPOINT helo_sp_1",
            "COMMIT"
        ]
    );
    assert_eq!(backend.acquired(), 1);
}

#[tokio::test]
async fn test_execute_dispatches_on_row_expectation() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.push_rows(vec![helo::Row::new().with("n", 1)]);
    backend.push_exec(3, Some(9));

    let rows = db
        .raw("SELECT COUNT(1) AS n FROM users WHERE age > ?", vec![18.into()])
        .await
        .unwrap()
        .rows()
        .unwrap();
    assert_eq!(rows.len(), 1);

    let result = db
        .raw("UPDATE users SET age = ?", vec![1.into()])
        .await
        .unwrap()
        .exec()
        .unwrap();
    assert_eq!(result.affected_rows, 3);
    assert_eq!(result.last_insert_id, Some(9));
}

#[tokio::test]
async fn test_raw_renumbers_for_postgres() {
    let (db, backend) = connected(Dialect::Postgres).await;
    db.raw("UPDATE t SET a = ? WHERE b = ?", vec![1.into(), 2.into()])
        .await
        .unwrap();
    assert_eq!(backend.statements(), vec!["UPDATE t SET a = $1 WHERE b = $2"]);

    let err = db.raw("UPDATE t SET a = ?", vec![]).await.unwrap_err();
    assert!(err.is_usage());
}

#[tokio::test]
async fn test_concurrent_clones_serialize_on_one_connection() {
    let (db, backend) = connected(Dialect::MySql).await;
    let session = db.session().unwrap();
    session.acquire().await.unwrap();

    let handles = (0..8).map(|i| {
        let s = session.clone();
        tokio::spawn(async move {
            users()
                .update()
                .set("n", i)
                .filter(col("id").eq(i))
                .execute(&s)
                .await
        })
    });
    for outcome in join_all(handles).await {
        outcome.unwrap().unwrap();
    }
    session.release().await.unwrap();

    assert_eq!(backend.executed().len(), 8);
    assert_eq!(backend.acquired(), 1);
    assert_eq!(session.state().await, SessionState::Idle);
}

#[tokio::test]
async fn test_slow_statement_times_out() {
    let backend = MockBackend::new(Dialect::MySql);
    backend.latency(Duration::from_millis(200));
    let db = Database::new(
        backend.clone(),
        DatabaseConfig::new("mock://localhost/app")
            .dialect(Dialect::MySql)
            .query_timeout(Duration::from_millis(10)),
    );
    db.connect().await.unwrap();

    let err = users()
        .delete()
        .filter(col("id").eq(1))
        .execute(&db)
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(backend.outstanding(), 0);
}
