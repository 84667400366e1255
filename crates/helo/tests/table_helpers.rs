//! Primary-key helpers and select terminals run against the mock backend.

use futures_util::TryStreamExt;
use helo::{
    ColumnDef, Database, DatabaseConfig, Dialect, FieldType, IndexDef, MockBackend, OrmError, Row,
    Table, Value, col,
};

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
        .column(ColumnDef::auto("id"))
        .column(ColumnDef::new("name", FieldType::VarChar(32)).not_null())
        .column(ColumnDef::new("age", FieldType::Int).default(0))
        .index(IndexDef::new("idx_name", ["name"]))
}

fn posts() -> Table {
    Table::new("posts")
        .column(ColumnDef::auto("id"))
        .column(ColumnDef::new("user_id", FieldType::BigInt).not_null())
}

#[tokio::test]
async fn test_get_by_primary_key() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.push_rows(vec![
        Row::new().with("id", 3).with("name", "ann"),
        Row::new().with("id", 4).with("name", "bob"),
    ]);

    let row = users().get(3, &db).await.unwrap().unwrap();
    assert_eq!(row.get::<String>("name").unwrap(), "ann");

    let executed = backend.executed();
    assert_eq!(executed[0].sql, "SELECT * FROM users WHERE id = ? LIMIT 1");
    assert_eq!(executed[0].params, vec![Value::Int(3)]);
}

#[tokio::test]
async fn test_get_missing_row_is_none() {
    let (db, _) = connected(Dialect::MySql).await;
    assert!(users().get(99, &db).await.unwrap().is_none());
}

#[tokio::test]
async fn test_helpers_require_a_primary_key() {
    let (db, backend) = connected(Dialect::MySql).await;
    let keyless = Table::new("log").column(ColumnDef::new("line", FieldType::Text));

    assert!(keyless.get(1, &db).await.unwrap_err().is_usage());
    assert!(keyless.remove(1, &db).await.unwrap_err().is_usage());
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn test_get_many_uses_in_list() {
    let (db, backend) = connected(Dialect::Postgres).await;
    users().get_many([1, 2, 3], &db).await.unwrap();
    assert_eq!(
        backend.statements(),
        vec!["SELECT * FROM users WHERE id IN ($1, $2, $3)"]
    );
}

#[tokio::test]
async fn test_add_fills_defaults_and_returns_last_id() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.push_exec(1, Some(42));

    let id = users()
        .add(Row::new().with("name", "ann"), &db)
        .await
        .unwrap();
    assert_eq!(id, Some(42));

    let executed = backend.executed();
    assert_eq!(executed[0].sql, "INSERT INTO users (name, age) VALUES (?, ?)");
    assert_eq!(
        executed[0].params,
        vec![Value::Text("ann".into()), Value::Int(0)]
    );
    assert!(!executed[0].many);
}

#[tokio::test]
async fn test_add_on_postgres_reads_returning() {
    let (db, backend) = connected(Dialect::Postgres).await;
    backend.push_rows(vec![Row::new().with("id", 7)]);

    let id = users()
        .add(Row::new().with("name", "ann").with("age", 30), &db)
        .await
        .unwrap();
    assert_eq!(id, Some(7));
    assert_eq!(
        backend.statements(),
        vec!["INSERT INTO users (name, age) VALUES ($1, $2) RETURNING id"]
    );
}

#[tokio::test]
async fn test_add_rejects_bad_rows_before_sending() {
    let (db, backend) = connected(Dialect::MySql).await;

    let err = users().add(Row::new().with("age", 1), &db).await.unwrap_err();
    assert!(matches!(err, OrmError::Data { ref column, .. } if column == "name"));

    let err = users()
        .add(Row::new().with("name", "x").with("email", "x@y"), &db)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Data { ref column, .. } if column == "email"));

    let long = "x".repeat(33);
    assert!(users().add(Row::new().with("name", long), &db).await.is_err());
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn test_add_many_is_one_batch_statement() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.push_exec(2, None);

    let affected = users()
        .add_many(
            vec![
                Row::new().with("name", "a"),
                Row::new().with("name", "b").with("age", 5),
            ],
            &db,
        )
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let executed = backend.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(
        executed[0].sql,
        "INSERT INTO users (name, age) VALUES (?, ?), (?, ?)"
    );
    assert!(executed[0].many);
}

#[tokio::test]
async fn test_add_many_with_no_rows_sends_nothing() {
    let (db, backend) = connected(Dialect::MySql).await;
    assert_eq!(users().add_many(Vec::new(), &db).await.unwrap(), 0);
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn test_set_and_remove_by_primary_key() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.push_exec(1, None).push_exec(1, None);

    let updated = users()
        .set(5, Row::new().with("age", "41"), &db)
        .await
        .unwrap();
    assert_eq!(updated, 1);
    let removed = users().remove(5, &db).await.unwrap();
    assert_eq!(removed, 1);

    let executed = backend.executed();
    assert_eq!(executed[0].sql, "UPDATE users SET age = ? WHERE id = ?");
    assert_eq!(executed[0].params, vec![Value::Int(41), Value::Int(5)]);
    assert_eq!(executed[1].sql, "DELETE FROM users WHERE id = ?");
}

#[tokio::test]
async fn test_set_cannot_touch_primary_key() {
    let (db, backend) = connected(Dialect::MySql).await;
    let err = users()
        .set(5, Row::new().with("id", 6), &db)
        .await
        .unwrap_err();
    assert!(err.is_usage());
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn test_save_upserts_on_postgres() {
    let (db, backend) = connected(Dialect::Postgres).await;
    users()
        .save(Row::new().with("id", 1).with("name", "ann"), &db)
        .await
        .unwrap();
    assert_eq!(
        backend.statements(),
        vec![
            "INSERT INTO users (id, name, age) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, age = EXCLUDED.age"
        ]
    );
}

#[tokio::test]
async fn test_count_drops_ordering() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.push_rows(vec![Row::new().with("COUNT(1)", 12)]);

    let n = users()
        .select()
        .filter(col("age").gt(18))
        .order_by([col("name").asc()])
        .count(&db)
        .await
        .unwrap();
    assert_eq!(n, 12);
    assert_eq!(
        backend.statements(),
        vec!["SELECT COUNT(1) FROM users WHERE age > ? LIMIT 1"]
    );
}

#[tokio::test]
async fn test_count_with_no_rows_is_zero() {
    let (db, _) = connected(Dialect::MySql).await;
    assert_eq!(users().select().count(&db).await.unwrap(), 0);
    assert!(!users().select().exist(&db).await.unwrap());
}

#[tokio::test]
async fn test_paginate_and_rows_window() {
    let (db, backend) = connected(Dialect::MySql).await;

    users().select().paginate(3, 20, &db).await.unwrap();
    users().select().paginate(0, 20, &db).await.unwrap();
    users().select().rows(5, 10, &db).await.unwrap();
    assert_eq!(
        backend.statements(),
        vec![
            "SELECT * FROM users LIMIT 20 OFFSET 40",
            "SELECT * FROM users LIMIT 20 OFFSET 0",
            "SELECT * FROM users LIMIT 5 OFFSET 10",
        ]
    );

    assert!(users().select().paginate(1, 0, &db).await.unwrap_err().is_usage());
    assert!(users().select().rows(0, 0, &db).await.unwrap_err().is_usage());
}

fn ids(range: std::ops::RangeInclusive<i64>) -> Vec<Row> {
    range.map(|id| Row::new().with("id", id)).collect()
}

#[tokio::test]
async fn test_batches_page_until_short_batch() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend
        .push_rows(ids(1..=2))
        .push_rows(ids(3..=4))
        .push_rows(ids(5..=5));

    let batches: Vec<Vec<Row>> = users()
        .select()
        .order_by(["id"])
        .batches(2, &db)
        .try_collect()
        .await
        .unwrap();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(batches[2][0].get::<i64>("id").unwrap(), 5);
    assert_eq!(
        backend.statements(),
        vec![
            "SELECT * FROM users ORDER BY id LIMIT 2 OFFSET 0",
            "SELECT * FROM users ORDER BY id LIMIT 2 OFFSET 2",
            "SELECT * FROM users ORDER BY id LIMIT 2 OFFSET 4",
        ]
    );
    assert_eq!(backend.outstanding(), 0);
}

#[tokio::test]
async fn test_batches_stop_on_empty_page() {
    let (db, backend) = connected(Dialect::Postgres).await;
    backend.push_rows(ids(1..=2)).push_rows(ids(3..=4));

    let batches: Vec<Vec<Row>> = users().select().batches(2, &db).try_collect().await.unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(
        backend.statements(),
        vec![
            "SELECT * FROM users LIMIT 2 OFFSET 0",
            "SELECT * FROM users LIMIT 2 OFFSET 2",
            "SELECT * FROM users LIMIT 2 OFFSET 4",
        ]
    );
}

#[tokio::test]
async fn test_stream_yields_rows_in_default_batches() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.push_rows(ids(1..=4));

    let rows: Vec<Row> = users().select().stream(&db).try_collect().await.unwrap();
    let got: Vec<i64> = rows.iter().map(|r| r.get::<i64>("id").unwrap()).collect();
    assert_eq!(got, vec![1, 2, 3, 4]);
    assert_eq!(
        backend.statements(),
        vec!["SELECT * FROM users LIMIT 200 OFFSET 0"]
    );
}

#[tokio::test]
async fn test_batches_respect_select_window() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.push_rows(ids(11..=12)).push_rows(ids(13..=13));

    let batches: Vec<Vec<Row>> = users()
        .select()
        .limit(3)
        .offset(10)
        .batches(2, &db)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(batches.concat().len(), 3);
    assert_eq!(
        backend.statements(),
        vec![
            "SELECT * FROM users LIMIT 2 OFFSET 10",
            "SELECT * FROM users LIMIT 1 OFFSET 12",
        ]
    );
}

#[tokio::test]
async fn test_zero_batch_size_is_usage_error() {
    let (db, backend) = connected(Dialect::MySql).await;
    let err = users()
        .select()
        .batches(0, &db)
        .try_collect::<Vec<_>>()
        .await
        .unwrap_err();
    assert!(err.is_usage());
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn test_aliases_are_mapped_back() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.push_rows(vec![Row::new().with("n", "ann").with("age", 30)]);

    let rows = users()
        .select()
        .columns([col("name").as_("n"), col("age")])
        .all(&db)
        .await
        .unwrap();
    assert_eq!(rows[0].get::<String>("name").unwrap(), "ann");
    assert!(!rows[0].contains("n"));
    assert_eq!(backend.statements(), vec!["SELECT name AS n, age FROM users"]);
}

#[tokio::test]
async fn test_create_tables_on_postgres_adds_index_statements() {
    let (db, backend) = connected(Dialect::Postgres).await;
    db.create_tables(&[users(), posts()]).await.unwrap();

    let statements = backend.statements();
    assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
    assert_eq!(
        statements[2],
        "CREATE INDEX IF NOT EXISTS idx_name ON users (name)"
    );
    assert!(statements[3].starts_with("CREATE TABLE IF NOT EXISTS posts"));
    assert_eq!(statements.last().map(String::as_str), Some("COMMIT"));
    assert_eq!(backend.acquired(), 1);
}

#[tokio::test]
async fn test_drop_tables_in_reverse_order() {
    let (db, backend) = connected(Dialect::MySql).await;
    db.drop_tables(&[users(), posts()]).await.unwrap();
    assert_eq!(
        backend.statements(),
        vec![
            "BEGIN",
            "DROP TABLE IF EXISTS posts",
            "DROP TABLE IF EXISTS users",
            "COMMIT"
        ]
    );
}

#[tokio::test]
async fn test_failed_create_rolls_back() {
    let (db, backend) = connected(Dialect::MySql).await;
    backend.fail_when("CREATE TABLE IF NOT EXISTS posts");

    assert!(db.create_tables(&[users(), posts()]).await.is_err());
    assert_eq!(backend.statements().last().map(String::as_str), Some("ROLLBACK"));
    assert_eq!(backend.outstanding(), 0);
}
