//! PostgreSQL backend over a `deadpool-postgres` pool.

use super::{Backend, PhysicalConnection, Pool};
use crate::config::{DatabaseConfig, redact};
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::sql::{Dialect, ExecResult};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Object, RecyclingMethod};
use tokio_postgres::NoTls;
use tokio_postgres::types::{ToSql, Type};
use uuid::Uuid;

/// Opens [`PgPool`]s without TLS.
///
/// ```ignore
/// let db = Database::new(PostgresBackend, DatabaseConfig::from_env()?);
/// db.connect().await?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresBackend;

impl Backend for PostgresBackend {
    type Pool = PgPool;

    async fn create_pool(&self, config: &DatabaseConfig) -> OrmResult<PgPool> {
        if config.resolved_dialect()? != Dialect::Postgres {
            return Err(OrmError::Unsupported(format!(
                "postgres backend cannot serve {}",
                redact(&config.url)
            )));
        }

        let pg_config: tokio_postgres::Config = config
            .url
            .parse()
            .map_err(|e: tokio_postgres::Error| OrmError::Connection(e.to_string()))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = deadpool_postgres::Pool::builder(manager)
            .max_size(config.max_size)
            .build()
            .map_err(|e| OrmError::Pool(e.to_string()))?;
        Ok(PgPool { pool })
    }
}

#[derive(Clone)]
pub struct PgPool {
    pool: deadpool_postgres::Pool,
}

impl PgPool {
    /// Wrap an already configured deadpool pool.
    pub fn from_pool(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for PgPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgPool")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl Pool for PgPool {
    type Conn = PgConnection;

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn is_running(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn acquire(&self) -> OrmResult<PgConnection> {
        let client = self.pool.get().await?;
        Ok(PgConnection { client })
    }

    async fn release(&self, conn: PgConnection) -> OrmResult<()> {
        // returning the object to deadpool is its drop
        drop(conn);
        Ok(())
    }

    async fn close(&self) -> OrmResult<()> {
        self.pool.close();
        Ok(())
    }
}

pub struct PgConnection {
    client: Object,
}

fn bind_refs(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

impl PhysicalConnection for PgConnection {
    async fn execute(&mut self, sql: &str, params: &[Value], _many: bool) -> OrmResult<ExecResult> {
        let refs = bind_refs(params);
        let affected = self
            .client
            .execute(sql, &refs)
            .await
            .map_err(OrmError::from_db_error)?;
        Ok(ExecResult::new(affected, None))
    }

    async fn fetch(
        &mut self,
        sql: &str,
        params: &[Value],
        limit: Option<usize>,
    ) -> OrmResult<Vec<Row>> {
        let refs = bind_refs(params);
        let rows = self
            .client
            .query(sql, &refs)
            .await
            .map_err(OrmError::from_db_error)?;
        let take = limit.unwrap_or(rows.len());
        rows.iter().take(take).map(decode_row).collect()
    }

    async fn begin(&mut self) -> OrmResult<()> {
        self.batch("BEGIN").await
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.batch("COMMIT").await
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.batch("ROLLBACK").await
    }

    async fn batch(&mut self, sql: &str) -> OrmResult<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(OrmError::from_db_error)
    }
}

fn decode_row(row: &tokio_postgres::Row) -> OrmResult<Row> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.name(), column.type_())?;
        out.insert(column.name(), value);
    }
    Ok(out)
}

fn decode_column(row: &tokio_postgres::Row, idx: usize, name: &str, ty: &Type) -> OrmResult<Value> {
    macro_rules! get {
        ($t:ty) => {
            row.try_get::<_, Option<$t>>(idx)
                .map_err(|e| OrmError::decode(name, e.to_string()))?
                .map(Value::from)
        };
    }

    let value = match *ty {
        Type::BOOL => get!(bool),
        Type::INT2 => get!(i16),
        Type::INT4 => get!(i32),
        Type::INT8 => get!(i64),
        Type::OID => get!(u32),
        Type::FLOAT4 => get!(f32),
        Type::FLOAT8 => get!(f64),
        Type::BYTEA => get!(Vec<u8>),
        Type::JSON | Type::JSONB => get!(serde_json::Value),
        Type::TIMESTAMP => get!(NaiveDateTime),
        Type::TIMESTAMPTZ => get!(DateTime<Utc>),
        Type::DATE => get!(NaiveDate),
        Type::UUID => get!(Uuid),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => get!(String),
        // information_schema domains and enums read as text
        _ => row
            .try_get::<_, Option<String>>(idx)
            .map_err(|_| OrmError::decode(name, format!("unsupported column type {ty}")))?
            .map(Value::from),
    };
    Ok(value.unwrap_or(Value::Null))
}
