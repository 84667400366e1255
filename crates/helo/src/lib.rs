//! # helo
//!
//! Composable SQL statement builders over a reentrant, transactional
//! connection manager.
//!
//! ## Features
//!
//! - **Expression trees render themselves**: precedence-aware parentheses,
//!   every value bound as a placeholder, every name validated
//! - **Two dialects**: MySQL (`?`, backticks) and PostgreSQL (`$n`, double quotes)
//! - **Safe defaults**: DELETE requires WHERE, malformed builder calls fail
//!   before anything reaches the server
//! - **Reentrant sessions**: nested acquires share one physical connection,
//!   nested transactions become savepoints
//!
//! ## Statements
//!
//! ```ignore
//! use helo::prelude::*;
//!
//! let users = Table::new("users")
//!     .column(ColumnDef::auto("id"))
//!     .column(ColumnDef::new("name", FieldType::VarChar(32)).not_null())
//!     .column(ColumnDef::new("age", FieldType::Int).default(0));
//!
//! let db = Database::new(PostgresBackend, DatabaseConfig::from_env()?);
//! db.connect().await?;
//! let session = db.session()?;
//!
//! // SELECT
//! let adults = users
//!     .select()
//!     .filter(col("age").ge(18))
//!     .order_by([col("name").asc()])
//!     .all(&session)
//!     .await?;
//!
//! // UPDATE inside a transaction
//! session
//!     .transaction(|s| async move {
//!         users.update().set("age", col("age") + 1).filter(col("id").eq(1)).execute(&s).await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```

pub mod backend;
pub mod builder;
pub mod config;
mod crud;
pub mod database;
pub mod error;
pub mod executor;
pub mod expr;
pub mod ident;
pub mod prelude;
pub mod row;
pub mod schema;
pub mod session;
pub mod sql;
pub mod transaction;
pub mod value;

pub use backend::{Backend, MockBackend, PhysicalConnection, Pool};
pub use builder::{
    CreateTable, Delete, DropTable, Insert, JoinKind, Replace, STREAM_BATCH, Select, Show, ShowKind,
    Statement, Update,
};
pub use config::DatabaseConfig;
pub use database::{Database, Outcome};
pub use error::{OrmError, OrmResult, StateError};
pub use executor::Executor;
pub use expr::{
    ColumnRef, Direction, Expr, IntoExpr, Op, Ordering, and_, avg, col, count, count_all,
    count_distinct, exists, func, max, min, not_exists, or_, raw, sum, val,
};
pub use ident::Ident;
pub use row::{FromRow, Row, RowsExt};
pub use schema::{ColumnDef, ColumnDefault, FieldType, IndexDef, Table};
pub use session::{Session, SessionState};
pub use sql::{AliasMap, Dialect, ExecResult, Node, Query, RenderContext, Rendered};
pub use transaction::Transaction;
pub use value::{FromValue, Value};

#[cfg(feature = "pool")]
pub use backend::PostgresBackend;
