//! Convenient imports for typical `helo` usage.
//!
//! ```ignore
//! use helo::prelude::*;
//! ```

pub use crate::{
    ColumnDef, Database, DatabaseConfig, Dialect, Executor, FieldType, FromRow, FromValue,
    IndexDef, OrmError, OrmResult, Row, Session, Statement, Table, Value, and_, col, count_all,
    or_, raw, val,
};

#[cfg(feature = "pool")]
pub use crate::PostgresBackend;
