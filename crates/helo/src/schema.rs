//! Explicit table descriptions.
//!
//! A [`Table`] is built once per entity type and carries everything the
//! statement builders and the table-level helpers need: column definitions,
//! the primary key, secondary indexes and the logical database the table lives
//! in. Values written through the helpers are normalized against it first.

use crate::error::{OrmError, OrmResult};
use crate::expr::{ColumnRef, Expr};
use crate::row::Row;
use crate::sql::{Dialect, Node, RenderContext};
use crate::value::Value;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use uuid::Uuid;

/// Column storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Bool,
    Float,
    Double,
    Text,
    Char(u32),
    VarChar(u32),
    Date,
    DateTime,
    Timestamp,
    Uuid,
    Json,
    Blob,
}

impl FieldType {
    /// Column type as written in `CREATE TABLE`.
    pub fn sql(self, dialect: Dialect) -> String {
        match (self, dialect) {
            (FieldType::TinyInt, Dialect::MySql) => "tinyint".into(),
            (FieldType::TinyInt, Dialect::Postgres) => "smallint".into(),
            (FieldType::SmallInt, _) => "smallint".into(),
            (FieldType::Int, Dialect::MySql) => "int".into(),
            (FieldType::Int, Dialect::Postgres) => "integer".into(),
            (FieldType::BigInt, _) => "bigint".into(),
            (FieldType::Bool, Dialect::MySql) => "bool".into(),
            (FieldType::Bool, Dialect::Postgres) => "boolean".into(),
            (FieldType::Float, Dialect::MySql) => "float".into(),
            (FieldType::Float, Dialect::Postgres) => "real".into(),
            (FieldType::Double, Dialect::MySql) => "double".into(),
            (FieldType::Double, Dialect::Postgres) => "double precision".into(),
            (FieldType::Text, _) => "text".into(),
            (FieldType::Char(n), _) => format!("char({n})"),
            (FieldType::VarChar(n), _) => format!("varchar({n})"),
            (FieldType::Date, _) => "date".into(),
            (FieldType::DateTime, Dialect::MySql) => "datetime".into(),
            (FieldType::DateTime, Dialect::Postgres) => "timestamp".into(),
            (FieldType::Timestamp, Dialect::MySql) => "timestamp".into(),
            (FieldType::Timestamp, Dialect::Postgres) => "timestamptz".into(),
            (FieldType::Uuid, Dialect::MySql) => "varchar(40)".into(),
            (FieldType::Uuid, Dialect::Postgres) => "uuid".into(),
            (FieldType::Json, Dialect::MySql) => "json".into(),
            (FieldType::Json, Dialect::Postgres) => "jsonb".into(),
            (FieldType::Blob, Dialect::MySql) => "blob".into(),
            (FieldType::Blob, Dialect::Postgres) => "bytea".into(),
        }
    }

    fn int_range(self) -> Option<(i64, i64)> {
        match self {
            FieldType::TinyInt => Some((i64::from(i8::MIN), i64::from(i8::MAX))),
            FieldType::SmallInt => Some((i64::from(i16::MIN), i64::from(i16::MAX))),
            FieldType::Int => Some((i64::from(i32::MIN), i64::from(i32::MAX))),
            FieldType::BigInt => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Coerce `value` into the representation stored in this column type.
    ///
    /// `NULL` passes through; nullability is checked by the caller.
    pub fn coerce(self, column: &str, value: Value) -> OrmResult<Value> {
        if value.is_null() {
            return Ok(value);
        }
        let invalid = |value: &Value| {
            OrmError::data(
                column,
                format!("invalid {} value for {:?} column: {value}", value.type_name(), self),
            )
        };

        if let Some((lo, hi)) = self.int_range() {
            let n = match &value {
                Value::Int(n) => *n,
                Value::Bool(b) => i64::from(*b),
                Value::Float(f) if f.fract() == 0.0 => {
                    // 2^63 itself rounds into the upper bound, so it is excluded.
                    if !(i64::MIN as f64..i64::MAX as f64).contains(f) {
                        return Err(OrmError::data(column, format!("{f} is out of range")));
                    }
                    *f as i64
                }
                Value::Text(s) => s.trim().parse::<i64>().map_err(|_| invalid(&value))?,
                _ => return Err(invalid(&value)),
            };
            if n < lo || n > hi {
                return Err(OrmError::data(column, format!("{n} is out of range")));
            }
            return Ok(Value::Int(n));
        }

        match self {
            FieldType::Bool => match value {
                Value::Bool(_) => Ok(value),
                Value::Int(0) => Ok(Value::Bool(false)),
                Value::Int(1) => Ok(Value::Bool(true)),
                other => Err(invalid(&other)),
            },
            FieldType::Float | FieldType::Double => match &value {
                Value::Float(_) => Ok(value),
                Value::Int(n) => Ok(Value::Float(*n as f64)),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| invalid(&value)),
                _ => Err(invalid(&value)),
            },
            FieldType::Text | FieldType::Char(_) | FieldType::VarChar(_) => {
                let text = match value {
                    Value::Text(s) => s,
                    Value::Int(n) => n.to_string(),
                    Value::Float(f) => f.to_string(),
                    Value::Uuid(u) => u.to_string(),
                    other => return Err(invalid(&other)),
                };
                if let FieldType::Char(max) | FieldType::VarChar(max) = self {
                    let len = text.chars().count();
                    if len > max as usize {
                        return Err(OrmError::data(
                            column,
                            format!("value of length {len} exceeds {max}"),
                        ));
                    }
                }
                Ok(Value::Text(text))
            }
            FieldType::Uuid => match &value {
                Value::Uuid(_) => Ok(value),
                Value::Text(s) => Uuid::parse_str(s)
                    .map(Value::Uuid)
                    .map_err(|_| invalid(&value)),
                Value::Bytes(b) => Uuid::from_slice(b)
                    .map(Value::Uuid)
                    .map_err(|_| invalid(&value)),
                _ => Err(invalid(&value)),
            },
            FieldType::Date => match &value {
                Value::Date(_) => Ok(value),
                Value::Timestamp(ts) => Ok(Value::Date(ts.date())),
                Value::TimestampTz(ts) => Ok(Value::Date(ts.date_naive())),
                Value::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|_| invalid(&value)),
                _ => Err(invalid(&value)),
            },
            FieldType::DateTime | FieldType::Timestamp => match &value {
                Value::Timestamp(_) | Value::TimestampTz(_) => Ok(value),
                Value::Date(d) => Ok(Value::Timestamp(d.and_time(chrono::NaiveTime::MIN))),
                Value::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .map(Value::Timestamp)
                    .map_err(|_| invalid(&value)),
                _ => Err(invalid(&value)),
            },
            FieldType::Json => match value {
                Value::Json(_) => Ok(value),
                other => serde_json::to_value(&other)
                    .map(Value::Json)
                    .map_err(|e| OrmError::data(column, e.to_string())),
            },
            FieldType::Blob => match value {
                Value::Bytes(_) => Ok(value),
                Value::Text(s) => Ok(Value::Bytes(s.into_bytes())),
                other => Err(invalid(&other)),
            },
            FieldType::TinyInt | FieldType::SmallInt | FieldType::Int | FieldType::BigInt => {
                Err(invalid(&value))
            }
        }
    }
}

/// Column default.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    /// A constant written into the DDL and used when a row omits the column.
    Value(Value),
    /// A server-side expression such as `CURRENT_TIMESTAMP`. Rows that omit
    /// the column leave it out of the insert entirely.
    Sql(String),
    /// Computed on the client for every insert that omits the column.
    Generated(fn() -> Value),
}

/// One column of a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub comment: Option<String>,
}

impl ColumnDef {
    /// A nullable column without a default.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            default: None,
            primary_key: false,
            auto_increment: false,
            comment: None,
        }
    }

    /// Auto-incrementing `bigint` primary key.
    pub fn auto(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::BigInt).primary_key().auto_increment()
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    pub fn default_sql(mut self, sql: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Sql(sql.into()));
        self
    }

    pub fn default_with(mut self, f: fn() -> Value) -> Self {
        self.default = Some(ColumnDefault::Generated(f));
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Column definition as written in `CREATE TABLE`.
    pub(crate) fn render_definition(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        let dialect = ctx.dialect();
        ctx.ident(&self.name)?.literal(" ");

        if self.auto_increment && dialect == Dialect::Postgres {
            ctx.literal(&self.field_type.sql(dialect))
                .literal(" GENERATED BY DEFAULT AS IDENTITY");
        } else {
            ctx.literal(&self.field_type.sql(dialect));
        }

        if self.nullable {
            ctx.literal(" NULL");
        } else {
            ctx.literal(" NOT NULL");
        }

        if self.auto_increment && dialect == Dialect::MySql {
            ctx.literal(" AUTO_INCREMENT");
        }

        match &self.default {
            Some(ColumnDefault::Value(v)) => {
                ctx.literal(" DEFAULT ").literal(&v.to_sql_literal());
            }
            Some(ColumnDefault::Sql(sql)) => {
                ctx.literal(" DEFAULT ").literal(sql);
            }
            Some(ColumnDefault::Generated(_)) | None => {}
        }

        if let (Some(comment), Dialect::MySql) = (&self.comment, dialect) {
            ctx.literal(" COMMENT ")
                .literal(&crate::value::quote_literal(comment));
        }
        Ok(())
    }
}

/// Secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDef {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A table description.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    /// Logical database the table belongs to. Tables in different databases
    /// cannot be joined.
    pub database: Option<String>,
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<IndexDef>,
    pub comment: Option<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: None,
            columns: Vec::new(),
            indexes: Vec::new(),
            comment: None,
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Column definition by name.
    pub fn field(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub(crate) fn require_primary_key(&self) -> OrmResult<&ColumnDef> {
        self.primary_key().ok_or_else(|| {
            OrmError::usage(format!("table {} has no primary key", self.name))
        })
    }

    /// Column of this table, qualified with the table name in joined selects.
    pub fn col(&self, name: impl Into<String>) -> Expr {
        Expr::Column(ColumnRef::of(self.name.clone(), name))
    }

    /// `table.*`
    pub fn star(&self) -> Expr {
        self.col("*")
    }

    /// Check a single row to be inserted.
    ///
    /// Missing or `NULL` values fall back to the column default. Columns with a
    /// server-side default, and auto-increment columns, are left out when
    /// missing. `NULL` into a `NOT NULL` column is rejected unless
    /// `for_replace`. Unknown columns are rejected.
    pub fn normalize_insert(&self, row: Row, for_replace: bool) -> OrmResult<Row> {
        let mut given = row;
        let mut out = Row::new();

        for column in &self.columns {
            let mut value = given.take(&column.name).unwrap_or(Value::Null);
            if value.is_null() {
                match &column.default {
                    Some(ColumnDefault::Sql(_)) => continue,
                    Some(ColumnDefault::Value(v)) => value = v.clone(),
                    Some(ColumnDefault::Generated(f)) => value = f(),
                    None => {}
                }
            }
            if value.is_null() && column.auto_increment {
                continue;
            }
            if value.is_null() && !column.nullable && !for_replace {
                return Err(OrmError::data(
                    &column.name,
                    "NULL for a NOT NULL column",
                ));
            }
            let value = column.field_type.coerce(&column.name, value)?;
            out.insert(column.name.clone(), value);
        }

        if let Some((name, _)) = given.iter().next() {
            return Err(OrmError::data(
                name,
                format!("table {} has no such column", self.name),
            ));
        }
        Ok(out)
    }

    /// Check the values of an update: unknown columns are rejected and every
    /// value is coerced to its column type.
    pub fn normalize_update(&self, values: Row) -> OrmResult<Row> {
        let mut out = Row::new();
        for (name, value) in values {
            let column = self.field(&name).ok_or_else(|| {
                OrmError::data(&name, format!("table {} has no such column", self.name))
            })?;
            if value.is_null() && !column.nullable {
                return Err(OrmError::data(&name, "NULL for a NOT NULL column"));
            }
            let value = column.field_type.coerce(&name, value)?;
            out.insert(name, value);
        }
        Ok(out)
    }

    /// Sanity checks run before `CREATE TABLE`.
    pub(crate) fn validate(&self) -> OrmResult<()> {
        if self.columns.is_empty() {
            return Err(OrmError::usage(format!("table {} has no columns", self.name)));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(OrmError::usage(format!(
                    "duplicate column {} in table {}",
                    column.name, self.name
                )));
            }
        }
        if self.columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(OrmError::usage(format!(
                "table {} has more than one primary key column",
                self.name
            )));
        }
        for index in &self.indexes {
            if index.columns.is_empty() {
                return Err(OrmError::usage(format!("index {} has no columns", index.name)));
            }
            if let Some(missing) = index.columns.iter().find(|c| self.field(c).is_none()) {
                return Err(OrmError::usage(format!(
                    "index {} refers to unknown column {missing}",
                    index.name
                )));
            }
        }
        Ok(())
    }
}

impl Node for Table {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        ctx.ident(&self.name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new("users")
            .column(ColumnDef::auto("id"))
            .column(ColumnDef::new("name", FieldType::VarChar(8)).not_null())
            .column(ColumnDef::new("age", FieldType::TinyInt).default(0))
            .column(ColumnDef::new("created_at", FieldType::DateTime).default_sql("CURRENT_TIMESTAMP"))
    }

    #[test]
    fn insert_fills_defaults_and_skips_server_side() {
        let row = Row::new().with("name", "bob");
        let out = users().normalize_insert(row, false).unwrap();
        let names: Vec<_> = out.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["name", "age"]);
        assert_eq!(out.value("age"), Some(&Value::Int(0)));
    }

    #[test]
    fn insert_rejects_null_and_unknown() {
        let err = users().normalize_insert(Row::new(), false).unwrap_err();
        assert!(matches!(err, OrmError::Data { ref column, .. } if column == "name"));

        let row = Row::new().with("name", "bob").with("nick", "b");
        let err = users().normalize_insert(row, false).unwrap_err();
        assert!(matches!(err, OrmError::Data { ref column, .. } if column == "nick"));

        assert!(users().normalize_insert(Row::new(), true).is_ok());
    }

    #[test]
    fn coercion_failures_are_data_errors() {
        let row = Row::new().with("name", "bob").with("age", 300);
        assert!(users().normalize_insert(row, false).is_err());

        let row = Row::new().with("name", "much too long");
        assert!(users().normalize_insert(row, false).is_err());

        let row = Row::new().with("name", "bob").with("age", "12");
        let out = users().normalize_insert(row, false).unwrap();
        assert_eq!(out.value("age"), Some(&Value::Int(12)));
    }

    #[test]
    fn float_outside_integer_range_is_rejected() {
        let err = FieldType::BigInt.coerce("n", Value::Float(1e30)).unwrap_err();
        assert!(matches!(err, OrmError::Data { ref column, .. } if column == "n"));
        assert!(FieldType::BigInt.coerce("n", Value::Float(9_223_372_036_854_775_808.0)).is_err());
        assert!(FieldType::BigInt.coerce("n", Value::Float(f64::INFINITY)).is_err());
        assert!(FieldType::BigInt.coerce("n", Value::Float(f64::NAN)).is_err());

        let min = FieldType::BigInt.coerce("n", Value::Float(-9_223_372_036_854_775_808.0));
        assert_eq!(min.unwrap(), Value::Int(i64::MIN));
        assert_eq!(
            FieldType::BigInt.coerce("n", Value::Float(4096.0)).unwrap(),
            Value::Int(4096)
        );
    }

    #[test]
    fn update_checks_columns() {
        let out = users()
            .normalize_update(Row::new().with("age", 3.0))
            .unwrap();
        assert_eq!(out.value("age"), Some(&Value::Int(3)));
        assert!(users().normalize_update(Row::new().with("nope", 1)).is_err());
        assert!(users().normalize_update(Row::new().with("name", Value::Null)).is_err());
    }

    #[test]
    fn json_coercion_serializes_value() {
        let v = FieldType::Json.coerce("meta", Value::from("x")).unwrap();
        assert_eq!(v, Value::Json(serde_json::json!("x")));
    }

    #[test]
    fn validate_catches_bad_schema() {
        assert!(Table::new("t").validate().is_err());
        let t = users().index(IndexDef::new("idx_nick", ["nick"]));
        assert!(t.validate().is_err());
        assert!(users().index(IndexDef::new("idx_name", ["name"]).unique()).validate().is_ok());
    }
}
