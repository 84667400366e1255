use crate::value::Value;

/// A finished statement: SQL text plus the parameters bound to its placeholders.
///
/// Immutable once built. `expects_rows` tells the executor whether to fetch a
/// row set or to run the statement for its effect; `many` marks a batch insert.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    params: Vec<Value>,
    expects_rows: bool,
    many: bool,
}

impl Query {
    /// A parameter-free query. Whether it returns rows is inferred from its
    /// leading keyword.
    pub fn new(sql: impl Into<String>) -> Self {
        Self::with_params(sql, Vec::new())
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        let sql = sql.into();
        let expects_rows = returns_rows(&sql);
        Self {
            sql,
            params,
            expects_rows,
            many: false,
        }
    }

    /// Override the inferred row expectation.
    pub fn returning_rows(mut self, expects_rows: bool) -> Self {
        self.expects_rows = expects_rows;
        self
    }

    /// Mark the query as a batch write.
    pub fn batch(mut self, many: bool) -> Self {
        self.many = many;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn expects_rows(&self) -> bool {
        self.expects_rows
    }

    pub fn is_many(&self) -> bool {
        self.many
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

fn returns_rows(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    keyword.eq_ignore_ascii_case("SELECT") || keyword.eq_ignore_ascii_case("SHOW")
}

/// Outcome of a statement run for its effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub affected_rows: u64,
    /// Id generated by the last insert, when the backend reports one.
    pub last_insert_id: Option<i64>,
}

impl ExecResult {
    pub fn new(affected_rows: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            affected_rows,
            last_insert_id,
        }
    }
}
