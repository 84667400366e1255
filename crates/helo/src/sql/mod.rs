//! SQL rendering core: the node protocol, the render context and the
//! finished [`Query`].
//!
//! Every clause, expression and statement implements [`Node`]. Rendering walks
//! the tree through a single [`RenderContext`], which keeps literal text and
//! placeholders as separate parts and only numbers placeholders once the pass
//! is finished.

mod context;
mod node;
mod query;

pub use context::{AliasMap, RenderContext, Rendered, Scope};
pub use node::{CommaList, EnclosedList, Identifier, Literal, Node, Placeholder, RawSql};
pub use query::{ExecResult, Query};

use crate::error::{OrmError, OrmResult};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

/// Target SQL dialect.
///
/// The dialect decides placeholder syntax, identifier quoting and the shape of
/// the few statements that differ between servers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `?` placeholders, backtick quoting, `REPLACE INTO`, `SHOW ...`.
    #[default]
    MySql,
    /// `$1..$n` placeholders, double-quote quoting, `ON CONFLICT` upserts.
    Postgres,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        }
    }

    /// Character used to quote identifiers.
    pub fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres => '"',
        }
    }

    /// Guess the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split_once("://").map(|(s, _)| s)?;
        scheme.parse().ok()
    }

    pub(crate) fn write_placeholder(self, out: &mut String, index: usize) {
        match self {
            Dialect::MySql => out.push('?'),
            Dialect::Postgres => {
                let _ = write!(out, "${index}");
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = OrmError;

    fn from_str(s: &str) -> OrmResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            other => Err(OrmError::usage(format!("unknown dialect: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests;
