//! Safe SQL identifier handling.
//!
//! [`Ident`] represents a table or column name, supporting dotted notation and
//! quoted parts. Identifiers are never bound as parameters, so every name that
//! reaches the SQL text goes through [`Ident::parse`] first.
//!
//! - Unquoted parts are validated against: `[A-Za-z_][A-Za-z0-9_$]*` (or `*`
//!   as the final part, for `table.*`)
//! - Quoted parts (`"name"` or `` `name` ``) allow any characters except NUL
//!
//! Quoted parts are re-quoted with the active [`Dialect`]'s quote character.
//! Unquoted parts that are reserved words (`order`, `key`, `group`, ...) are
//! quoted too; on Postgres they are folded to lower case first so they name
//! the same column the unquoted spelling would.

use crate::error::{OrmError, OrmResult};
use crate::sql::Dialect;

/// Words reserved by MySQL or Postgres that commonly turn up as names.
/// Sorted for binary search.
const RESERVED: &[&str] = &[
    "all", "alter", "and", "any", "as", "asc", "between", "both", "by", "case", "check",
    "collate", "column", "constraint", "create", "cross", "current_date", "current_time",
    "current_timestamp", "current_user", "default", "delete", "desc", "distinct", "drop",
    "else", "end", "except", "exists", "false", "fetch", "for", "foreign", "from", "grant",
    "group", "having", "in", "index", "inner", "insert", "intersect", "interval", "into", "is",
    "join", "key", "leading", "left", "like", "limit", "natural", "not", "null", "offset", "on",
    "or", "order", "outer", "primary", "references", "right", "select", "set", "table", "then",
    "to", "trailing", "true", "union", "unique", "update", "user", "using", "values", "when",
    "where", "with",
];

/// Whether `name` must be quoted to be used as an identifier.
pub fn is_reserved(name: &str) -> bool {
    RESERVED
        .binary_search(&name.to_ascii_lowercase().as_str())
        .is_ok()
}

fn write_quoted(out: &mut String, name: &str, quote: char) {
    out.push(quote);
    for ch in name.chars() {
        if ch == quote {
            out.push(quote);
        }
        out.push(ch);
    }
    out.push(quote);
}

/// A part of a SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentPart {
    /// Unquoted identifier: must match `[A-Za-z_][A-Za-z0-9_$]*`.
    Unquoted(String),
    /// Quoted identifier: allows any characters except NUL.
    Quoted(String),
    /// `*` wildcard (last part only).
    Star,
}

/// A SQL identifier (column, table, or schema name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub parts: Vec<IdentPart>,
}

impl Ident {
    /// Parse an identifier string, supporting dotted and quoted forms.
    ///
    /// - Dotted: `schema.table.column`
    /// - Quoted: `"CamelCase"."UserTable"` or `` `order` ``
    /// - Wildcard: `users.*`
    pub fn parse(s: &str) -> OrmResult<Self> {
        if s.is_empty() {
            return Err(OrmError::usage("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(OrmError::usage("Identifier cannot contain NUL character"));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            if !parts.is_empty() {
                if matches!(parts.last(), Some(IdentPart::Star)) {
                    return Err(OrmError::usage("'*' must be the last identifier part"));
                }
                match chars.next() {
                    Some('.') => {
                        if chars.peek().is_none() {
                            return Err(OrmError::usage("Trailing '.' in identifier"));
                        }
                    }
                    Some(c) => {
                        return Err(OrmError::usage(format!(
                            "Expected '.' between identifier parts, got '{c}'"
                        )));
                    }
                    None => break,
                }
            }

            if chars.peek() == Some(&'*') {
                chars.next();
                parts.push(IdentPart::Star);
                continue;
            }

            if let Some(&quote) = chars.peek().filter(|c| **c == '"' || **c == '`') {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => {
                            // doubled quote is an escaped quote
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                name.push(quote);
                            } else {
                                break;
                            }
                        }
                        Some(c) => name.push(c),
                        None => return Err(OrmError::usage("Unclosed quoted identifier")),
                    }
                }
                if name.is_empty() {
                    return Err(OrmError::usage("Empty quoted identifier"));
                }
                parts.push(IdentPart::Quoted(name));
                continue;
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let valid = if name.is_empty() {
                    c == '_' || c.is_ascii_alphabetic()
                } else {
                    c == '_' || c == '$' || c.is_ascii_alphanumeric()
                };
                if !valid {
                    return Err(OrmError::usage(format!(
                        "Invalid character in identifier {s:?}: '{c}'"
                    )));
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(OrmError::usage("Empty identifier segment"));
            }
            parts.push(IdentPart::Unquoted(name));
        }

        Ok(Self { parts })
    }

    /// The last part's name (`users.id` -> `id`), `*` for wildcards.
    pub fn name(&self) -> &str {
        match self.parts.last() {
            Some(IdentPart::Unquoted(s)) | Some(IdentPart::Quoted(s)) => s,
            Some(IdentPart::Star) | None => "*",
        }
    }

    /// Render the identifier as SQL for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut out = String::new();
        self.write_sql(&mut out, dialect);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String, dialect: Dialect) {
        let quote = dialect.quote_char();
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                IdentPart::Unquoted(s) if is_reserved(s) => match dialect {
                    Dialect::Postgres => write_quoted(out, &s.to_ascii_lowercase(), quote),
                    Dialect::MySql => write_quoted(out, s, quote),
                },
                IdentPart::Unquoted(s) => out.push_str(s),
                IdentPart::Star => out.push('*'),
                IdentPart::Quoted(s) => write_quoted(out, s, quote),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_simple() {
        let ident = Ident::parse("users").unwrap();
        assert_eq!(ident.to_sql(Dialect::MySql), "users");
    }

    #[test]
    fn ident_dotted() {
        let ident = Ident::parse("public.users").unwrap();
        assert_eq!(ident.to_sql(Dialect::Postgres), "public.users");
        assert_eq!(ident.name(), "users");
    }

    #[test]
    fn ident_quoted_follows_dialect() {
        let ident = Ident::parse(r#""CamelCase""#).unwrap();
        assert_eq!(ident.to_sql(Dialect::Postgres), r#""CamelCase""#);
        assert_eq!(ident.to_sql(Dialect::MySql), "`CamelCase`");
    }

    #[test]
    fn ident_backtick_with_escape() {
        let ident = Ident::parse("`has``tick`").unwrap();
        assert_eq!(ident.to_sql(Dialect::MySql), "`has``tick`");
    }

    #[test]
    fn ident_reserved_words_are_quoted() {
        let ident = Ident::parse("order").unwrap();
        assert_eq!(ident.to_sql(Dialect::MySql), "`order`");
        assert_eq!(ident.to_sql(Dialect::Postgres), r#""order""#);

        let ident = Ident::parse("settings.Key").unwrap();
        assert_eq!(ident.to_sql(Dialect::MySql), "settings.`Key`");
        assert_eq!(ident.to_sql(Dialect::Postgres), r#"settings."key""#);

        assert_eq!(Ident::parse("orders").unwrap().to_sql(Dialect::MySql), "orders");
        assert_eq!(Ident::parse("group_id").unwrap().to_sql(Dialect::MySql), "group_id");
    }

    #[test]
    fn reserved_list_is_sorted() {
        assert!(RESERVED.windows(2).all(|w| w[0] < w[1]));
        assert!(is_reserved("GROUP"));
        assert!(!is_reserved("name"));
    }

    #[test]
    fn ident_wildcard() {
        let ident = Ident::parse("users.*").unwrap();
        assert_eq!(ident.to_sql(Dialect::MySql), "users.*");
        assert!(Ident::parse("*.users").is_err());
    }

    #[test]
    fn ident_rejects_injection() {
        assert!(Ident::parse("users; DROP TABLE users").is_err());
        assert!(Ident::parse("1table").is_err());
        assert!(Ident::parse("schema..table").is_err());
        assert!(Ident::parse("schema.").is_err());
        assert!(Ident::parse(r#""unclosed"#).is_err());
    }
}
