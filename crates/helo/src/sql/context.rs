use super::node::Node;
use super::query::Query;
use super::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::value::Value;
use std::collections::BTreeMap;

/// A piece of rendered SQL: either literal text or one placeholder.
///
/// Placeholder numbering (`$1, $2, ...`) is deferred until [`RenderContext::finish`],
/// so fragments can be spliced without rewriting any text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlPart {
    Text(String),
    Param,
}

/// Properties that hold for one scoped sub-render.
///
/// `parens` applies to the scope it is set on only; the other flags are
/// inherited by nested scopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scope {
    /// Wrap the sub-render in `(` ... `)`.
    pub parens: bool,
    /// Rendering a row of a `VALUES` clause (`DEFAULT` is allowed here only).
    pub in_values: bool,
    /// Qualify column references with their table name (joined selects).
    pub qualify: bool,
}

impl Scope {
    pub fn parens() -> Self {
        Self {
            parens: true,
            ..Self::default()
        }
    }

    pub fn values() -> Self {
        Self {
            in_values: true,
            ..Self::default()
        }
    }

    pub fn qualified() -> Self {
        Self {
            qualify: true,
            ..Self::default()
        }
    }
}

/// Caller-visible select aliases, `alias -> source column`.
///
/// Produced per render and handed to row decoding so that the names the
/// backend reports can be mapped back to field names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    entries: BTreeMap<String, String>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Source name for a column the backend returned, or the name itself.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.entries.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries.get(alias).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(a, s)| (a.as_str(), s.as_str()))
    }

    fn insert(&mut self, alias: &str, source: &str) -> OrmResult<()> {
        if self.entries.contains_key(alias) {
            return Err(OrmError::usage(format!("ambiguous alias: {alias}")));
        }
        self.entries.insert(alias.to_string(), source.to_string());
        Ok(())
    }
}

/// A finished render pass: the query plus the alias map copied out of the context.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub query: Query,
    pub aliases: AliasMap,
}

/// Accumulating renderer for one statement.
///
/// Owned by exactly one render pass. Literal text and placeholders are appended
/// in order; every placeholder is pushed together with its value so that the
/// parameter list always matches the textual order of the placeholders.
#[derive(Debug)]
pub struct RenderContext {
    dialect: Dialect,
    parts: Vec<SqlPart>,
    params: Vec<Value>,
    stack: Vec<Scope>,
    aliases: AliasMap,
}

impl RenderContext {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            parts: Vec::new(),
            params: Vec::new(),
            stack: vec![Scope::default()],
            aliases: AliasMap::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn current(&self) -> Scope {
        self.stack.last().copied().unwrap_or_default()
    }

    pub fn in_values(&self) -> bool {
        self.current().in_values
    }

    pub fn qualify(&self) -> bool {
        self.current().qualify
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Append literal SQL text.
    pub fn literal(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }
        match self.parts.last_mut() {
            Some(SqlPart::Text(last)) => last.push_str(sql),
            _ => self.parts.push(SqlPart::Text(sql.to_string())),
        }
        self
    }

    /// Append one placeholder and bind its value in the same step.
    pub fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.parts.push(SqlPart::Param);
        self.params.push(value.into());
        self
    }

    /// Append a validated identifier.
    pub fn ident(&mut self, name: &str) -> OrmResult<&mut Self> {
        let ident = Ident::parse(name)?;
        let mut s = String::new();
        ident.write_sql(&mut s, self.dialect);
        Ok(self.literal(&s))
    }

    /// Render a child node into this context.
    pub fn sql(&mut self, node: &(impl Node + ?Sized)) -> OrmResult<&mut Self> {
        node.render(self)?;
        Ok(self)
    }

    /// Run `f` inside a scope.
    ///
    /// When the scope asks for parentheses, `(` is emitted on entry and `)` on
    /// exit, whether or not `f` succeeds. The scope is always popped.
    pub fn scope<F>(&mut self, scope: Scope, f: F) -> OrmResult<()>
    where
        F: FnOnce(&mut Self) -> OrmResult<()>,
    {
        let parent = self.current();
        self.stack.push(Scope {
            parens: scope.parens,
            in_values: scope.in_values || parent.in_values,
            qualify: scope.qualify || parent.qualify,
        });
        if scope.parens {
            self.literal("(");
        }
        let result = f(self);
        if scope.parens {
            self.literal(")");
        }
        self.stack.pop();
        result
    }

    /// Shorthand for a parenthesized scope.
    pub fn parens<F>(&mut self, f: F) -> OrmResult<()>
    where
        F: FnOnce(&mut Self) -> OrmResult<()>,
    {
        self.scope(Scope::parens(), f)
    }

    /// Record a caller-visible alias. Using the same alias twice is an error.
    pub fn alias(&mut self, alias: &str, source: &str) -> OrmResult<()> {
        self.aliases.insert(alias, source)
    }

    /// Render a nested statement. Aliases it records belong to its own
    /// result columns and are dropped once it is rendered.
    pub fn subquery<F>(&mut self, f: F) -> OrmResult<()>
    where
        F: FnOnce(&mut Self) -> OrmResult<()>,
    {
        let outer = std::mem::take(&mut self.aliases);
        let result = f(self);
        self.aliases = outer;
        result
    }

    /// A fresh context sharing this one's dialect and inherited flags, used to
    /// render a sub-expression on its own before splicing it back.
    pub fn fragment(&self) -> RenderContext {
        let current = self.current();
        RenderContext {
            dialect: self.dialect,
            parts: Vec::new(),
            params: Vec::new(),
            stack: vec![Scope {
                parens: false,
                ..current
            }],
            aliases: AliasMap::new(),
        }
    }

    /// Append a rendered fragment. Its parameters follow every parameter
    /// already emitted, which matches the fragment's textual position.
    pub fn splice(&mut self, fragment: RenderContext) -> OrmResult<&mut Self> {
        for part in fragment.parts {
            match part {
                SqlPart::Text(text) => {
                    self.literal(&text);
                }
                SqlPart::Param => self.parts.push(SqlPart::Param),
            }
        }
        self.params.extend(fragment.params);
        for (alias, source) in fragment.aliases.entries {
            self.aliases.insert(&alias, &source)?;
        }
        Ok(self)
    }

    /// Text rendered so far with placeholders numbered for the dialect.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        let mut idx = 0usize;
        for part in &self.parts {
            match part {
                SqlPart::Text(text) => out.push_str(text),
                SqlPart::Param => {
                    idx += 1;
                    self.dialect.write_placeholder(&mut out, idx);
                }
            }
        }
        out
    }

    /// Finish the pass, producing the query and the alias map.
    pub fn finish(self, expects_rows: bool) -> Rendered {
        let sql = self.to_sql();
        Rendered {
            query: Query::with_params(sql, self.params).returning_rows(expects_rows),
            aliases: self.aliases,
        }
    }
}
