use super::context::RenderContext;
use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use std::borrow::Cow;
use std::fmt;

/// Anything that can write itself into a [`RenderContext`].
///
/// Nodes append literal text and placeholders and recurse into their children.
/// They never hold on to the context.
pub trait Node: fmt::Debug + Send + Sync {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()>;
}

impl<T: Node + ?Sized> Node for &T {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        (**self).render(ctx)
    }
}

impl<T: Node + ?Sized> Node for Box<T> {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        (**self).render(ctx)
    }
}

/// Literal SQL text, emitted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal(pub Cow<'static, str>);

impl Literal {
    pub fn new(sql: impl Into<Cow<'static, str>>) -> Self {
        Self(sql.into())
    }
}

impl Node for Literal {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        ctx.literal(&self.0);
        Ok(())
    }
}

/// One bound value.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder(pub Value);

impl Node for Placeholder {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        ctx.bind(self.0.clone());
        Ok(())
    }
}

/// A table or column name, validated and quoted for the dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier(pub String);

impl Node for Identifier {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        ctx.ident(&self.0)?;
        Ok(())
    }
}

/// Children separated by `, `.
#[derive(Debug, Clone)]
pub struct CommaList<N>(pub Vec<N>);

impl<N: Node> Node for CommaList<N> {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                ctx.literal(", ");
            }
            item.render(ctx)?;
        }
        Ok(())
    }
}

/// Children separated by `, ` inside parentheses.
#[derive(Debug, Clone)]
pub struct EnclosedList<N>(pub Vec<N>);

impl<N: Node> Node for EnclosedList<N> {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        ctx.parens(|ctx| {
            for (i, item) in self.0.iter().enumerate() {
                if i > 0 {
                    ctx.literal(", ");
                }
                item.render(ctx)?;
            }
            Ok(())
        })
    }
}

/// Caller-written SQL with `?` marking each parameter.
///
/// Each `?` outside a single-quoted string becomes a placeholder in the
/// dialect's syntax. The number of markers must match the number of values.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSql {
    pub sql: String,
    pub params: Vec<Value>,
}

impl RawSql {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl Node for RawSql {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        let mut params = self.params.iter();
        let mut text = String::new();
        let mut in_string = false;
        for ch in self.sql.chars() {
            match ch {
                '\'' => {
                    in_string = !in_string;
                    text.push(ch);
                }
                '?' if !in_string => {
                    let value = params.next().ok_or_else(|| {
                        OrmError::usage(format!(
                            "raw sql has more placeholders than the {} values given",
                            self.params.len()
                        ))
                    })?;
                    ctx.literal(&text);
                    text.clear();
                    ctx.bind(value.clone());
                }
                _ => text.push(ch),
            }
        }
        ctx.literal(&text);
        if params.next().is_some() {
            return Err(OrmError::usage(format!(
                "raw sql has fewer placeholders than the {} values given",
                self.params.len()
            )));
        }
        Ok(())
    }
}
