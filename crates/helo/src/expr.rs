//! Expression tree for WHERE/HAVING/ON conditions, select columns and
//! update values.
//!
//! Expressions are plain values: combinators build new trees and never mutate
//! their inputs. Rendering goes through [`Node`], so every literal value
//! becomes a placeholder and every name goes through identifier validation.
//!
//! Parentheses are derived from operator precedence: a child is wrapped only
//! when it binds looser than its parent, or equally on the right-hand side.
//! `and_`/`or_` fold their inputs left to right, so `a AND b AND c` renders
//! without parentheses and the tree is never re-associated.

use crate::builder::Select;
use crate::error::{OrmError, OrmResult};
use crate::sql::{Dialect, Node, RawSql, RenderContext};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::ops;
use uuid::Uuid;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    IsNot,
    In,
    NotIn,
    /// Case-insensitive pattern match.
    Like,
    /// Case-sensitive pattern match.
    LikeBinary,
    /// Case-insensitive regular expression match.
    Regexp,
    /// Case-sensitive regular expression match.
    RegexpBinary,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Concat,
}

impl Op {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Op::Or => 1,
            Op::And => 2,
            Op::Eq
            | Op::Ne
            | Op::Lt
            | Op::Le
            | Op::Gt
            | Op::Ge
            | Op::Is
            | Op::IsNot
            | Op::In
            | Op::NotIn
            | Op::Like
            | Op::LikeBinary
            | Op::Regexp
            | Op::RegexpBinary => 4,
            Op::BitOr => 5,
            Op::BitAnd | Op::BitXor => 6,
            Op::Add | Op::Sub | Op::Concat => 7,
            Op::Mul | Op::Div | Op::Mod => 8,
        }
    }

    /// Comparisons do not chain: `(a = b) = c` keeps its parentheses on both sides.
    pub fn is_comparison(self) -> bool {
        self.precedence() == 4
    }

    fn keyword(self, dialect: Dialect) -> &'static str {
        match (self, dialect) {
            (Op::And, _) => "AND",
            (Op::Or, _) => "OR",
            (Op::Eq, _) => "=",
            (Op::Ne, _) => "!=",
            (Op::Lt, _) => "<",
            (Op::Le, _) => "<=",
            (Op::Gt, _) => ">",
            (Op::Ge, _) => ">=",
            (Op::Is, _) => "IS",
            (Op::IsNot, _) => "IS NOT",
            (Op::In, _) => "IN",
            (Op::NotIn, _) => "NOT IN",
            (Op::Like, Dialect::MySql) => "LIKE",
            (Op::Like, Dialect::Postgres) => "ILIKE",
            (Op::LikeBinary, Dialect::MySql) => "LIKE BINARY",
            (Op::LikeBinary, Dialect::Postgres) => "LIKE",
            (Op::Regexp, Dialect::MySql) => "REGEXP",
            (Op::Regexp, Dialect::Postgres) => "~*",
            (Op::RegexpBinary, Dialect::MySql) => "REGEXP BINARY",
            (Op::RegexpBinary, Dialect::Postgres) => "~",
            (Op::Add, _) => "+",
            (Op::Sub, _) => "-",
            (Op::Mul, _) => "*",
            (Op::Div, _) => "/",
            (Op::Mod, _) => "%",
            (Op::BitAnd, _) => "&",
            (Op::BitOr, _) => "|",
            (Op::BitXor, Dialect::MySql) => "^",
            (Op::BitXor, Dialect::Postgres) => "#",
            (Op::Concat, _) => "||",
        }
    }
}

/// A reference to a column, optionally owned by a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    pub fn of(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }
}

impl Node for ColumnRef {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        if let Some(table) = self.table.as_deref().filter(|_| ctx.qualify()) {
            ctx.ident(table)?.literal(".");
        }
        ctx.ident(&self.name)?;
        Ok(())
    }
}

/// Expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    Column(ColumnRef),
    /// A bound value. `NULL` renders as the keyword, never as a placeholder.
    Value(Value),
    /// `*`
    Star,
    /// The `DEFAULT` keyword, valid inside a `VALUES` row only.
    Default,
    /// Caller-written SQL with `?` markers.
    Raw(RawSql),
    /// Parenthesized list, the right-hand side of `IN`.
    List(Vec<Expr>),
    Subquery(Box<Select>),
    Binary {
        lhs: Box<Expr>,
        op: Op,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Exists {
        query: Box<Select>,
        negated: bool,
    },
    Func {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    Alias {
        expr: Box<Expr>,
        alias: String,
    },
}

const NOT_PRECEDENCE: u8 = 3;
const ATOM_PRECEDENCE: u8 = u8::MAX;

/// Column reference without a table.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(ColumnRef::new(name))
}

/// A bound value.
pub fn val(value: impl Into<Value>) -> Expr {
    Expr::Value(value.into())
}

/// Raw SQL with `?` markers for `params`.
pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Expr {
    Expr::Raw(RawSql::new(sql, params))
}

/// Fold expressions with `AND`. An empty input is always true.
pub fn and_(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    fold(exprs, Op::And).unwrap_or_else(|| raw("1=1", Vec::new()))
}

/// Fold expressions with `OR`. An empty input is always false.
pub fn or_(exprs: impl IntoIterator<Item = Expr>) -> Expr {
    fold(exprs, Op::Or).unwrap_or_else(|| raw("1=0", Vec::new()))
}

fn fold(exprs: impl IntoIterator<Item = Expr>, op: Op) -> Option<Expr> {
    exprs
        .into_iter()
        .reduce(|lhs, rhs| Expr::binary(lhs, op, rhs))
}

pub fn exists(query: Select) -> Expr {
    Expr::Exists {
        query: Box::new(query),
        negated: false,
    }
}

pub fn not_exists(query: Select) -> Expr {
    Expr::Exists {
        query: Box::new(query),
        negated: true,
    }
}

/// Any named SQL function.
pub fn func(name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Func {
        name: name.into(),
        args: args.into_iter().collect(),
        distinct: false,
    }
}

/// `COUNT(1)`
pub fn count_all() -> Expr {
    func("COUNT", [raw("1", Vec::new())])
}

pub fn count(expr: impl IntoExpr) -> Expr {
    func("COUNT", [expr.into_expr()])
}

pub fn count_distinct(expr: impl IntoExpr) -> Expr {
    Expr::Func {
        name: "COUNT".into(),
        args: vec![expr.into_expr()],
        distinct: true,
    }
}

pub fn sum(expr: impl IntoExpr) -> Expr {
    func("SUM", [expr.into_expr()])
}

pub fn max(expr: impl IntoExpr) -> Expr {
    func("MAX", [expr.into_expr()])
}

pub fn min(expr: impl IntoExpr) -> Expr {
    func("MIN", [expr.into_expr()])
}

pub fn avg(expr: impl IntoExpr) -> Expr {
    func("AVG", [expr.into_expr()])
}

impl Expr {
    pub fn binary(lhs: impl IntoExpr, op: Op, rhs: impl IntoExpr) -> Self {
        Expr::Binary {
            lhs: Box::new(lhs.into_expr()),
            op,
            rhs: Box::new(rhs.into_expr()),
        }
    }

    /// `= rhs`, or `IS NULL` when `rhs` is null.
    pub fn eq(self, rhs: impl IntoExpr) -> Self {
        let rhs = rhs.into_expr();
        let op = if rhs.is_null() { Op::Is } else { Op::Eq };
        Self::binary(self, op, rhs)
    }

    /// `!= rhs`, or `IS NOT NULL` when `rhs` is null.
    pub fn ne(self, rhs: impl IntoExpr) -> Self {
        let rhs = rhs.into_expr();
        let op = if rhs.is_null() { Op::IsNot } else { Op::Ne };
        Self::binary(self, op, rhs)
    }

    pub fn lt(self, rhs: impl IntoExpr) -> Self {
        Self::binary(self, Op::Lt, rhs)
    }

    pub fn le(self, rhs: impl IntoExpr) -> Self {
        Self::binary(self, Op::Le, rhs)
    }

    pub fn gt(self, rhs: impl IntoExpr) -> Self {
        Self::binary(self, Op::Gt, rhs)
    }

    pub fn ge(self, rhs: impl IntoExpr) -> Self {
        Self::binary(self, Op::Ge, rhs)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Expr::Value(Value::Null))
    }

    pub fn null(self) -> Self {
        Self::binary(self, Op::Is, Value::Null)
    }

    pub fn not_null(self) -> Self {
        Self::binary(self, Op::IsNot, Value::Null)
    }

    /// `IN (...)`. An empty list never matches.
    pub fn in_<I, T>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoExpr,
    {
        let list = values.into_iter().map(IntoExpr::into_expr).collect();
        Self::binary(self, Op::In, Expr::List(list))
    }

    /// `NOT IN (...)`. An empty list always matches.
    pub fn not_in<I, T>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: IntoExpr,
    {
        let list = values.into_iter().map(IntoExpr::into_expr).collect();
        Self::binary(self, Op::NotIn, Expr::List(list))
    }

    pub fn in_query(self, query: Select) -> Self {
        Self::binary(self, Op::In, Expr::Subquery(Box::new(query)))
    }

    pub fn not_in_query(self, query: Select) -> Self {
        Self::binary(self, Op::NotIn, Expr::Subquery(Box::new(query)))
    }

    pub fn like(self, pattern: impl IntoExpr) -> Self {
        Self::binary(self, Op::Like, pattern)
    }

    pub fn like_binary(self, pattern: impl IntoExpr) -> Self {
        Self::binary(self, Op::LikeBinary, pattern)
    }

    pub fn contains(self, needle: &str) -> Self {
        self.like(format!("%{needle}%"))
    }

    pub fn startswith(self, prefix: &str) -> Self {
        self.like(format!("{prefix}%"))
    }

    pub fn endswith(self, suffix: &str) -> Self {
        self.like(format!("%{suffix}"))
    }

    pub fn regexp(self, pattern: impl IntoExpr) -> Self {
        Self::binary(self, Op::Regexp, pattern)
    }

    pub fn regexp_binary(self, pattern: impl IntoExpr) -> Self {
        Self::binary(self, Op::RegexpBinary, pattern)
    }

    pub fn between(self, low: impl IntoExpr, high: impl IntoExpr) -> Self {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into_expr()),
            high: Box::new(high.into_expr()),
            negated: false,
        }
    }

    pub fn not_between(self, low: impl IntoExpr, high: impl IntoExpr) -> Self {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into_expr()),
            high: Box::new(high.into_expr()),
            negated: true,
        }
    }

    pub fn and(self, rhs: impl IntoExpr) -> Self {
        Self::binary(self, Op::And, rhs)
    }

    pub fn or(self, rhs: impl IntoExpr) -> Self {
        Self::binary(self, Op::Or, rhs)
    }

    pub fn bit_and(self, rhs: impl IntoExpr) -> Self {
        Self::binary(self, Op::BitAnd, rhs)
    }

    pub fn bit_or(self, rhs: impl IntoExpr) -> Self {
        Self::binary(self, Op::BitOr, rhs)
    }

    pub fn bit_xor(self, rhs: impl IntoExpr) -> Self {
        Self::binary(self, Op::BitXor, rhs)
    }

    /// String concatenation (`||`, or `CONCAT(a, b)` on MySQL).
    pub fn concat(self, rhs: impl IntoExpr) -> Self {
        Self::binary(self, Op::Concat, rhs)
    }

    /// `expr AS alias`; the alias is recorded for row decoding.
    pub fn as_(self, alias: impl Into<String>) -> Self {
        Expr::Alias {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    pub fn asc(self) -> Ordering {
        Ordering {
            expr: self,
            direction: Some(Direction::Asc),
        }
    }

    pub fn desc(self) -> Ordering {
        Ordering {
            expr: self,
            direction: Some(Direction::Desc),
        }
    }

    /// Name a select column resolves to in a result row, if it has one.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Expr::Column(c) => Some(c.name.rsplit('.').next().unwrap_or(&c.name)),
            Expr::Alias { alias, .. } => Some(alias),
            _ => None,
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Not(_) => NOT_PRECEDENCE,
            Expr::Between { .. } => Op::Eq.precedence(),
            // unknown contents, always wrapped when nested
            Expr::Raw(_) | Expr::Alias { .. } => 0,
            _ => ATOM_PRECEDENCE,
        }
    }

    fn render_operand(&self, ctx: &mut RenderContext, parens: bool) -> OrmResult<()> {
        if parens {
            ctx.parens(|ctx| self.render(ctx))
        } else {
            self.render(ctx)
        }
    }

    fn render_binary(&self, ctx: &mut RenderContext, lhs: &Expr, op: Op, rhs: &Expr) -> OrmResult<()> {
        if let Expr::List(items) = rhs {
            if items.is_empty() {
                match op {
                    Op::In => {
                        ctx.literal("1=0");
                        return Ok(());
                    }
                    Op::NotIn => {
                        ctx.literal("1=1");
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }

        let prec = op.precedence();
        let lhs_parens = lhs.precedence() < prec || (lhs.precedence() == prec && op.is_comparison());
        let rhs_parens = rhs.precedence() <= prec && !matches!(rhs, Expr::List(_));

        if op == Op::Concat && ctx.dialect() == Dialect::MySql {
            ctx.literal("CONCAT(");
            lhs.render(ctx)?;
            ctx.literal(", ");
            rhs.render(ctx)?;
            ctx.literal(")");
            return Ok(());
        }

        lhs.render_operand(ctx, lhs_parens)?;
        let keyword = op.keyword(ctx.dialect());
        ctx.literal(" ").literal(keyword).literal(" ");
        rhs.render_operand(ctx, rhs_parens)
    }
}

impl Node for Expr {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        match self {
            Expr::Column(column) => column.render(ctx),
            Expr::Value(Value::Null) => {
                ctx.literal("NULL");
                Ok(())
            }
            Expr::Value(value) => {
                ctx.bind(value.clone());
                Ok(())
            }
            Expr::Star => {
                ctx.literal("*");
                Ok(())
            }
            Expr::Default => {
                if !ctx.in_values() {
                    return Err(OrmError::usage("DEFAULT is only allowed inside VALUES"));
                }
                ctx.literal("DEFAULT");
                Ok(())
            }
            Expr::Raw(raw) => raw.render(ctx),
            Expr::List(items) => ctx.parens(|ctx| {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        ctx.literal(", ");
                    }
                    item.render(ctx)?;
                }
                Ok(())
            }),
            Expr::Subquery(query) => {
                ctx.parens(|ctx| ctx.subquery(|ctx| query.render(ctx)))
            }
            Expr::Binary { lhs, op, rhs } => self.render_binary(ctx, lhs, *op, rhs),
            Expr::Not(inner) => {
                ctx.literal("NOT ");
                inner.render_operand(ctx, inner.precedence() < NOT_PRECEDENCE)
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let prec = Op::Eq.precedence();
                expr.render_operand(ctx, expr.precedence() <= prec)?;
                ctx.literal(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                low.render_operand(ctx, low.precedence() <= prec)?;
                ctx.literal(" AND ");
                high.render_operand(ctx, high.precedence() <= prec)
            }
            Expr::Exists { query, negated } => {
                ctx.literal(if *negated { "NOT EXISTS " } else { "EXISTS " });
                ctx.parens(|ctx| ctx.subquery(|ctx| query.render(ctx)))
            }
            Expr::Func {
                name,
                args,
                distinct,
            } => {
                if name.is_empty() || !name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric()) {
                    return Err(OrmError::usage(format!("invalid function name: {name:?}")));
                }
                ctx.literal(&name.to_ascii_uppercase()).literal("(");
                if *distinct {
                    ctx.literal("DISTINCT ");
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        ctx.literal(", ");
                    }
                    arg.render(ctx)?;
                }
                ctx.literal(")");
                Ok(())
            }
            Expr::Alias { expr, alias } => {
                expr.render(ctx)?;
                ctx.literal(" AS ").ident(alias)?;
                let source = match expr.as_ref() {
                    Expr::Column(c) => c.name.as_str(),
                    _ => alias.as_str(),
                };
                ctx.alias(alias, source)
            }
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// An `ORDER BY` item.
#[derive(Debug, Clone)]
pub struct Ordering {
    pub expr: Expr,
    pub direction: Option<Direction>,
}

impl From<Expr> for Ordering {
    fn from(expr: Expr) -> Self {
        Self {
            expr,
            direction: None,
        }
    }
}

impl From<&str> for Ordering {
    fn from(name: &str) -> Self {
        col(name).into()
    }
}

impl Node for Ordering {
    fn render(&self, ctx: &mut RenderContext) -> OrmResult<()> {
        self.expr.render(ctx)?;
        ctx.literal(match self.direction {
            Some(Direction::Asc) => " ASC",
            Some(Direction::Desc) => " DESC",
            None => "",
        });
        Ok(())
    }
}

/// Conversion into an expression operand.
///
/// Plain Rust values become bound values; [`Expr`] passes through and a
/// [`Select`] becomes a subquery.
pub trait IntoExpr {
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl IntoExpr for ColumnRef {
    fn into_expr(self) -> Expr {
        Expr::Column(self)
    }
}

impl IntoExpr for Select {
    fn into_expr(self) -> Expr {
        Expr::Subquery(Box::new(self))
    }
}

impl IntoExpr for Value {
    fn into_expr(self) -> Expr {
        Expr::Value(self)
    }
}

macro_rules! impl_into_expr_value {
    ($($t:ty),* $(,)?) => {
        $(impl IntoExpr for $t {
            fn into_expr(self) -> Expr {
                Expr::Value(Value::from(self))
            }
        })*
    };
}

impl_into_expr_value!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    &str,
    String,
    &String,
    Vec<u8>,
    serde_json::Value,
    NaiveDateTime,
    DateTime<Utc>,
    NaiveDate,
    Uuid,
);

impl<T: Into<Value>> IntoExpr for Option<T> {
    fn into_expr(self) -> Expr {
        Expr::Value(self.map_or(Value::Null, Into::into))
    }
}

impl<R: IntoExpr> ops::BitAnd<R> for Expr {
    type Output = Expr;

    fn bitand(self, rhs: R) -> Expr {
        self.and(rhs)
    }
}

impl<R: IntoExpr> ops::BitOr<R> for Expr {
    type Output = Expr;

    fn bitor(self, rhs: R) -> Expr {
        self.or(rhs)
    }
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

macro_rules! impl_arith {
    ($($trait:ident :: $method:ident => $op:expr),* $(,)?) => {
        $(impl<R: IntoExpr> ops::$trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::binary(self, $op, rhs)
            }
        })*
    };
}

impl_arith!(
    Add::add => Op::Add,
    Sub::sub => Op::Sub,
    Mul::mul => Op::Mul,
    Div::div => Op::Div,
    Rem::rem => Op::Mod,
);
