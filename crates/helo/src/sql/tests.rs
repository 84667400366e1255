use super::*;
use crate::error::OrmError;
use crate::value::Value;

#[test]
fn bind_pushes_placeholder_and_value_together() {
    let mut ctx = RenderContext::new(Dialect::MySql);
    ctx.literal("SELECT * FROM users WHERE id = ").bind(1).literal(" AND name = ").bind("a");
    let rendered = ctx.finish(true);
    assert_eq!(
        rendered.query.sql(),
        "SELECT * FROM users WHERE id = ? AND name = ?"
    );
    assert_eq!(rendered.query.params(), &[Value::Int(1), Value::from("a")]);
}

#[test]
fn postgres_numbers_placeholders_at_finish() {
    let mut ctx = RenderContext::new(Dialect::Postgres);
    ctx.literal("a = ").bind(1).literal(" AND b = ").bind(2);
    assert_eq!(ctx.finish(false).query.sql(), "a = $1 AND b = $2");
}

#[test]
fn scope_emits_closing_paren_on_error() {
    let mut ctx = RenderContext::new(Dialect::MySql);
    let result = ctx.parens(|ctx| {
        ctx.literal("x");
        Err(OrmError::usage("boom"))
    });
    assert!(result.is_err());
    assert_eq!(ctx.to_sql(), "(x)");
}

#[test]
fn parens_flag_is_not_inherited() {
    let mut ctx = RenderContext::new(Dialect::MySql);
    ctx.scope(Scope::values(), |ctx| {
        assert!(ctx.in_values());
        ctx.parens(|ctx| {
            assert!(ctx.in_values());
            ctx.scope(Scope::default(), |ctx| {
                ctx.literal("v");
                Ok(())
            })
        })
    })
    .unwrap();
    assert!(!ctx.in_values());
    assert_eq!(ctx.to_sql(), "(v)");
}

#[test]
fn duplicate_alias_is_usage_error() {
    let mut ctx = RenderContext::new(Dialect::MySql);
    ctx.alias("n", "name").unwrap();
    let err = ctx.alias("n", "nickname").unwrap_err();
    assert!(err.is_usage());
    assert!(err.to_string().contains("ambiguous alias"));
}

#[test]
fn fragment_params_follow_existing_params() {
    let mut ctx = RenderContext::new(Dialect::Postgres);
    ctx.literal("SET a = ").bind("x").literal(", b = ");
    let mut frag = ctx.fragment();
    frag.literal("b + ").bind(5);
    ctx.splice(frag).unwrap();
    ctx.literal(" WHERE id = ").bind(9);

    let rendered = ctx.finish(false);
    assert_eq!(rendered.query.sql(), "SET a = $1, b = b + $2 WHERE id = $3");
    assert_eq!(
        rendered.query.params(),
        &[Value::from("x"), Value::Int(5), Value::Int(9)]
    );
}

#[test]
fn enclosed_list_wraps_in_parens() {
    let mut ctx = RenderContext::new(Dialect::MySql);
    let list = EnclosedList(vec![
        Placeholder(Value::Int(1)),
        Placeholder(Value::Int(2)),
    ]);
    ctx.sql(&list).unwrap();
    assert_eq!(ctx.to_sql(), "(?, ?)");
    assert_eq!(ctx.param_count(), 2);
}

#[test]
fn identifiers_are_quoted_for_dialect() {
    let mut ctx = RenderContext::new(Dialect::Postgres);
    let cols = CommaList(vec![
        Identifier("id".into()),
        Identifier(r#""Order""#.into()),
    ]);
    ctx.sql(&cols).unwrap();
    assert_eq!(ctx.to_sql(), r#"id, "Order""#);

    let mut ctx = RenderContext::new(Dialect::MySql);
    assert!(ctx.ident("id; DROP TABLE x").is_err());
}

#[test]
fn raw_sql_converts_markers() {
    let raw = RawSql::new("SELECT * FROM t WHERE a = ? AND b = '?'", vec![Value::Int(1)]);
    let mut ctx = RenderContext::new(Dialect::Postgres);
    ctx.sql(&raw).unwrap();
    assert_eq!(ctx.to_sql(), "SELECT * FROM t WHERE a = $1 AND b = '?'");
}

#[test]
fn raw_sql_rejects_param_count_mismatch() {
    let mut ctx = RenderContext::new(Dialect::MySql);
    assert!(ctx.sql(&RawSql::new("a = ? AND b = ?", vec![Value::Int(1)])).is_err());

    let mut ctx = RenderContext::new(Dialect::MySql);
    assert!(ctx.sql(&RawSql::new("a = 1", vec![Value::Int(1)])).is_err());
}

#[test]
fn query_infers_row_expectation() {
    assert!(Query::new("SELECT 1").expects_rows());
    assert!(Query::new("  show tables").expects_rows());
    assert!(!Query::new("UPDATE t SET a = 1").expects_rows());
    assert!(Query::new("DELETE FROM t RETURNING id").returning_rows(true).expects_rows());
}

#[test]
fn dialect_from_url_scheme() {
    assert_eq!(Dialect::from_url("mysql://u@h/db"), Some(Dialect::MySql));
    assert_eq!(Dialect::from_url("postgresql://u@h/db"), Some(Dialect::Postgres));
    assert_eq!(Dialect::from_url("host=localhost"), None);
    assert!("oracle".parse::<Dialect>().is_err());
}
