//! Translation of [`Expression`] trees into SQL over the `documents` table.
//!
//! Each comparison becomes a `jsonb_path_exists` call. Lax-mode jsonpath
//! unwraps arrays along the path, which gives the same fan-out the
//! in-memory matcher applies.

use serde_json::json;
use sqlx::{Postgres, QueryBuilder, types::Json};

use crate::storage::expression::{Comparison, Expression, ID_FIELD, split_path};

fn operator(op: Comparison) -> &'static str {
    match op {
        Comparison::Eq => "==",
        Comparison::Gt => ">",
        Comparison::Lt => "<",
        Comparison::Gte => ">=",
        Comparison::Lte => "<=",
    }
}

fn sql_operator(op: Comparison) -> &'static str {
    match op {
        Comparison::Eq => "=",
        other => operator(other),
    }
}

/// `$."a"."b" ? (@ == $v)` for field `a.b`.
pub fn jsonpath(field: &str, op: Comparison) -> String {
    let mut path = String::from("$");
    for part in split_path(field) {
        path.push_str(".\"");
        for c in part.chars() {
            if c == '"' || c == '\\' {
                path.push('\\');
            }
            path.push(c);
        }
        path.push('"');
    }
    path.push_str(&format!(" ? (@ {} $v)", operator(op)));
    path
}

pub fn push_expression(builder: &mut QueryBuilder<'static, Postgres>, expression: &Expression) {
    match expression {
        Expression::And(children) => push_junction(builder, children, " AND ", "TRUE"),
        Expression::Or(children) => push_junction(builder, children, " OR ", "FALSE"),
        Expression::Compare { field, op, value } if field == ID_FIELD => match value.as_i64() {
            Some(id) => {
                builder.push("id ");
                builder.push(sql_operator(*op));
                builder.push(" ");
                builder.push_bind(id);
            }
            None => {
                builder.push("FALSE");
            }
        },
        Expression::Compare { field, op, value } => {
            builder.push("jsonb_path_exists(doc, ");
            builder.push_bind(jsonpath(field, *op));
            builder.push("::jsonpath, ");
            builder.push_bind(Json(json!({ "v": value })));
            builder.push(")");
        }
    }
}

fn push_junction(
    builder: &mut QueryBuilder<'static, Postgres>,
    children: &[Expression],
    separator: &str,
    empty: &str,
) {
    if children.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            builder.push(separator);
        }
        push_expression(builder, child);
    }
    builder.push(")");
}

/// Postgres text path literal (`{a,b}`) for `#>>`.
pub fn text_path(field: &str) -> String {
    let parts: Vec<String> = split_path(field)
        .into_iter()
        .map(|part| part.replace(['\'', '{', '}', ','], ""))
        .collect();
    format!("{{{}}}", parts.join(","))
}

pub fn identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_quoted_jsonpath() {
        assert_eq!(
            jsonpath("statement.actor.mbox", Comparison::Eq),
            r#"$."statement"."actor"."mbox" ? (@ == $v)"#
        );
        assert_eq!(jsonpath("storedAt", Comparison::Gte), r#"$."storedAt" ? (@ >= $v)"#);
    }

    #[test]
    fn compiles_nested_expression() {
        let mut expression = Expression::new();
        expression.where_eq("voided", false).where_or(vec![
            Expression::eq("statement.verb.id", "v"),
            Expression::eq("references.verb.id", "v"),
        ]);
        expression.where_less(ID_FIELD, 10);

        let mut builder = QueryBuilder::<Postgres>::new("SELECT id FROM documents WHERE ");
        push_expression(&mut builder, &expression);
        assert_eq!(
            builder.sql(),
            "SELECT id FROM documents WHERE (jsonb_path_exists(doc, $1::jsonpath, $2) AND \
             (jsonb_path_exists(doc, $3::jsonpath, $4) OR jsonb_path_exists(doc, $5::jsonpath, $6)) \
             AND id < $7)"
        );
    }

    #[test]
    fn empty_junctions_are_constants() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_expression(&mut builder, &Expression::or(Vec::new()));
        assert_eq!(builder.sql(), "FALSE");
    }

    #[test]
    fn index_names_and_paths_are_sanitized() {
        assert_eq!(identifier("statement.id"), "statement_id");
        assert_eq!(text_path("statement.id"), "{statement,id}");
    }
}
