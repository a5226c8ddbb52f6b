//! Boolean filter trees evaluated by the document stores.
//!
//! Fields are dotted paths into a stored document. Path traversal fans out
//! across arrays at any depth, so `references.actor.mbox` matches when any
//! referenced statement carries that mbox. `_id` names the store-assigned key.

use serde_json::Value;
use std::cmp::Ordering;

pub const ID_FIELD: &str = "_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Compare {
        field: String,
        op: Comparison,
        value: Value,
    },
}

impl Default for Expression {
    fn default() -> Self {
        Expression::And(Vec::new())
    }
}

impl Expression {
    /// An empty conjunction, matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Compare {
            field: field.into(),
            op: Comparison::Eq,
            value: value.into(),
        }
    }

    pub fn compare(field: impl Into<String>, op: Comparison, value: impl Into<Value>) -> Self {
        Expression::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn and(children: Vec<Expression>) -> Self {
        Expression::And(children)
    }

    pub fn or(children: Vec<Expression>) -> Self {
        Expression::Or(children)
    }

    fn push(&mut self, clause: Expression) {
        match self {
            Expression::And(children) => children.push(clause),
            other => {
                let previous = std::mem::take(other);
                *other = Expression::And(vec![previous, clause]);
            }
        }
    }

    pub fn where_eq(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.push(Expression::eq(field, value));
        self
    }

    pub fn where_and(&mut self, children: Vec<Expression>) -> &mut Self {
        self.push(Expression::And(children));
        self
    }

    pub fn where_or(&mut self, children: Vec<Expression>) -> &mut Self {
        self.push(Expression::Or(children));
        self
    }

    pub fn where_greater(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.push(Expression::compare(field, Comparison::Gt, value));
        self
    }

    pub fn where_less(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.push(Expression::compare(field, Comparison::Lt, value));
        self
    }

    pub fn where_greater_or_equal(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push(Expression::compare(field, Comparison::Gte, value));
        self
    }

    pub fn where_less_or_equal(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push(Expression::compare(field, Comparison::Lte, value));
        self
    }

    /// Evaluate against a stored document (the `_id` key included).
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Expression::And(children) => children.iter().all(|child| child.matches(document)),
            Expression::Or(children) => children.iter().any(|child| child.matches(document)),
            Expression::Compare { field, op, value } => {
                let mut candidates = Vec::new();
                collect_path(document, &split_path(field), &mut candidates);
                candidates
                    .into_iter()
                    .any(|candidate| compare_candidate(candidate, *op, value))
            }
        }
    }
}

pub fn split_path(field: &str) -> Vec<&str> {
    field.split('.').filter(|part| !part.is_empty()).collect()
}

fn collect_path<'a>(value: &'a Value, path: &[&str], out: &mut Vec<&'a Value>) {
    match path.split_first() {
        None => out.push(value),
        Some((head, rest)) => match value {
            Value::Object(map) => {
                if let Some(next) = map.get(*head) {
                    collect_path(next, rest, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    collect_path(item, path, out);
                }
            }
            _ => {}
        },
    }
}

fn compare_candidate(candidate: &Value, op: Comparison, operand: &Value) -> bool {
    if let Value::Array(items) = candidate {
        if op == Comparison::Eq && candidate == operand {
            return true;
        }
        return items
            .iter()
            .any(|item| compare_candidate(item, op, operand));
    }

    match op {
        Comparison::Eq => candidate == operand,
        Comparison::Gt => order(candidate, operand) == Some(Ordering::Greater),
        Comparison::Lt => order(candidate, operand) == Some(Ordering::Less),
        Comparison::Gte => matches!(
            order(candidate, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Comparison::Lte => matches!(
            order(candidate, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

fn order(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
