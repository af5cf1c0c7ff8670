// SPDX-License-Identifier: MIT

//! Guard expression evaluator

use super::ast::{CompareOp, Expression, Literal};
use serde_json::Value;

/// Anything that can resolve a dotted path to a JSON value
pub trait PathLookup {
    fn get_path(&self, path: &str) -> Option<&Value>;
}

impl PathLookup for serde_json::Map<String, Value> {
    fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }
}

/// Evaluate an expression; missing paths behave as `null`
pub fn evaluate(expr: &Expression, scope: &impl PathLookup) -> bool {
    match expr {
        Expression::True => true,
        Expression::False => false,
        Expression::Compare { path, op, value } => {
            evaluate_compare(scope.get_path(path), *op, value)
        }
        Expression::Truthy(path) => is_truthy(scope.get_path(path)),
        Expression::And(left, right) => evaluate(left, scope) && evaluate(right, scope),
        Expression::Or(left, right) => evaluate(left, scope) || evaluate(right, scope),
        Expression::Not(inner) => !evaluate(inner, scope),
    }
}

fn evaluate_compare(left: Option<&Value>, op: CompareOp, right: &Literal) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::Gt => compare_numbers(left, right, |a, b| a > b),
        CompareOp::Gte => compare_numbers(left, right, |a, b| a >= b),
        CompareOp::Lt => compare_numbers(left, right, |a, b| a < b),
        CompareOp::Lte => compare_numbers(left, right, |a, b| a <= b),
        CompareOp::Contains => check_contains(left, right),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn literal_matches(value: &Value, literal: &Literal) -> bool {
    match (value, literal) {
        (Value::Null, Literal::Null) => true,
        (Value::String(s), Literal::String(rs)) => s == rs,
        (Value::Number(n), Literal::Number(rn)) => n
            .as_f64()
            .map(|f| (f - rn).abs() < f64::EPSILON)
            .unwrap_or(false),
        (Value::Bool(b), Literal::Boolean(rb)) => b == rb,
        _ => false,
    }
}

fn values_equal(left: Option<&Value>, right: &Literal) -> bool {
    match left {
        None => *right == Literal::Null,
        Some(value) => literal_matches(value, right),
    }
}

fn compare_numbers<F>(left: Option<&Value>, right: &Literal, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (left.and_then(Value::as_f64), right) {
        (Some(l), Literal::Number(r)) => cmp(l, *r),
        _ => false,
    }
}

fn check_contains(left: Option<&Value>, right: &Literal) -> bool {
    match (left, right) {
        (Some(Value::String(s)), Literal::String(substr)) => s.contains(substr.as_str()),
        (Some(Value::Array(items)), literal) => items.iter().any(|v| literal_matches(v, literal)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::orchestration::condition::parser::parse;
    use serde_json::{json, Map};

    fn scope(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn eval(expr: &str, s: &Map<String, Value>) -> bool {
        evaluate(&parse(expr).unwrap(), s)
    }

    #[test]
    fn test_string_equality() {
        let s = scope(json!({"intent": "search"}));
        assert!(eval("intent == 'search'", &s));
        assert!(!eval("intent == 'code'", &s));
        assert!(eval("intent != 'code'", &s));
    }

    #[test]
    fn test_number_comparison() {
        let s = scope(json!({"score": 7.5}));
        assert!(eval("score > 5", &s));
        assert!(!eval("score > 10", &s));
        assert!(eval("score >= 7.5", &s));
        assert!(eval("score < 10", &s));
        assert!(eval("score <= 7.5", &s));
        assert!(!eval("score <= 7", &s));
    }

    #[test]
    fn test_missing_field_is_null() {
        let s = Map::new();
        assert!(eval("missing == null", &s));
        assert!(!eval("missing == 'value'", &s));
        assert!(!eval("missing > 1", &s));
        assert!(!eval("missing", &s));
    }

    #[test]
    fn test_contains() {
        let s = scope(json!({"message": "hello world", "tags": ["bug", "urgent"], "ids": [1, 2]}));
        assert!(eval("message contains 'world'", &s));
        assert!(!eval("message contains 'foo'", &s));
        assert!(eval("tags contains 'urgent'", &s));
        assert!(!eval("tags contains 'frontend'", &s));
        assert!(eval("ids contains 2", &s));
    }

    #[test]
    fn test_truthy_paths() {
        let s = scope(json!({"flag": true, "empty": "", "count": 0, "list": [1]}));
        assert!(eval("flag", &s));
        assert!(!eval("empty", &s));
        assert!(!eval("count", &s));
        assert!(eval("list and not empty", &s));
    }

    #[test]
    fn test_nested_path_and_logic() {
        let s = scope(json!({"review": {"output": {"verdict": "approve", "score": 0.9}}}));
        assert!(eval(
            "review.output.verdict == 'approve' and review.output.score > 0.8",
            &s
        ));
        assert!(eval(
            "review.output.verdict == 'reject' or review.output.score > 0.8",
            &s
        ));
        assert!(!eval("not (review.output.verdict == 'approve')", &s));
    }
}
