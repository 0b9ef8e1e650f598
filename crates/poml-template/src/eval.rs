//! Expression evaluation.
//!
//! Evaluation returns `Option<Value>`: `None` means the expression did not
//! resolve (a missing variable, an increment over a non-number). Callers that
//! substitute text leave the original token in place for `None`.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::ast::{CmpOp, Expr};
use crate::path;

impl Expr {
    /// Evaluates the expression against `vars`.
    pub fn eval(&self, vars: &Map<String, Value>) -> Option<Value> {
        match self {
            Expr::Literal(value) => Some(value.clone()),
            Expr::Path(p) => path::resolve(vars, p).map(|v| v.into_owned()),
            Expr::Increment { path: p, by } => {
                let value = path::resolve(vars, p)?;
                increment(&value, *by)
            }
            Expr::Not(inner) => Some(Value::Bool(!is_truthy(inner.eval(vars).as_ref()))),
            Expr::Compare { left, op, right } => {
                let left = left.eval(vars).unwrap_or(Value::Null);
                let right = right.eval(vars).unwrap_or(Value::Null);
                Some(Value::Bool(compare(&left, *op, &right)))
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if cond.eval_condition(vars) {
                    then.eval(vars)
                } else {
                    otherwise.eval(vars)
                }
            }
            Expr::Or(left, right) => {
                let value = left.eval(vars);
                if is_truthy(value.as_ref()) {
                    value
                } else {
                    right.eval(vars)
                }
            }
        }
    }

    /// Evaluates the expression as a condition.
    pub fn eval_condition(&self, vars: &Map<String, Value>) -> bool {
        is_truthy(self.eval(vars).as_ref())
    }
}

/// Truthiness: anything except `null`, `""` and `false`. Unresolved is falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Renders a value as substitution text. `null` has no text form.
pub fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn increment(value: &Value, by: i64) -> Option<Value> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return i.checked_add(by).map(Value::from);
    }
    let f = n.as_f64()? + by as f64;
    Number::from_f64(f).map(Value::Number)
}

/// Ordering between two values of the same native type.
///
/// Numbers compare numerically (so `1 == 1.0`), strings lexically, booleans
/// with `false < true`. Arrays and objects only support equality. Values of
/// different types have no ordering.
fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            (left == right).then_some(Ordering::Equal)
        }
        _ => None,
    }
}

fn compare(left: &Value, op: CmpOp, right: &Value) -> bool {
    match ordering(left, right) {
        Some(ord) => op.eval_ordering(ord),
        None => op == CmpOp::Ne,
    }
}
