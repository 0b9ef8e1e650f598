//! Variable path resolution.
//!
//! Paths walk objects by key and arrays by index. A small set of accessor
//! suffixes is understood on arrays and strings; maps never get accessors, so
//! a user key named `length` or `first` always wins on an object.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::ast::VarPath;

/// Resolves `path` against `vars`.
///
/// Returns `None` when any segment is missing. Accessor segments produce owned
/// values; plain lookups borrow.
pub fn resolve<'a>(vars: &'a Map<String, Value>, path: &VarPath) -> Option<Cow<'a, Value>> {
    let mut segments = path.segments().iter();
    let root = segments.next()?;
    let mut current = Cow::Borrowed(lookup_key(vars, root)?);

    for segment in segments {
        current = match current {
            Cow::Borrowed(value) => step(value, segment)?,
            Cow::Owned(value) => Cow::Owned(step(&value, segment)?.into_owned()),
        };
    }

    Some(current)
}

/// Looks up a key exactly, then in its symbol-style `:key` spelling.
fn lookup_key<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).or_else(|| map.get(&format!(":{}", key)))
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<Cow<'a, Value>> {
    match value {
        Value::Object(map) => lookup_key(map, segment).map(Cow::Borrowed),
        Value::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                return items.get(index).map(Cow::Borrowed);
            }
            array_accessor(items, segment)
        }
        Value::String(s) => string_accessor(s, segment).map(Cow::Owned),
        _ => None,
    }
}

fn array_accessor<'a>(items: &'a [Value], name: &str) -> Option<Cow<'a, Value>> {
    match name {
        "length" | "size" | "count" => Some(Cow::Owned(Value::from(items.len()))),
        "first" => items.first().map(Cow::Borrowed),
        "last" => items.last().map(Cow::Borrowed),
        "empty" => Some(Cow::Owned(Value::Bool(items.is_empty()))),
        _ => None,
    }
}

fn string_accessor(s: &str, name: &str) -> Option<Value> {
    match name {
        "length" | "size" => Some(Value::from(s.chars().count())),
        "upper" => Some(Value::String(s.to_uppercase())),
        "lower" => Some(Value::String(s.to_lowercase())),
        "trim" => Some(Value::String(s.trim().to_string())),
        "empty" => Some(Value::Bool(s.is_empty())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_expression;
    use crate::Expr;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn resolve_str(vars: &Map<String, Value>, src: &str) -> Option<Value> {
        match parse_expression(src).unwrap() {
            Expr::Path(path) => resolve(vars, &path).map(Cow::into_owned),
            other => panic!("not a path: {:?}", other),
        }
    }

    #[test]
    fn resolve_nested_object() {
        let v = vars(json!({"user": {"profile": {"name": "Ada"}}}));
        assert_eq!(resolve_str(&v, "user.profile.name"), Some(json!("Ada")));
        assert_eq!(resolve_str(&v, "user.missing"), None);
    }

    #[test]
    fn resolve_array_index() {
        let v = vars(json!({"items": [{"name": "a"}, {"name": "b"}]}));
        assert_eq!(resolve_str(&v, "items.1.name"), Some(json!("b")));
        assert_eq!(resolve_str(&v, "items.5"), None);
    }

    #[test]
    fn resolve_symbol_style_key() {
        let v = vars(json!({":name": "sym", "outer": {":inner": 1}}));
        assert_eq!(resolve_str(&v, "name"), Some(json!("sym")));
        assert_eq!(resolve_str(&v, "outer.inner"), Some(json!(1)));
    }

    #[test]
    fn exact_key_wins_over_symbol_key() {
        let v = vars(json!({"name": "plain", ":name": "sym"}));
        assert_eq!(resolve_str(&v, "name"), Some(json!("plain")));
    }

    #[test]
    fn array_accessors() {
        let v = vars(json!({"items": [3, 4, 5], "none": []}));
        assert_eq!(resolve_str(&v, "items.length"), Some(json!(3)));
        assert_eq!(resolve_str(&v, "items.count"), Some(json!(3)));
        assert_eq!(resolve_str(&v, "items.first"), Some(json!(3)));
        assert_eq!(resolve_str(&v, "items.last"), Some(json!(5)));
        assert_eq!(resolve_str(&v, "none.empty"), Some(json!(true)));
        assert_eq!(resolve_str(&v, "none.first"), None);
    }

    #[test]
    fn string_accessors() {
        let v = vars(json!({"s": "  Hi  "}));
        assert_eq!(resolve_str(&v, "s.length"), Some(json!(6)));
        assert_eq!(resolve_str(&v, "s.trim"), Some(json!("Hi")));
        assert_eq!(resolve_str(&v, "s.upper"), Some(json!("  HI  ")));
        assert_eq!(resolve_str(&v, "s.trim.lower"), Some(json!("hi")));
    }

    #[test]
    fn maps_have_no_accessors() {
        let v = vars(json!({"m": {"a": 1}, "n": {"length": "mine"}}));
        assert_eq!(resolve_str(&v, "m.length"), None);
        assert_eq!(resolve_str(&v, "n.length"), Some(json!("mine")));
    }
}
