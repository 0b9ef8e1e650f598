//! `{{ expr }}` substitution over text.
//!
//! All three entry points share one rule: a token is only replaced when its
//! expression parses, evaluates, and has a text form. Anything else stays in
//! the output byte-for-byte, so a later pass with a better-scoped environment
//! can still resolve it.

use std::borrow::Cow;
use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::eval::stringify;
use crate::parser::parse_expression;

/// Operators that mark an expression as belonging to render-time evaluation.
const DEFERRED_OPERATORS: &[&str] = &["==", "!=", ">=", "<=", ">", "<", "?", ":"];

/// Pieces of a template: literal text or a `{{ }}` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Literal text between tokens.
    Text(&'a str),
    /// An expression token. `raw` includes the braces, `source` does not.
    Expr { raw: &'a str, source: &'a str },
}

/// Splits text into literal runs and `{{ }}` tokens.
///
/// An opening `{{` with no closing `}}` is literal text.
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.pos..];
        let Some(open) = remaining.find("{{") else {
            self.pos = self.input.len();
            return Some(Token::Text(remaining));
        };

        let Some(close_rel) = remaining[open + 2..].find("}}") else {
            self.pos = self.input.len();
            return Some(Token::Text(remaining));
        };
        let close = open + 2 + close_rel;

        // `{{ a {{ b }}` pairs the closing braces with the nearest opener.
        let open = match remaining[open + 2..close].rfind("{{") {
            Some(inner) => open + 2 + inner,
            None => open,
        };

        if open > 0 {
            self.pos += open;
            return Some(Token::Text(&remaining[..open]));
        }

        self.pos += close + 2;
        Some(Token::Expr {
            raw: &remaining[..close + 2],
            source: &remaining[2..close],
        })
    }
}

/// Replaces every `{{ expr }}` with its stringified value.
///
/// Unresolved, `null` and unparsable expressions leave the token verbatim.
///
/// ```rust
/// use poml_template::substitute;
/// use serde_json::json;
///
/// let vars = json!({"name": "Ada"});
/// let vars = vars.as_object().unwrap();
/// assert_eq!(substitute("Hi {{ name }}, {{ nope }}", vars), "Hi Ada, {{ nope }}");
/// ```
pub fn substitute(text: &str, vars: &Map<String, Value>) -> String {
    substitute_with(text, vars, str::to_string)
}

/// Like [`substitute`], but each inserted value is written as `escape(value)`.
pub fn substitute_with<E>(text: &str, vars: &Map<String, Value>, escape: E) -> String
where
    E: Fn(&str) -> String,
{
    replace_tokens(text, |source| {
        let expr = parse_expression(source).ok()?;
        expr.eval(vars)
            .as_ref()
            .and_then(stringify)
            .map(|value| escape(&value))
    })
}

/// Substitution for attribute values.
///
/// Expressions containing a comparison, `?` or `:` are left untouched for the
/// component to evaluate in its own scope. Other expressions are replaced only
/// when they evaluate to a string, number or boolean.
pub fn safe_substitute(text: &str, vars: &Map<String, Value>) -> String {
    safe_substitute_with(text, vars, str::to_string)
}

/// Like [`safe_substitute`], but each inserted value is written as
/// `escape(value)`.
pub fn safe_substitute_with<E>(text: &str, vars: &Map<String, Value>, escape: E) -> String
where
    E: Fn(&str) -> String,
{
    replace_tokens(text, |source| {
        if DEFERRED_OPERATORS.iter().any(|op| source.contains(op)) {
            return None;
        }
        let value = parse_expression(source).ok()?.eval(vars)?;
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                stringify(&value).map(|value| escape(&value))
            }
            _ => None,
        }
    })
}

/// Like [`substitute`], but leaves tokens that reference any root name in
/// `deferred`.
pub fn substitute_deferring(
    text: &str,
    vars: &Map<String, Value>,
    deferred: &HashSet<String>,
) -> String {
    replace_tokens(text, |source| {
        let expr = parse_expression(source).ok()?;
        if expr.references().iter().any(|name| deferred.contains(*name)) {
            return None;
        }
        expr.eval(vars).as_ref().and_then(stringify)
    })
}

/// Rewrites every `{{ }}` token with `resolve(source)`, keeping the token
/// verbatim when it returns `None`.
///
/// Tokens separated only by `||` form one expression, so
/// `{{ a }} || {{ b }}` resolves like `{{ a || b }}`.
///
/// This is the primitive the other substitution functions are built on.
pub fn replace_tokens<F>(text: &str, resolve: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    replace_tokens_keeping(text, resolve, str::to_string)
}

/// Like [`replace_tokens`], but a token that does not resolve is written as
/// `keep(raw)`.
pub fn replace_tokens_keeping<F, K>(text: &str, mut resolve: F, mut keep: K) -> String
where
    F: FnMut(&str) -> Option<String>,
    K: FnMut(&str) -> String,
{
    let tokens: Vec<Token<'_>> = Tokenizer::new(text).collect();
    let mut output = String::with_capacity(text.len());
    let mut index = 0;

    while let Some(token) = tokens.get(index) {
        index += 1;
        let (raw, source) = match token {
            Token::Text(t) => {
                output.push_str(t);
                continue;
            }
            Token::Expr { raw, source } => (*raw, *source),
        };

        let mut raw = Cow::Borrowed(raw);
        let mut operands = vec![source];
        while let (Some(Token::Text(separator)), Some(Token::Expr { raw: next_raw, source: next })) =
            (tokens.get(index), tokens.get(index + 1))
        {
            if separator.trim() != "||" {
                break;
            }
            let joined = raw.to_mut();
            joined.push_str(separator);
            joined.push_str(next_raw);
            operands.push(*next);
            index += 2;
        }

        match resolve(&or_chain(&operands)) {
            Some(value) => output.push_str(&value),
            None => output.push_str(&keep(&raw)),
        }
    }
    output
}

/// Joins the sources of `||`-separated tokens into one expression.
pub(crate) fn or_chain<'a>(operands: &[&'a str]) -> Cow<'a, str> {
    match operands {
        [single] => Cow::Borrowed(*single),
        _ => Cow::Owned(
            operands
                .iter()
                .map(|operand| format!("({})", operand))
                .collect::<Vec<_>>()
                .join(" || "),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    mod tokenizer {
        use super::*;

        #[test]
        fn splits_text_and_expressions() {
            let tokens: Vec<_> = Tokenizer::new("a {{ b }} c").collect();
            assert_eq!(
                tokens,
                vec![
                    Token::Text("a "),
                    Token::Expr {
                        raw: "{{ b }}",
                        source: " b "
                    },
                    Token::Text(" c"),
                ]
            );
        }

        #[test]
        fn unclosed_open_is_text() {
            let tokens: Vec<_> = Tokenizer::new("a {{ b").collect();
            assert_eq!(tokens, vec![Token::Text("a {{ b")]);
        }

        #[test]
        fn nested_open_pairs_with_nearest() {
            let tokens: Vec<_> = Tokenizer::new("{{ a {{b}}").collect();
            assert_eq!(
                tokens,
                vec![
                    Token::Text("{{ a "),
                    Token::Expr {
                        raw: "{{b}}",
                        source: "b"
                    },
                ]
            );
        }

        #[test]
        fn empty_input() {
            assert_eq!(Tokenizer::new("").count(), 0);
        }
    }

    mod substitution {
        use super::*;

        #[test]
        fn replaces_resolved_values() {
            let v = vars(json!({"n": 3, "ok": true, "list": [1, 2]}));
            assert_eq!(
                substitute("{{n}} {{ok}} {{list}}", &v),
                "3 true [1,2]"
            );
        }

        #[test]
        fn keeps_unresolved_and_null() {
            let v = vars(json!({"nothing": null}));
            assert_eq!(substitute("{{nope}}", &v), "{{nope}}");
            assert_eq!(substitute("{{ nothing }}", &v), "{{ nothing }}");
        }

        #[test]
        fn keeps_unparsable() {
            let v = vars(json!({}));
            assert_eq!(substitute("{{ a @ b }}", &v), "{{ a @ b }}");
            assert_eq!(substitute("{{}}", &v), "{{}}");
        }

        #[test]
        fn evaluates_full_grammar() {
            let v = vars(json!({"n": 5}));
            assert_eq!(substitute("{{ n > 3 ? 'big' : 'small' }}", &v), "big");
        }
    }

    mod chains {
        use super::*;

        #[test]
        fn or_between_tokens_falls_back() {
            let v = vars(json!({"b": "x"}));
            assert_eq!(substitute("{{a}} || {{b}}", &v), "x");
            let v = vars(json!({"a": "y", "b": "x"}));
            assert_eq!(substitute("{{a}} || {{b}}", &v), "y");
        }

        #[test]
        fn unresolved_chain_is_kept_whole() {
            let v = vars(json!({}));
            assert_eq!(substitute("[{{a}} || {{ b }}]", &v), "[{{a}} || {{ b }}]");
        }

        #[test]
        fn other_separators_do_not_chain() {
            let v = vars(json!({"b": "x"}));
            assert_eq!(substitute("{{a}} or {{b}}", &v), "{{a}} or x");
        }

        #[test]
        fn kept_tokens_go_through_keep() {
            let out = replace_tokens_keeping("a {{ x < 1 }} b", |_| None, |raw| raw.replace('<', "&lt;"));
            assert_eq!(out, "a {{ x &lt; 1 }} b");
        }
    }

    mod safe {
        use super::*;

        #[test]
        fn defers_operator_expressions() {
            let v = vars(json!({"n": 5}));
            assert_eq!(safe_substitute("{{ n > 3 }}", &v), "{{ n > 3 }}");
            assert_eq!(safe_substitute("{{ a ? b : c }}", &v), "{{ a ? b : c }}");
        }

        #[test]
        fn substitutes_primitives_only() {
            let v = vars(json!({"s": "x", "n": 1, "list": [1], "obj": {"a": 1}}));
            assert_eq!(safe_substitute("{{s}}-{{n}}", &v), "x-1");
            assert_eq!(safe_substitute("{{list}}", &v), "{{list}}");
            assert_eq!(safe_substitute("{{obj}}", &v), "{{obj}}");
        }

        #[test]
        fn escape_applies_to_inserted_values() {
            let v = vars(json!({"s": "{x}"}));
            let out = safe_substitute_with("<{{s}}>", &v, |value| value.replace('{', "("));
            assert_eq!(out, "<(x}>");
        }
    }

    mod deferring {
        use super::*;

        #[test]
        fn skips_deferred_roots() {
            let v = vars(json!({"i": "outer", "x": 1}));
            let deferred: HashSet<String> = ["i".to_string(), "loop".to_string()].into();
            assert_eq!(
                substitute_deferring("{{i}} {{x}} {{loop.index}}", &v, &deferred),
                "{{i}} 1 {{loop.index}}"
            );
        }

        #[test]
        fn defers_when_any_operand_is_deferred() {
            let v = vars(json!({"i": 1, "x": 1}));
            let deferred: HashSet<String> = ["i".to_string()].into();
            assert_eq!(
                substitute_deferring("{{ x || i }}", &v, &deferred),
                "{{ x || i }}"
            );
        }
    }
}
