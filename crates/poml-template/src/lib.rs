//! Template expressions for POML documents.
//!
//! This crate implements the `{{ expr }}` language used inside POML markup:
//! a small recursive-descent expression grammar, evaluation against a
//! `serde_json` variable map, and the substitution passes that rewrite text.
//!
//! # Example
//!
//! ```rust
//! use poml_template::{evaluate_condition, substitute};
//! use serde_json::json;
//!
//! let vars = json!({"user": {"name": "Ada"}, "items": [1, 2, 3]});
//! let vars = vars.as_object().unwrap();
//!
//! assert_eq!(
//!     substitute("{{ user.name }} has {{ items.length }} items", vars),
//!     "Ada has 3 items"
//! );
//! assert!(evaluate_condition("items.length > 2", vars));
//! ```
//!
//! # Grammar
//!
//! | Form | Example |
//! |------|---------|
//! | String literal | `'text'`, `"text"` |
//! | Number, boolean, null | `42`, `1.5`, `true`, `null` |
//! | Path | `user.name`, `items.0`, `items.length` |
//! | Increment | `loop.index0 + 1` |
//! | JSON / list literal | `[1, 2]`, `{"a": 1}`, `['a', b]` |
//! | Negation | `!done` |
//! | Comparison | `a == b`, `n >= 3` |
//! | Ternary | `n > 1 ? 'many' : 'one'` |
//! | Or | `title \|\| 'Untitled'` |
//!
//! Unresolved expressions never fail substitution: the original token is left
//! in the output.

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;
mod path;
mod substitute;

use std::borrow::Cow;

use serde_json::{Map, Value};

pub use ast::{CmpOp, Expr, VarPath};
pub use error::{ExprError, Result};
pub use eval::{is_truthy, stringify};
pub use parser::parse_expression;
pub use path::resolve;
pub use substitute::{
    replace_tokens, replace_tokens_keeping, safe_substitute, safe_substitute_with, substitute,
    substitute_deferring, substitute_with, Token, Tokenizer,
};

/// Parses and evaluates `expr`. Surrounding `{{ }}` braces are accepted, as
/// is a chain of braced operands joined by `||` (`{{ a }} || {{ b }}`).
///
/// Returns `None` when the expression does not parse or does not resolve.
pub fn evaluate(expr: &str, vars: &Map<String, Value>) -> Option<Value> {
    parse_expression(&strip_braces(expr)).ok()?.eval(vars)
}

/// Evaluates `expr` as a condition. Unparsable expressions are false.
///
/// ```rust
/// use poml_template::evaluate_condition;
/// use serde_json::json;
///
/// let vars = json!({"debug": true});
/// let vars = vars.as_object().unwrap();
/// assert!(evaluate_condition("debug", vars));
/// assert!(evaluate_condition("{{ !missing }}", vars));
/// assert!(!evaluate_condition("false", vars));
/// ```
pub fn evaluate_condition(expr: &str, vars: &Map<String, Value>) -> bool {
    is_truthy(evaluate(expr, vars).as_ref())
}

fn strip_braces(expr: &str) -> Cow<'_, str> {
    let trimmed = expr.trim();
    if let Some(operands) = braced_operands(trimmed) {
        return substitute::or_chain(&operands);
    }
    Cow::Borrowed(
        trimmed
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
            .unwrap_or(trimmed),
    )
}

/// The sources of `{{ a }} || {{ b }} ...` when `text` is exactly such a
/// chain.
fn braced_operands(text: &str) -> Option<Vec<&str>> {
    let mut operands = Vec::new();
    let mut expect_operand = true;
    for token in Tokenizer::new(text) {
        match token {
            Token::Expr { source, .. } if expect_operand => operands.push(source),
            Token::Text(separator) if !expect_operand && separator.trim() == "||" => {}
            _ => return None,
        }
        expect_operand = !expect_operand;
    }
    (!operands.is_empty() && !expect_operand).then_some(operands)
}
