//! Markup to element tree.
//!
//! [`parse`] runs a fixed pipeline over the source text:
//!
//! 1. escape tokens decode to character references or brace stand-ins, bare
//!    `&` is escaped
//! 2. comments are stripped
//! 3. a markup-wide `{{ }}` pass substitutes bound variables
//! 4. a single `<poml>` container is unwrapped, recording its `syntax`
//! 5. `<stylesheet>` JSON bodies merge into the context stylesheet
//! 6. the remaining text is parsed into [`Element`]s
//!
//! Parsing never fails. Markup that does not form a well-nested tree becomes
//! a single text element holding the substituted source.
//!
//! ```rust
//! use poml::{parse, Context};
//! use serde_json::json;
//!
//! let mut ctx = Context::new();
//! ctx.variables.insert("who".into(), json!("world"));
//! let elements = parse("<p>Hello {{who}}</p>", &mut ctx);
//! assert_eq!(elements[0].content, "Hello world");
//!
//! let broken = parse("<p>unclosed", &mut ctx);
//! assert!(broken[0].is_text());
//! assert!(broken[0].content.contains("unclosed"));
//! ```

mod comments;
mod escape;
mod tree;

use std::collections::HashSet;
use std::ops::Range;

use poml_template::{parse_expression, replace_tokens_keeping, stringify};
use tracing::{debug, warn};

use crate::context::{Context, Syntax};
use crate::element::Element;
use crate::stylesheet::{Stylesheet, StylesheetParse};

pub use comments::strip_comments;
pub use escape::{decode_escapes, decode_references};
pub(crate) use escape::{protect_braces, restore_braces};

/// Name bound to the per-iteration loop record.
pub(crate) const LOOP_RECORD: &str = "loop";

/// Parses POML markup into elements, updating `ctx` with the container syntax
/// and any stylesheet blocks.
pub fn parse(markup: &str, ctx: &mut Context) -> Vec<Element> {
    let decoded = escape::decode_escapes(markup);
    let sanitized = escape::escape_bare_ampersands(&decoded);
    let stripped = comments::strip_comments(&sanitized);

    let deferred = loop_variables(&stripped);
    let substituted = substitute_markup(&stripped, ctx, &deferred);

    let body = unwrap_container(&substituted, ctx);
    prescan_stylesheets(body, ctx);

    match tree::build(body) {
        Ok(elements) => elements,
        Err(e) => {
            warn!(error = %e, "markup is not well formed; rendering it as text");
            let text = escape::decode_references(body.trim());
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Element::text(text)]
            }
        }
    }
}

/// Markup-wide substitution.
///
/// Values are escaped so they cannot change the document structure or form
/// new tokens. Expressions rooted in a loop variable wait for the loop to bind
/// them, and `if`/`for` attribute values are left whole for render-time
/// evaluation. Whatever is left for render time has its angle brackets
/// escaped so the tree still builds.
fn substitute_markup(text: &str, ctx: &Context, deferred: &HashSet<String>) -> String {
    let mut protected = attribute_spans(text, "if");
    protected.extend(attribute_spans(text, "for"));
    protected.sort_by_key(|span| span.start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in protected {
        if span.start < cursor {
            continue;
        }
        out.push_str(&substitute_segment(&text[cursor..span.start], ctx, deferred));
        out.push_str(&escape::escape_angles(&text[span.clone()]));
        cursor = span.end;
    }
    out.push_str(&substitute_segment(&text[cursor..], ctx, deferred));
    out
}

fn substitute_segment(text: &str, ctx: &Context, deferred: &HashSet<String>) -> String {
    replace_tokens_keeping(
        text,
        |source| {
            let expr = parse_expression(source).ok()?;
            if expr.references().iter().any(|root| deferred.contains(*root)) {
                debug!(expression = source.trim(), "deferring loop expression");
                return None;
            }
            let value = expr.eval(&ctx.variables)?;
            stringify(&value).map(|s| escape::protect_braces(&escape::escape_markup(&s)))
        },
        escape::escape_angles,
    )
}

/// Byte ranges of the quoted values of every `name="..."` attribute.
///
/// Only matches where `name` is preceded by whitespace, so `data-for` is not
/// mistaken for `for`.
fn attribute_spans(text: &str, name: &str) -> Vec<Range<usize>> {
    let needle = format!("{}=", name);
    let mut spans = Vec::new();
    let mut offset = 0;

    while let Some(idx) = text[offset..].find(&needle) {
        let at = offset + idx;
        offset = at + needle.len();

        let preceded_by_space = text[..at]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        if !preceded_by_space {
            continue;
        }
        let Some(quote) = text[offset..]
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
        else {
            continue;
        };
        let value_start = offset + 1;
        let Some(len) = text[value_start..].find(quote) else {
            continue;
        };
        spans.push(value_start..value_start + len);
        offset = value_start + len + 1;
    }

    spans
}

/// Collects names declared by `for="name in ..."` attributes, plus the loop
/// record.
fn loop_variables(text: &str) -> HashSet<String> {
    let mut names = HashSet::from([LOOP_RECORD.to_string()]);
    for span in attribute_spans(text, "for") {
        let mut words = text[span].split_whitespace();
        if let (Some(name), Some("in")) = (words.next(), words.next()) {
            names.insert(name.to_string());
        }
    }
    names
}

/// Unwraps a document that is exactly one `<poml>` container.
fn unwrap_container<'a>(text: &'a str, ctx: &mut Context) -> &'a str {
    let trimmed = text.trim();
    let Some(after_name) = strip_prefix_ignore_case(trimmed, "<poml") else {
        return text;
    };
    if !after_name.starts_with(|c: char| c.is_whitespace() || c == '>' || c == '/') {
        return text;
    }
    let Some(open_end) = after_name.find('>') else {
        return text;
    };
    let open_tag = &trimmed[..trimmed.len() - after_name.len() + open_end + 1];

    let body = if open_tag.ends_with("/>") {
        if trimmed.len() != open_tag.len() {
            return text;
        }
        ""
    } else {
        let rest = &trimmed[open_tag.len()..];
        let Some(body) = strip_suffix_ignore_case(rest, "</poml>") else {
            return text;
        };
        if contains_ignore_case(body, "<poml") {
            return text;
        }
        body
    };

    if let Some(syntax) = attribute_in_tag(open_tag, "syntax") {
        match syntax.parse::<Syntax>() {
            Ok(syntax) => ctx.syntax = Some(syntax),
            Err(e) => warn!(error = %e, "ignoring container syntax"),
        }
    }
    body
}

/// Merges every `<stylesheet>` block whose body is a JSON object.
fn prescan_stylesheets(text: &str, ctx: &mut Context) {
    let mut rest = text;
    while let Some(start) = find_ignore_case(rest, "<stylesheet") {
        let after = &rest[start..];
        let Some(open_end) = after.find('>') else {
            return;
        };
        if after[..open_end].ends_with('/') {
            rest = &after[open_end + 1..];
            continue;
        }
        let body_start = &after[open_end + 1..];
        let Some(close) = find_ignore_case(body_start, "</stylesheet>") else {
            return;
        };
        let body = escape::restore_braces(&escape::decode_references(body_start[..close].trim()));
        if body.starts_with('{') {
            match Stylesheet::parse(&body) {
                StylesheetParse::Parsed(sheet) => ctx.stylesheet.merge(sheet),
                StylesheetParse::Ignored(reason) => {
                    warn!(%reason, "ignoring invalid stylesheet block");
                }
            }
        }
        rest = &body_start[close..];
    }
}

/// Reads an attribute value out of a raw opening tag.
fn attribute_in_tag(tag: &str, name: &str) -> Option<String> {
    let mut rest = tag;
    while let Some(idx) = find_ignore_case(rest, name) {
        let preceded_by_space = rest[..idx]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        let after = rest[idx + name.len()..].trim_start();
        rest = &rest[idx + name.len()..];
        if !preceded_by_space {
            continue;
        }
        let Some(value) = after.strip_prefix('=') else {
            continue;
        };
        let value = value.trim_start();
        let quote = value.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let end = value[1..].find(quote)?;
        return Some(escape::decode_references(&value[1..1 + end]));
    }
    None
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    find_ignore_case(haystack, needle).is_some()
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    let tail = text.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &text[..split])
}
