//! Escape tokens and entity handling.
//!
//! POML escape tokens (`#lt;`, `#lbrace;`, ...) let structural characters
//! appear in text. Markup characters decode to numeric character references,
//! which the tree parser resolves, so a decoded `<` never opens a tag.
//!
//! Braces decode to the private-use stand-ins [`OPEN_BRACE`] and
//! [`CLOSE_BRACE`] instead. Substituted values get the same treatment, so
//! neither can form a `{{` token in a later pass. [`restore_braces`] turns
//! them back into `{`/`}` once rendering is done.

use std::borrow::Cow;

/// Stand-in for a literal `{` until rendering finishes.
pub(crate) const OPEN_BRACE: char = '\u{E000}';
/// Stand-in for a literal `}` until rendering finishes.
pub(crate) const CLOSE_BRACE: char = '\u{E001}';

/// Escape token to its replacement. Brace replacements are the stand-ins.
const ESCAPES: &[(&str, &str)] = &[
    ("#quot;", "&#34;"),
    ("#apos;", "&#39;"),
    ("#amp;", "&#38;"),
    ("#lt;", "&#60;"),
    ("#gt;", "&#62;"),
    ("#hash;", "#"),
    ("#lbrace;", "\u{E000}"),
    ("#rbrace;", "\u{E001}"),
];

const NAMED_ENTITIES: &[&str] = &["lt", "gt", "amp", "quot", "apos"];

/// Replaces every escape token.
pub fn decode_escapes(text: &str) -> String {
    if !text.contains('#') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find('#') {
        out.push_str(&rest[..idx]);
        let candidate = &rest[idx..];
        match ESCAPES
            .iter()
            .find(|(token, _)| candidate.starts_with(token))
        {
            Some((token, replacement)) => {
                out.push_str(replacement);
                rest = &candidate[token.len()..];
            }
            None => {
                out.push('#');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escapes `&` that does not begin a known entity or character reference.
pub fn escape_bare_ampersands(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for (idx, piece) in text.split('&').enumerate() {
        if idx > 0 {
            if starts_with_entity(piece) {
                out.push('&');
            } else {
                out.push_str("&amp;");
            }
        }
        out.push_str(piece);
    }
    Cow::Owned(out)
}

fn starts_with_entity(after_amp: &str) -> bool {
    let Some(semi) = after_amp.find(';') else {
        return false;
    };
    let name = &after_amp[..semi];
    if NAMED_ENTITIES.contains(&name) {
        return true;
    }
    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(dec) = name.strip_prefix('#') {
        return !dec.is_empty() && dec.chars().all(|c| c.is_ascii_digit());
    }
    false
}

/// Resolves entities and character references, leaving the text unchanged if
/// it contains a malformed one.
pub fn decode_references(text: &str) -> String {
    match quick_xml::escape::unescape(text) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Escapes text for insertion into markup before the tree parse.
pub fn escape_markup(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

/// Replaces `{` and `}` with their stand-ins.
pub(crate) fn protect_braces(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '{' => OPEN_BRACE,
            '}' => CLOSE_BRACE,
            other => other,
        })
        .collect()
}

/// Turns brace stand-ins back into `{` and `}`.
pub(crate) fn restore_braces(text: &str) -> String {
    if !text.contains(|c: char| c == OPEN_BRACE || c == CLOSE_BRACE) {
        return text.to_string();
    }
    text.chars()
        .map(|c| match c {
            OPEN_BRACE => '{',
            CLOSE_BRACE => '}',
            other => other,
        })
        .collect()
}

/// Escapes angle brackets in text copied into markup verbatim, such as a
/// `{{ x < 1 }}` token kept for render time. `&` is already escaped by
/// [`escape_bare_ampersands`].
pub(crate) fn escape_angles(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}
