//! Structural parse into [`Element`] trees.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::element::Element;

/// Why a structural parse failed. Only used for logging before fallback.
#[derive(Debug, Error)]
pub(crate) enum TreeError {
    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("closing tag </{0}> has no matching open tag")]
    UnmatchedClose(String),

    #[error("tag <{0}> is never closed")]
    Unclosed(String),

    #[error("markup is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Parses markup into top-level elements.
pub(crate) fn build(markup: &str) -> Result<Vec<Element>, TreeError> {
    let mut reader = Reader::from_str(markup);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = true;

    // Index 0 is a virtual root collecting top-level nodes.
    let mut stack = vec![Element::new("")];

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                push_to_top(&mut stack, element);
            }
            Event::End(end) => {
                let name = std::str::from_utf8(end.name().as_ref())?.to_string();
                if stack.len() < 2 {
                    return Err(TreeError::UnmatchedClose(name));
                }
                if let Some(element) = stack.pop() {
                    push_to_top(&mut stack, element);
                }
            }
            Event::Text(text) => {
                let raw = text.unescape()?;
                let after_element = follows_element(&stack);
                if let Some(run) = normalize_text(&raw, after_element) {
                    push_to_top(&mut stack, Element::text(run));
                }
            }
            Event::CData(data) => {
                let raw = std::str::from_utf8(&data)?;
                let after_element = follows_element(&stack);
                if let Some(run) = normalize_text(raw, after_element) {
                    push_to_top(&mut stack, Element::text(run));
                }
            }
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if stack.len() > 1 {
        let tag = stack.last().map(|e| e.tag.clone()).unwrap_or_default();
        return Err(TreeError::Unclosed(tag));
    }

    Ok(stack.pop().map(|root| root.children).unwrap_or_default())
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, TreeError> {
    let tag = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut element = Element::new(tag);
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_lowercase();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.insert(key, value);
    }
    Ok(element)
}

fn push_to_top(stack: &mut [Element], element: Element) {
    if let Some(top) = stack.last_mut() {
        top.push_child(element);
    }
}

fn follows_element(stack: &[Element]) -> bool {
    stack
        .last()
        .and_then(|top| top.children.last())
        .is_some_and(|prev| !prev.is_text())
}

/// Applies the text-run whitespace rule.
///
/// Runs that are only whitespace are dropped. Others are trimmed, and one
/// trailing space is kept when the original had whitespace after its last
/// word on the same line. A run that directly follows a sibling element keeps
/// one leading space under the same condition, so `<b>x</b> y` keeps its gap.
pub(crate) fn normalize_text(raw: &str, after_element: bool) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let trailing = &raw[raw.trim_end().len()..];
    let leading = &raw[..raw.len() - raw.trim_start().len()];

    let mut run = String::with_capacity(trimmed.len() + 2);
    if after_element && same_line_space(leading.chars().next()) {
        run.push(' ');
    }
    run.push_str(trimmed);
    if same_line_space(trailing.chars().next()) {
        run.push(' ');
    }
    Some(run)
}

fn same_line_space(c: Option<char>) -> bool {
    c.is_some_and(|c| c != '\n' && c != '\r')
}
