//! The parsed document tree.

use std::collections::BTreeMap;

use serde::Serialize;

/// Reserved tag for bare text runs.
pub const TEXT_TAG: &str = "text";

/// A node of a parsed POML document.
///
/// A node is either a text run (`tag == "text"`, no children, non-empty
/// `content`) or a component node carrying any tag. Component nodes keep
/// their direct text in `content` and also list each text run as a `text`
/// child, so renderers can interleave text with nested elements in document
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub content: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Creates an empty component node.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Creates a text node.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            tag: TEXT_TAG.to_string(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Adds an attribute. The name is lower-cased.
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_lowercase(), value.into());
        self
    }

    /// Appends a child, updating `content` when the child is a text node.
    pub fn with_child(mut self, child: Element) -> Self {
        self.push_child(child);
        self
    }

    pub(crate) fn push_child(&mut self, child: Element) {
        if child.is_text() {
            let text = if self.content.is_empty() || self.content.ends_with(' ') {
                child.content.trim_start()
            } else {
                child.content.as_str()
            };
            self.content.push_str(text);
        }
        self.children.push(child);
    }

    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    /// Attribute lookup by lower-case name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Sets `name` to `value` only when the attribute is absent.
    ///
    /// Returns whether the value was applied.
    pub fn fill_default(&mut self, name: &str, value: &str) -> bool {
        if self.attributes.contains_key(name) {
            return false;
        }
        self.attributes.insert(name.to_string(), value.to_string());
        true
    }

    /// Class names from the `class` and `classname` attributes.
    pub fn classes(&self) -> Vec<String> {
        ["class", "classname"]
            .iter()
            .filter_map(|key| self.attr(key))
            .flat_map(str::split_whitespace)
            .map(str::to_string)
            .collect()
    }

    /// All text in the subtree, in document order, trimmed and joined by spaces.
    pub fn text_content(&self) -> String {
        if self.is_text() {
            return self.content.clone();
        }
        let parts: Vec<String> = self
            .children
            .iter()
            .map(|child| child.text_content().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            self.content.clone()
        } else {
            parts.join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_default_never_overwrites() {
        let mut el = Element::new("p").with_attr("captionStyle", "bold");
        assert!(!el.fill_default("captionstyle", "header"));
        assert_eq!(el.attr("captionstyle"), Some("bold"));
        assert!(el.fill_default("caption", "Note"));
        assert_eq!(el.attr("caption"), Some("Note"));
    }

    #[test]
    fn test_text_children_feed_content() {
        let el = Element::new("p")
            .with_child(Element::text("Hello "))
            .with_child(Element::new("b").with_child(Element::text("bold")))
            .with_child(Element::text("world"));
        assert_eq!(el.content, "Hello world");
        assert_eq!(el.text_content(), "Hello bold world");
    }

    #[test]
    fn test_classes_split() {
        let el = Element::new("p")
            .with_attr("class", "a b")
            .with_attr("className", "c");
        assert_eq!(el.classes(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_text_node() {
        let el = Element::text("hi");
        assert!(el.is_text());
        assert!(el.children.is_empty());
    }
}
