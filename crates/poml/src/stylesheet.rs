//! Stylesheets: default attribute values keyed by selector.
//!
//! A stylesheet is a JSON object mapping a tag selector (`"hint"`) or a class
//! selector (`".terse"`) to a map of attribute defaults:
//!
//! ```json
//! { "cp": { "captionStyle": "bold" }, ".terse": { "captionStyle": "hidden" } }
//! ```
//!
//! Applying a stylesheet to an element only fills attributes the element does
//! not set itself. Tag selectors are canonicalized like registry keys, so
//! `output-format` and `outputFormat` name the same rule.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::component::canonical_tag;
use crate::element::Element;

/// Attribute defaults for one selector.
pub type Rule = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stylesheet {
    rules: BTreeMap<String, Rule>,
}

/// Outcome of parsing stylesheet text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StylesheetParse {
    Parsed(Stylesheet),
    /// The input was not a JSON object of objects; it is ignored.
    Ignored(String),
}

impl StylesheetParse {
    /// The parsed stylesheet, or an empty one when the input was ignored.
    pub fn or_empty(self) -> Stylesheet {
        match self {
            StylesheetParse::Parsed(sheet) => sheet,
            StylesheetParse::Ignored(_) => Stylesheet::default(),
        }
    }
}

impl Stylesheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON stylesheet.
    pub fn parse(json: &str) -> StylesheetParse {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => match Self::from_value(&value) {
                Some(sheet) => StylesheetParse::Parsed(sheet),
                None => StylesheetParse::Ignored("stylesheet is not a JSON object".to_string()),
            },
            Err(e) => StylesheetParse::Ignored(e.to_string()),
        }
    }

    /// Builds a stylesheet from a JSON object. Selectors whose value is not an
    /// object are skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let Value::Object(map) = value else {
            return None;
        };
        let mut sheet = Self::new();
        for (selector, rule) in map {
            let Value::Object(attrs) = rule else {
                continue;
            };
            for (name, value) in attrs {
                sheet.insert(selector, name, &attr_string(value));
            }
        }
        Some(sheet)
    }

    /// Sets one default. Later inserts replace earlier ones.
    pub fn insert(&mut self, selector: &str, attribute: &str, value: &str) {
        self.rules
            .entry(normalize_selector(selector))
            .or_default()
            .insert(attribute.to_lowercase(), value.to_string());
    }

    /// Merges `other` into `self`; `other` wins on conflicting keys.
    pub fn merge(&mut self, other: Stylesheet) {
        for (selector, rule) in other.rules {
            self.rules.entry(selector).or_default().extend(rule);
        }
    }

    pub fn rule(&self, selector: &str) -> Option<&Rule> {
        self.rules.get(&normalize_selector(selector))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Fills missing attributes on `element`: tag rule first, then one rule
    /// per class in `class`/`classname`.
    pub fn apply(&self, element: &mut Element) {
        if self.rules.is_empty() {
            return;
        }
        if let Some(rule) = self.rule(&element.tag) {
            fill(element, rule);
        }
        for class in element.classes() {
            if let Some(rule) = self.rules.get(&format!(".{}", class)) {
                fill(element, rule);
            }
        }
    }
}

fn fill(element: &mut Element, rule: &Rule) {
    for (name, value) in rule {
        element.fill_default(name, value);
    }
}

fn normalize_selector(selector: &str) -> String {
    let selector = selector.trim();
    if selector.starts_with('.') {
        selector.to_string()
    } else {
        canonical_tag(selector)
    }
}

fn attr_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let sheet = Stylesheet::parse(r#"{"cp": {"captionStyle": "bold"}}"#).or_empty();
        assert_eq!(
            sheet.rule("cp").and_then(|r| r.get("captionstyle")),
            Some(&"bold".to_string())
        );
    }

    #[test]
    fn test_parse_invalid_is_ignored() {
        assert!(matches!(
            Stylesheet::parse("{not json"),
            StylesheetParse::Ignored(_)
        ));
        assert!(matches!(
            Stylesheet::parse("[1, 2]"),
            StylesheetParse::Ignored(_)
        ));
        assert!(Stylesheet::parse("nope").or_empty().is_empty());
    }

    #[test]
    fn test_selector_canonicalization() {
        let sheet = Stylesheet::parse(r#"{"output-format": {"caption": "Out"}}"#).or_empty();
        assert!(sheet.rule("outputFormat").is_some());
        assert!(sheet.rule("OutputFormat").is_some());
    }

    #[test]
    fn test_apply_never_overrides() {
        let sheet = Stylesheet::parse(
            r#"{"hint": {"captionStyle": "bold", "caption": "Tip"}, ".quiet": {"captionStyle": "hidden", "speaker": "x"}}"#,
        )
        .or_empty();
        let mut el = Element::new("hint")
            .with_attr("captionStyle", "plain")
            .with_attr("class", "quiet");
        sheet.apply(&mut el);
        assert_eq!(el.attr("captionstyle"), Some("plain"));
        assert_eq!(el.attr("caption"), Some("Tip"));
        assert_eq!(el.attr("speaker"), Some("x"));
    }

    #[test]
    fn test_tag_rule_fills_before_class_rule() {
        let sheet = Stylesheet::parse(
            r#"{"p": {"captionStyle": "bold"}, ".x": {"captionStyle": "hidden"}}"#,
        )
        .or_empty();
        let mut el = Element::new("p").with_attr("class", "x");
        sheet.apply(&mut el);
        assert_eq!(el.attr("captionstyle"), Some("bold"));
    }

    #[test]
    fn test_merge_later_wins() {
        let mut a = Stylesheet::parse(r#"{"p": {"caption": "A", "x": "1"}}"#).or_empty();
        let b = Stylesheet::parse(r#"{"p": {"caption": "B"}}"#).or_empty();
        a.merge(b);
        let rule = a.rule("p").unwrap();
        assert_eq!(rule.get("caption"), Some(&"B".to_string()));
        assert_eq!(rule.get("x"), Some(&"1".to_string()));
    }

    #[test]
    fn test_non_string_values() {
        let sheet = Stylesheet::parse(r#"{"list": {"indent": 2, "chat": false}}"#).or_empty();
        let rule = sheet.rule("list").unwrap();
        assert_eq!(rule.get("indent"), Some(&"2".to_string()));
        assert_eq!(rule.get("chat"), Some(&"false".to_string()));
    }
}
