//! Component dispatch and rendering.
//!
//! Every non-text element renders through a [`Component`] looked up in the
//! built-in [`ComponentRegistry`] by its canonical tag. Before a component
//! runs, dispatch applies the behavior shared by all elements, in order:
//!
//! 1. a disabled component renders nothing
//! 2. stylesheet defaults fill missing attributes (tag, then `.class`)
//! 3. a `syntax` attribute scopes the syntax mode for the subtree
//! 4. `for="x in expr"` renders the element once per item
//! 5. `if="expr"` skips the element when false
//!
//! Attribute substitution happens on a per-render copy, so the element tree
//! keeps its `{{ }}` attributes and can be rendered again with new bindings.
//!
//! Rendered siblings are joined as fragments: inline fragments concatenate,
//! block fragments are separated by a blank line.

mod basic;
mod caption;
mod chat;
mod control;
mod instruction;
mod registration;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use poml_template::{evaluate, evaluate_condition, safe_substitute_with, substitute_with};
use serde_json::{json, Value};
use tracing::debug;

use crate::context::Context;
use crate::element::Element;
use crate::error::Result;
use crate::parser::{protect_braces, restore_braces, LOOP_RECORD};

pub use caption::CaptionStyle;
pub use registration::normalize_schema;

/// A rendering unit bound to one or more tags.
pub trait Component: Send + Sync {
    /// Renders `element`, possibly mutating `ctx`.
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String>;

    /// Whether the output flows inline with neighbouring text.
    fn is_inline(&self, _element: &Element) -> bool {
        false
    }
}

/// Maps canonical tag keys to components.
///
/// Aliases of one component share a single boxed instance.
pub struct ComponentRegistry {
    components: Vec<Box<dyn Component>>,
    keys: HashMap<String, usize>,
    fallback: Box<dyn Component>,
}

static BUILTIN: Lazy<ComponentRegistry> = Lazy::new(ComponentRegistry::with_builtins);

impl ComponentRegistry {
    fn new(fallback: impl Component + 'static) -> Self {
        Self {
            components: Vec::new(),
            keys: HashMap::new(),
            fallback: Box::new(fallback),
        }
    }

    /// The process-wide registry of built-in components.
    pub fn builtin() -> &'static ComponentRegistry {
        &BUILTIN
    }

    /// Registers `component` under every alias in `names`.
    fn register(&mut self, names: &[&str], component: impl Component + 'static) {
        let index = self.components.len();
        self.components.push(Box::new(component));
        for name in names {
            self.keys.insert(canonical_tag(name), index);
        }
    }

    /// Whether a tag has a dedicated component.
    pub fn contains(&self, tag: &str) -> bool {
        self.keys.contains_key(&canonical_tag(tag))
    }

    /// The component for `tag`, or the text passthrough for unknown tags.
    pub fn lookup(&self, tag: &str) -> &dyn Component {
        self.keys
            .get(&canonical_tag(tag))
            .and_then(|&index| self.components.get(index))
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    fn with_builtins() -> Self {
        let mut registry = Self::new(basic::Passthrough);
        basic::register(&mut registry);
        instruction::register(&mut registry);
        chat::register(&mut registry);
        control::register(&mut registry);
        registration::register(&mut registry);
        registry
    }
}

/// Canonical registry key: lower-case with `-` and `_` removed.
///
/// ```rust
/// use poml::component::canonical_tag;
///
/// assert_eq!(canonical_tag("output-format"), "outputformat");
/// assert_eq!(canonical_tag("OutputFormat"), "outputformat");
/// assert_eq!(canonical_tag("output_format"), "outputformat");
/// ```
pub fn canonical_tag(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// A rendered piece of output and how it joins its neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fragment {
    pub text: String,
    pub inline: bool,
}

/// Renders sibling elements and joins the results.
pub fn render(elements: &mut [Element], ctx: &mut Context) -> Result<String> {
    render_nodes(elements, ctx).map(|text| restore_braces(&text))
}

/// [`render`] without restoring brace stand-ins, for nested renders.
pub(crate) fn render_nodes(elements: &mut [Element], ctx: &mut Context) -> Result<String> {
    let mut fragments = Vec::new();
    for element in elements.iter_mut() {
        fragments.extend(render_fragments(element, ctx)?);
    }
    Ok(join(&fragments))
}

/// Renders one element into zero or more fragments. A looped element yields
/// one fragment per iteration.
pub(crate) fn render_fragments(element: &mut Element, ctx: &mut Context) -> Result<Vec<Fragment>> {
    if element.is_text() {
        let text = substitute_with(&element.content, &ctx.variables, protect_braces);
        return Ok(vec![Fragment { text, inline: true }]);
    }

    let key = canonical_tag(&element.tag);
    if ctx.is_disabled(&key) {
        debug!(tag = %element.tag, "component disabled");
        return Ok(Vec::new());
    }

    let registry = ComponentRegistry::builtin();
    let component = registry.lookup(&key);
    ctx.stylesheet.apply(element);

    let mut scope = ctx.scope();
    if let Some(syntax) = element.attr("syntax").and_then(|s| s.parse().ok()) {
        scope.set_syntax(Some(syntax));
    }

    let mut fragments = Vec::new();
    match element.attr("for").map(str::to_string) {
        Some(clause) => {
            let Some((name, items)) = loop_items(&clause, &scope) else {
                return Ok(fragments);
            };
            let length = items.len();
            for (index, item) in items.into_iter().enumerate() {
                let mut iteration = scope.scope();
                iteration.bind(&name, item);
                iteration.bind(
                    LOOP_RECORD,
                    json!({
                        "index": index + 1,
                        "index0": index,
                        "length": length,
                        "first": index == 0,
                        "last": index + 1 == length,
                    }),
                );
                let mut instance = element.clone();
                instance.attributes.remove("for");
                if let Some(fragment) = render_instance(&mut instance, component, &mut iteration)? {
                    fragments.push(fragment);
                }
            }
        }
        None => {
            if let Some(fragment) = render_instance(element, component, &mut scope)? {
                fragments.push(fragment);
            }
        }
    }
    Ok(fragments)
}

/// Checks `if` and runs the component with substituted attributes.
///
/// The element's own attributes are put back afterwards.
fn render_instance(
    element: &mut Element,
    component: &dyn Component,
    ctx: &mut Context,
) -> Result<Option<Fragment>> {
    let resolved = element
        .attributes
        .iter()
        .map(|(name, value)| {
            let value = if name != "if" && name != "for" && value.contains("{{") {
                safe_substitute_with(value, &ctx.variables, protect_braces)
            } else {
                value.clone()
            };
            (name.clone(), value)
        })
        .collect();
    let original = std::mem::replace(&mut element.attributes, resolved);
    let rendered = render_resolved(element, component, ctx);
    element.attributes = original;
    rendered
}

fn render_resolved(
    element: &mut Element,
    component: &dyn Component,
    ctx: &mut Context,
) -> Result<Option<Fragment>> {
    if let Some(condition) = element.attr("if") {
        if !evaluate_condition(condition, &ctx.variables) {
            debug!(tag = %element.tag, condition, "condition false; skipping");
            return Ok(None);
        }
    }

    let inline = component.is_inline(element);
    let text = component.render(element, ctx)?;
    Ok(Some(Fragment { text, inline }))
}

/// Parses `name in expr` and evaluates the items. Non-arrays iterate zero
/// times.
fn loop_items(clause: &str, ctx: &Context) -> Option<(String, Vec<Value>)> {
    let clause = clause.trim();
    let (name, expr) = clause.split_once(char::is_whitespace)?;
    let expr = expr.trim_start().strip_prefix("in")?;
    if !expr.starts_with(char::is_whitespace) {
        return None;
    }
    match evaluate(expr, &ctx.variables) {
        Some(Value::Array(items)) => Some((name.to_string(), items)),
        other => {
            debug!(clause, ?other, "loop source is not an array");
            None
        }
    }
}

/// Joins fragments: inline pieces concatenate, blocks get a blank line.
///
/// Whitespace-only inline fragments are kept so `<br/>` can emit a newline.
pub(crate) fn join(fragments: &[Fragment]) -> String {
    let mut out = String::new();
    let mut previous_inline = true;

    for fragment in fragments {
        if fragment.text.is_empty() || (!fragment.inline && fragment.text.trim().is_empty()) {
            continue;
        }
        if out.is_empty() {
            out.push_str(if fragment.inline {
                &fragment.text
            } else {
                fragment.text.trim()
            });
        } else if fragment.inline && previous_inline {
            out.push_str(&fragment.text);
        } else {
            let kept = out.trim_end().len();
            out.truncate(kept);
            out.push_str("\n\n");
            out.push_str(fragment.text.trim_start());
        }
        previous_inline = fragment.inline;
    }

    out.trim_end().to_string()
}

/// Renders an element's children.
pub(crate) fn render_children(element: &mut Element, ctx: &mut Context) -> Result<String> {
    render_nodes(&mut element.children, ctx)
}

/// Reads an attribute with full substitution against the current variables.
pub(crate) fn attr_text(element: &Element, ctx: &Context, name: &str) -> Option<String> {
    element
        .attr(name)
        .map(|value| substitute_with(value, &ctx.variables, protect_braces))
}

/// Parses a boolean attribute value.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str, inline: bool) -> Fragment {
        Fragment {
            text: text.to_string(),
            inline,
        }
    }

    #[test]
    fn test_canonical_tag_folds_variants() {
        assert_eq!(canonical_tag("stepwise-instructions"), "stepwiseinstructions");
        assert_eq!(canonical_tag("StepwiseInstructions"), "stepwiseinstructions");
        assert_eq!(canonical_tag("system_msg"), "systemmsg");
    }

    #[test]
    fn test_registry_lookup_uses_canonical_keys() {
        let registry = ComponentRegistry::builtin();
        assert!(registry.contains("output-format"));
        assert!(registry.contains("OutputFormat"));
        assert!(registry.contains("human-msg"));
        assert!(!registry.contains("made-up-tag"));
    }

    #[test]
    fn test_join_inline_and_block() {
        let joined = join(&[
            frag("Hello ", true),
            frag("**there**", true),
            frag("# Title\n\nBody", false),
            frag("tail", true),
        ]);
        assert_eq!(joined, "Hello **there**\n\n# Title\n\nBody\n\ntail");
    }

    #[test]
    fn test_join_skips_empty() {
        let joined = join(&[frag("a", false), frag("", false), frag("  ", false), frag("b", false)]);
        assert_eq!(joined, "a\n\nb");
    }

    #[test]
    fn test_join_keeps_inline_newline() {
        let joined = join(&[frag("one", true), frag("\n", true), frag("two", true)]);
        assert_eq!(joined, "one\ntwo");
    }

    #[test]
    fn test_loop_items() {
        let mut ctx = Context::new();
        ctx.variables.insert("xs".into(), json!([1, 2]));
        let (name, items) = loop_items("x in xs", &ctx).unwrap();
        assert_eq!(name, "x");
        assert_eq!(items, vec![json!(1), json!(2)]);
        assert!(loop_items("x in missing", &ctx).is_none());
        assert!(loop_items("x of xs", &ctx).is_none());
        assert!(loop_items("x in {{xs}}", &ctx).is_some());
    }

    #[test]
    fn test_rerender_sees_rebound_attribute() {
        let mut ctx = Context::new();
        let mut elements = crate::parser::parse(r#"<cp caption="{{v}}">body</cp>"#, &mut ctx);

        ctx.variables.insert("v".into(), json!("one"));
        assert_eq!(render(&mut elements, &mut ctx).unwrap(), "# one\n\nbody");
        assert_eq!(elements[0].attr("caption"), Some("{{v}}"));

        ctx.variables.insert("v".into(), json!("two"));
        assert_eq!(render(&mut elements, &mut ctx).unwrap(), "# two\n\nbody");
    }

    #[test]
    fn test_attribute_value_is_not_expanded_twice() {
        let mut ctx = Context::new();
        let mut elements = crate::parser::parse(r#"<cp caption="{{a}}">body</cp>"#, &mut ctx);
        ctx.variables.insert("a".into(), json!("{{b}}"));
        ctx.variables.insert("b".into(), json!("LEAK"));
        assert_eq!(render(&mut elements, &mut ctx).unwrap(), "# {{b}}\n\nbody");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
