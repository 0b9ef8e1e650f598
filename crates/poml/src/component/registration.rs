//! Components that register schemas, tools, runtime parameters and metadata
//! instead of producing text.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::control::coerce;
use super::{canonical_tag, parse_bool, Component, ComponentRegistry};
use crate::context::{Context, SchemaPayload, ToolDefinition};
use crate::element::Element;
use crate::error::Result;
use crate::parser::restore_braces;

/// Attributes that steer dispatch and never become data.
const DISPATCH_ATTRIBUTES: &[&str] = &["if", "for", "syntax", "class", "classname"];

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register(&["output-schema", "response-schema"], OutputSchema);
    registry.register(&["tool-definition", "tool"], Tool);
    registry.register(&["meta"], Meta);
    registry.register(&["runtime"], Runtime);
}

/// A registration body after classification.
#[derive(Debug, Clone, PartialEq)]
enum Body {
    Json(Value),
    /// Non-JSON text kept verbatim for the caller to evaluate.
    Expression(String),
    /// Looked like JSON (or was forced to) but failed to parse.
    Invalid(String),
    Empty,
}

impl Body {
    /// Classifies the element body. `parser="json"` or `parser="expr"`
    /// forces a mode; otherwise bodies starting with `{` or `[` are JSON.
    fn of(element: &Element) -> Self {
        let body = restore_braces(&element.text_content());
        let body = body.trim();
        if body.is_empty() {
            return Body::Empty;
        }

        let forced = element.attr("parser").map(str::to_ascii_lowercase);
        let as_json = match forced.as_deref() {
            Some("json") => true,
            Some("expr") | Some("eval") | Some("expression") => false,
            _ => body.starts_with('{') || body.starts_with('['),
        };

        if !as_json {
            return Body::Expression(body.to_string());
        }
        match serde_json::from_str(body) {
            Ok(value) => Body::Json(value),
            Err(e) => Body::Invalid(e.to_string()),
        }
    }

    /// Converts to a schema, normalizing JSON unless `normalize="false"`.
    fn into_schema(self, element: &Element) -> Option<SchemaPayload> {
        match self {
            Body::Json(value) => {
                let rename = element.attr("normalize").and_then(parse_bool).unwrap_or(true);
                Some(SchemaPayload::Json(walk_schema(value, rename)))
            }
            Body::Expression(expr) => Some(SchemaPayload::Expression(expr)),
            Body::Invalid(reason) => {
                warn!(tag = %element.tag, %reason, "ignoring invalid JSON payload");
                None
            }
            Body::Empty => None,
        }
    }
}

/// `<output-schema>`: the document's response schema. A second one is an
/// error.
struct OutputSchema;

impl Component for OutputSchema {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        match Body::of(element).into_schema(element) {
            Some(schema) => ctx.register_schema(schema)?,
            None => debug!("output schema without a usable body"),
        }
        Ok(String::new())
    }
}

/// `<tool-definition name="..." description="...">` with a parameter schema
/// body.
struct Tool;

impl Component for Tool {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        let Some(name) = element.attr("name").map(restore_braces) else {
            warn!("tool definition without a name; skipping");
            return Ok(String::new());
        };
        let parameters = match Body::of(element) {
            Body::Empty => SchemaPayload::Json(json!({"type": "object", "properties": {}})),
            other => match other.into_schema(element) {
                Some(schema) => schema,
                None => return Ok(String::new()),
            },
        };
        ctx.register_tool(ToolDefinition {
            name,
            description: element.attr("description").map(restore_braces),
            parameters,
        });
        Ok(String::new())
    }
}

/// `<meta>`: delegates by `type`, toggles components, or records custom
/// metadata from its attributes.
struct Meta;

impl Component for Meta {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        if let Some(kind) = element.attr("type").map(canonical_tag) {
            return match kind.as_str() {
                "responseschema" | "outputschema" | "schema" => OutputSchema.render(element, ctx),
                "tool" | "tooldefinition" => Tool.render(element, ctx),
                "runtime" => Runtime.render(element, ctx),
                other => {
                    warn!(kind = other, "unknown meta type");
                    Ok(String::new())
                }
            };
        }

        for (name, value) in &element.attributes {
            if name == "components" {
                toggle_components(value, ctx);
            } else if !DISPATCH_ATTRIBUTES.contains(&name.as_str()) {
                ctx.insert_metadata(name.clone(), Value::String(restore_braces(value)));
            }
        }
        Ok(String::new())
    }
}

/// Applies `-name` (disable) and `+name`/`name` (enable) entries.
fn toggle_components(entries: &str, ctx: &mut Context) {
    for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if let Some(name) = entry.strip_prefix('-') {
            ctx.disabled_components.insert(canonical_tag(name));
        } else {
            let name = entry.strip_prefix('+').unwrap_or(entry);
            ctx.disabled_components.remove(&canonical_tag(name));
        }
    }
}

/// `<runtime>`: model parameters from attributes and an optional JSON body.
struct Runtime;

impl Component for Runtime {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        for (name, value) in &element.attributes {
            if DISPATCH_ATTRIBUTES.contains(&name.as_str()) || matches!(name.as_str(), "type" | "parser")
            {
                continue;
            }
            ctx.runtime_parameters
                .insert(camel_case(name), runtime_value(value));
        }

        match Body::of(element) {
            Body::Json(Value::Object(map)) => {
                for (key, value) in map {
                    ctx.runtime_parameters.insert(camel_case(&key), value);
                }
            }
            Body::Empty => {}
            Body::Invalid(reason) => warn!(%reason, "ignoring invalid runtime body"),
            other => warn!(payload = ?other, "runtime body must be a JSON object"),
        }
        Ok(String::new())
    }
}

/// A runtime attribute value: boolean, number or JSON when it parses as one.
fn runtime_value(raw: &str) -> Value {
    let raw = restore_braces(raw);
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.parse::<f64>().is_ok() {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return value;
        }
    }
    Value::String(raw)
}

/// `first-name` becomes `firstName`.
pub(crate) fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '-' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Normalizes a JSON schema: hyphenated property names become camelCase
/// (also in `required`), and `convert` directives coerce string defaults.
///
/// ```rust
/// use poml::component::normalize_schema;
/// use serde_json::json;
///
/// let schema = json!({
///     "type": "object",
///     "properties": {"first-name": {"type": "string"}},
///     "required": ["first-name"]
/// });
/// assert_eq!(
///     normalize_schema(schema),
///     json!({
///         "type": "object",
///         "properties": {"firstName": {"type": "string"}},
///         "required": ["firstName"]
///     })
/// );
/// ```
pub fn normalize_schema(schema: Value) -> Value {
    walk_schema(schema, true)
}

fn walk_schema(schema: Value, rename: bool) -> Value {
    let Value::Object(map) = schema else {
        return schema;
    };
    let mut out = Map::with_capacity(map.len());
    let mut convert = None;

    for (key, value) in map {
        let value = match key.as_str() {
            "convert" => {
                convert = value.as_str().map(str::to_string);
                continue;
            }
            "properties" => match value {
                Value::Object(props) => Value::Object(
                    props
                        .into_iter()
                        .map(|(name, prop)| {
                            let name = if rename { camel_case(&name) } else { name };
                            (name, walk_schema(prop, rename))
                        })
                        .collect(),
                ),
                other => other,
            },
            "required" if rename => match value {
                Value::Array(names) => Value::Array(
                    names
                        .into_iter()
                        .map(|name| match name {
                            Value::String(s) => Value::String(camel_case(&s)),
                            other => other,
                        })
                        .collect(),
                ),
                other => other,
            },
            "items" | "additionalProperties" | "not" => walk_nested(value, rename),
            "anyOf" | "oneOf" | "allOf" | "prefixItems" => walk_nested(value, rename),
            "$defs" | "definitions" => match value {
                Value::Object(defs) => Value::Object(
                    defs.into_iter()
                        .map(|(name, def)| (name, walk_schema(def, rename)))
                        .collect(),
                ),
                other => other,
            },
            _ => value,
        };
        out.insert(key, value);
    }

    if let Some(kind) = convert {
        if let Some(default) = out.remove("default") {
            let converted = match default {
                Value::String(_) => coerce(default, &kind),
                other => other,
            };
            out.insert("default".to_string(), converted);
        }
    }
    Value::Object(out)
}

/// Walks a schema or an array of schemas.
fn walk_nested(value: Value, rename: bool) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(|v| walk_schema(v, rename)).collect()),
        other => walk_schema(other, rename),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::render;
    use crate::error::PomlError;
    use crate::parser::parse;

    fn render_result(markup: &str, ctx: &mut Context) -> Result<String> {
        let mut elements = parse(markup, ctx);
        render(&mut elements, ctx)
    }

    #[test]
    fn test_output_schema_registers_normalized() {
        let mut ctx = Context::new();
        let out = render_result(
            r#"<output-schema>{"type": "object", "properties": {"full-name": {"type": "string"}}}</output-schema>"#,
            &mut ctx,
        )
        .unwrap();
        assert_eq!(out, "");
        assert_eq!(
            ctx.response_schema,
            Some(SchemaPayload::Json(json!({
                "type": "object",
                "properties": {"fullName": {"type": "string"}}
            })))
        );
    }

    #[test]
    fn test_normalize_false_keeps_keys() {
        let mut ctx = Context::new();
        render_result(
            r#"<output-schema normalize="false">{"properties": {"full-name": {}}}</output-schema>"#,
            &mut ctx,
        )
        .unwrap();
        assert_eq!(
            ctx.response_schema,
            Some(SchemaPayload::Json(json!({"properties": {"full-name": {}}})))
        );
    }

    #[test]
    fn test_expression_body_kept_verbatim() {
        let mut ctx = Context::new();
        render_result("<output-schema>z.object({ a: z.string() })</output-schema>", &mut ctx).unwrap();
        assert_eq!(
            ctx.response_schema,
            Some(SchemaPayload::Expression("z.object({ a: z.string() })".into()))
        );
    }

    #[test]
    fn test_invalid_json_ignored() {
        let mut ctx = Context::new();
        render_result("<output-schema>{ not json</output-schema>", &mut ctx).unwrap();
        assert!(ctx.response_schema.is_none());
    }

    #[test]
    fn test_duplicate_schema_errors() {
        let mut ctx = Context::new();
        let err = render_result(
            r#"<output-schema>{"type": "string"}</output-schema><meta type="responseSchema">{"type": "number"}</meta>"#,
            &mut ctx,
        )
        .unwrap_err();
        assert!(matches!(err, PomlError::DuplicateSchema));
    }

    #[test]
    fn test_tool_definition() {
        let mut ctx = Context::new();
        render_result(
            r#"<tool-definition name="search" description="Web search">{"type": "object", "properties": {"query": {"type": "string"}}}</tool-definition><tool>{}</tool>"#,
            &mut ctx,
        )
        .unwrap();
        assert_eq!(ctx.tools.len(), 1);
        assert_eq!(ctx.tools[0].name, "search");
        assert_eq!(ctx.tools[0].description.as_deref(), Some("Web search"));
    }

    #[test]
    fn test_meta_components_and_metadata() {
        let mut ctx = Context::new();
        let out = render_result(
            r#"<meta components="-hint"/><meta author="ada"/><hint>hidden</hint><p>shown</p>"#,
            &mut ctx,
        )
        .unwrap();
        assert_eq!(out, "shown");
        assert_eq!(ctx.custom_metadata().get("author"), Some(&json!("ada")));

        toggle_components("+hint", &mut ctx);
        assert!(!ctx.is_disabled("hint"));
    }

    #[test]
    fn test_runtime_parameters() {
        let mut ctx = Context::new();
        render_result(
            r#"<runtime temperature="0.2" max-tokens="256" stream="false" model="gpt"/><meta type="runtime">{"top-p": 0.9}</meta>"#,
            &mut ctx,
        )
        .unwrap();
        assert_eq!(ctx.runtime_parameters.get("temperature"), Some(&json!(0.2)));
        assert_eq!(ctx.runtime_parameters.get("maxTokens"), Some(&json!(256)));
        assert_eq!(ctx.runtime_parameters.get("stream"), Some(&json!(false)));
        assert_eq!(ctx.runtime_parameters.get("model"), Some(&json!("gpt")));
        assert_eq!(ctx.runtime_parameters.get("topP"), Some(&json!(0.9)));
    }

    #[test]
    fn test_convert_directive() {
        let schema = json!({
            "properties": {
                "flag": {"type": "boolean", "default": "true", "convert": "boolean"},
                "count": {"type": "number", "default": "3", "convert": "number"},
                "opts": {"type": "object", "default": "{\"a\": 1}", "convert": "json"}
            }
        });
        assert_eq!(
            walk_schema(schema, false),
            json!({
                "properties": {
                    "flag": {"type": "boolean", "default": true},
                    "count": {"type": "number", "default": 3},
                    "opts": {"type": "object", "default": {"a": 1}}
                }
            })
        );
    }

    #[test]
    fn test_normalize_nested() {
        let schema = json!({
            "type": "array",
            "items": {
                "anyOf": [{"properties": {"a-b": {}}, "required": ["a-b"]}]
            }
        });
        assert_eq!(
            normalize_schema(schema),
            json!({
                "type": "array",
                "items": {
                    "anyOf": [{"properties": {"aB": {}}, "required": ["aB"]}]
                }
            })
        );
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("max-tokens"), "maxTokens");
        assert_eq!(camel_case("already"), "already");
        assert_eq!(camel_case("-lead"), "lead");
    }

    #[test]
    fn test_runtime_value() {
        assert_eq!(runtime_value("true"), json!(true));
        assert_eq!(runtime_value("12"), json!(12));
        assert_eq!(runtime_value("[1, 2]"), json!([1, 2]));
        assert_eq!(runtime_value("text"), json!("text"));
    }
}
