//! Variable, include and stylesheet components.

use std::fs;
use std::path::{Path, PathBuf};

use poml_template::{evaluate, stringify, substitute};
use serde_json::{Number, Value};
use tracing::{debug, warn};

use super::{attr_text, parse_bool, render_nodes, Component, ComponentRegistry};
use crate::context::Context;
use crate::element::Element;
use crate::error::Result;
use crate::parser::{parse, restore_braces};

/// Deepest `include` chain rendered before giving up.
const MAX_INCLUDE_DEPTH: usize = 16;

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register(&["let"], Let);
    registry.register(&["include"], Include);
    registry.register(&["stylesheet"], StylesheetBlock);
}

/// `<let>` writes a variable.
///
/// The value comes from `src` (a JSON, YAML or text file), then `value`
/// (an expression, or the literal text when it does not resolve), then the
/// element body (JSON when it parses, text otherwise). `type` coerces the
/// result. Without `name`, an object value is merged into the variables.
struct Let;

impl Component for Let {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        let Some(value) = let_value(element, ctx) else {
            return Ok(String::new());
        };
        let value = match element.attr("type") {
            Some(ty) => coerce(value, ty),
            None => value,
        };

        match element.attr("name") {
            Some(name) => {
                debug!(name, "let");
                ctx.variables.insert(name.to_string(), value);
            }
            None => match value {
                Value::Object(map) => ctx.variables.extend(map),
                other => warn!(value = %other, "let without a name needs an object value"),
            },
        }
        Ok(String::new())
    }
}

fn let_value(element: &Element, ctx: &Context) -> Option<Value> {
    if let Some(src) = attr_text(element, ctx, "src") {
        let path = resolve_path(ctx, &src);
        return match load_file(&path) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(path = %path.display(), %error, "let source could not be loaded");
                None
            }
        };
    }

    if let Some(raw) = element.attr("value") {
        let restored = restore_braces(raw);
        let value = evaluate(raw, &ctx.variables)
            .or_else(|| {
                // Substituted JSON literals evaluate once their braces are back,
                // but a restored `{{ }}` token is text.
                (!restored.contains("{{"))
                    .then(|| evaluate(&restored, &ctx.variables))
                    .flatten()
            })
            .unwrap_or(Value::String(restored));
        return Some(value);
    }

    let body = restore_braces(&substitute(element.text_content().trim(), &ctx.variables));
    if body.is_empty() {
        return None;
    }
    Some(serde_json::from_str(&body).unwrap_or(Value::String(body)))
}

/// Reads a file as JSON, YAML or plain text by extension.
fn load_file(path: &Path) -> std::result::Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => serde_json::from_str(&text).map_err(|e| e.to_string()),
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text).map_err(|e| e.to_string()),
        _ => Ok(Value::String(text)),
    }
}

pub(super) fn resolve_path(ctx: &Context, src: &str) -> PathBuf {
    let path = PathBuf::from(src);
    match &ctx.base_path {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    }
}

/// Coerces `value` to `ty`: `string`, `number`, `integer`, `boolean`, or
/// `json`/`object`/`array`. Values that do not convert are returned as-is.
pub(super) fn coerce(value: Value, ty: &str) -> Value {
    match ty.trim().to_ascii_lowercase().as_str() {
        "string" | "str" => match value {
            Value::String(_) => value,
            Value::Null => Value::String(String::new()),
            other => stringify(&other).map(Value::String).unwrap_or(other),
        },
        "number" | "float" => match &value {
            Value::String(s) => parse_number(s).unwrap_or(value),
            Value::Bool(b) => Value::from(u8::from(*b)),
            _ => value,
        },
        "integer" | "int" => match &value {
            Value::String(s) => s.trim().parse::<i64>().map(Value::from).unwrap_or(value),
            Value::Number(n) => n.as_f64().map(|f| Value::from(f.trunc() as i64)).unwrap_or(value),
            Value::Bool(b) => Value::from(i64::from(*b)),
            _ => value,
        },
        "boolean" | "bool" => match &value {
            Value::String(s) => parse_bool(s).map(Value::Bool).unwrap_or(value),
            Value::Number(n) => Value::Bool(n.as_f64() != Some(0.0)),
            Value::Null => Value::Bool(false),
            _ => value,
        },
        "json" | "object" | "array" => match &value {
            Value::String(s) => serde_json::from_str(s).unwrap_or(value),
            _ => value,
        },
        other => {
            warn!(kind = other, "unknown value type; keeping value");
            value
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(int) = s.parse::<i64>() {
        return Some(Value::from(int));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// `<include src="...">` renders another file in a forked context.
///
/// Attributes other than `src` are bound as variables in the included
/// document. Instruction components rendered by the included document count
/// for the parent. Read failures render inline as `[Error: ...]`.
struct Include;

impl Component for Include {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        let Some(src) = attr_text(element, ctx, "src") else {
            return Ok("[Error: include requires a src attribute]".to_string());
        };
        if ctx.include_depth >= MAX_INCLUDE_DEPTH {
            warn!(%src, "include nested too deeply");
            return Ok(format!("[Error: include of '{}' nested too deeply]", src));
        }

        let path = resolve_path(ctx, &src);
        let markup = match fs::read_to_string(&path) {
            Ok(markup) => markup,
            Err(error) => {
                warn!(path = %path.display(), %error, "include could not be read");
                return Ok(format!("[Error: failed to include '{}': {}]", src, error));
            }
        };

        let mut child = ctx.fork();
        child.include_depth += 1;
        child.base_path = path.parent().map(Path::to_path_buf);
        for (name, value) in &element.attributes {
            if !matches!(name.as_str(), "src" | "if" | "for" | "syntax") {
                child.variables.insert(name.clone(), Value::String(restore_braces(value)));
            }
        }

        let mut elements = parse(&markup, &mut child);
        let text = render_nodes(&mut elements, &mut child)?;
        if child.instructions_seen() {
            ctx.mark_instructions();
        }
        Ok(text)
    }
}

/// Stylesheet blocks are merged before rendering and produce no output.
struct StylesheetBlock;

impl Component for StylesheetBlock {
    fn render(&self, _element: &mut Element, _ctx: &mut Context) -> Result<String> {
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::render;
    use serde_json::json;
    use std::io::Write;

    fn render_with(markup: &str, ctx: &mut Context) -> String {
        let mut elements = parse(markup, ctx);
        render(&mut elements, ctx).unwrap()
    }

    #[test]
    fn test_let_value_forms() {
        let mut ctx = Context::new();
        let out = render_with(
            r#"<let name="a" value="42"/><let name="b" value="hello world"/><let name="c">{"k": [1, 2]}</let><p>{{a}} {{b}} {{c.k.length}}</p>"#,
            &mut ctx,
        );
        assert_eq!(out, "42 hello world 2");
        assert_eq!(ctx.variables.get("a"), Some(&json!(42)));
        assert_eq!(ctx.variables.get("c"), Some(&json!({"k": [1, 2]})));
    }

    #[test]
    fn test_let_expression_value() {
        let mut ctx = Context::new();
        ctx.variables.insert("items".into(), json!([1, 2, 3]));
        render_with(r#"<let name="copy" value="{{ items }}"/>"#, &mut ctx);
        assert_eq!(ctx.variables.get("copy"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn test_let_without_name_merges() {
        let mut ctx = Context::new();
        render_with(r#"<let>{"x": 1, "y": "two"}</let>"#, &mut ctx);
        assert_eq!(ctx.variables.get("x"), Some(&json!(1)));
        assert_eq!(ctx.variables.get("y"), Some(&json!("two")));
    }

    #[test]
    fn test_let_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("vars.yaml"), "name: Ada\nlangs:\n  - rust\n").unwrap();
        let mut ctx = Context::new();
        ctx.base_path = Some(dir.path().to_path_buf());
        render_with(r#"<let name="cfg" src="vars.yaml"/>"#, &mut ctx);
        assert_eq!(ctx.variables.get("cfg"), Some(&json!({"name": "Ada", "langs": ["rust"]})));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce(json!("3"), "number"), json!(3));
        assert_eq!(coerce(json!("2.5"), "number"), json!(2.5));
        assert_eq!(coerce(json!("nope"), "number"), json!("nope"));
        assert_eq!(coerce(json!(3.9), "integer"), json!(3));
        assert_eq!(coerce(json!("true"), "boolean"), json!(true));
        assert_eq!(coerce(json!(0), "boolean"), json!(false));
        assert_eq!(coerce(json!(7), "string"), json!("7"));
        assert_eq!(coerce(json!("[1]"), "array"), json!([1]));
    }

    #[test]
    fn test_include_renders_in_fork() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("part.poml")).unwrap();
        writeln!(file, "<p>Hello {{{{who}}}}</p><user>from include</user>").unwrap();

        let mut ctx = Context::new();
        ctx.base_path = Some(dir.path().to_path_buf());
        let out = render_with(r#"<include src="part.poml" who="Ada"/>"#, &mut ctx);
        assert_eq!(out, "Hello Ada");
        assert!(!ctx.variables.contains_key("who"));
        assert_eq!(ctx.chat_messages().len(), 1);
    }

    #[test]
    fn test_include_marks_instructions_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("task.poml"), "<task>x</task>").unwrap();
        let mut ctx = Context::new();
        ctx.base_path = Some(dir.path().to_path_buf());
        render_with(r#"<include src="task.poml"/>"#, &mut ctx);
        assert!(ctx.instructions_seen());
    }

    #[test]
    fn test_let_value_with_braces_stays_text() {
        let mut ctx = Context::new();
        ctx.variables.insert("a".into(), json!("{{b}}"));
        ctx.variables.insert("b".into(), json!("LEAK"));
        ctx.variables.insert("obj".into(), json!({"k": 1}));
        render_with(r#"<let name="x" value="{{a}}"/><let name="y" value="{{obj}}"/>"#, &mut ctx);
        assert_eq!(ctx.variables.get("x"), Some(&json!("{{b}}")));
        assert_eq!(ctx.variables.get("y"), Some(&json!({"k": 1})));
    }

    #[test]
    fn test_include_missing_file_renders_error() {
        let mut ctx = Context::new();
        let out = render_with(r#"<include src="does-not-exist.poml"/>"#, &mut ctx);
        assert!(out.starts_with("[Error: failed to include 'does-not-exist.poml'"));
    }

    #[test]
    fn test_self_include_stops() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loop.poml"), r#"<include src="loop.poml"/>"#).unwrap();
        let mut ctx = Context::new();
        ctx.base_path = Some(dir.path().to_path_buf());
        let out = render_with(r#"<include src="loop.poml"/>"#, &mut ctx);
        assert!(out.contains("nested too deeply"));
    }
}
