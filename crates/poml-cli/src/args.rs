//! Argument value parsers and option loading.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context as _, Result};
use poml::{OutputFormat, Syntax};
use serde_json::{Map, Value};

/// `--format` values: any [`OutputFormat`] name.
pub fn parse_format(s: &str) -> std::result::Result<OutputFormat, String> {
    s.parse::<OutputFormat>().map_err(|e| e.to_string())
}

pub fn parse_syntax(s: &str) -> std::result::Result<Syntax, String> {
    s.parse()
}

/// `--var name=value`. The value is JSON when it parses as JSON, a string
/// otherwise.
pub fn parse_var(s: &str) -> std::result::Result<(String, Value), String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

/// Reads a JSON or YAML file of variables. The top level must be a mapping.
pub fn load_context(path: &Path) -> Result<Map<String, Value>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read context file {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let value: Value = if is_yaml {
        serde_yaml::from_str(&text)
            .with_context(|| format!("invalid YAML in {}", path.display()))?
    } else {
        serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in {}", path.display()))?
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("context file {} must contain a mapping", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("n=3"), Ok(("n".to_string(), json!(3))));
        assert_eq!(parse_var("xs=[1,2]"), Ok(("xs".to_string(), json!([1, 2]))));
        assert_eq!(
            parse_var("name=Ada Lovelace"),
            Ok(("name".to_string(), json!("Ada Lovelace")))
        );
        assert_eq!(parse_var("eq=a=b"), Ok(("eq".to_string(), json!("a=b"))));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=1").is_err());
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("openai-chat"), Ok(OutputFormat::OpenAiChat));
        assert!(parse_format("yaml").unwrap_err().contains("unknown output format"));
    }

    #[test]
    fn test_load_context_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("vars.json");
        fs::write(&json_path, r#"{"topic": "ownership"}"#).unwrap();
        let yaml_path = dir.path().join("vars.yml");
        fs::write(&yaml_path, "topic: borrowing\nlevel: 2\n").unwrap();

        assert_eq!(load_context(&json_path).unwrap().get("topic"), Some(&json!("ownership")));
        let yaml = load_context(&yaml_path).unwrap();
        assert_eq!(yaml.get("topic"), Some(&json!("borrowing")));
        assert_eq!(yaml.get("level"), Some(&json!(2)));
    }

    #[test]
    fn test_load_context_rejects_non_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.json");
        fs::write(&path, "[1, 2]").unwrap();
        let err = load_context(&path).unwrap_err();
        assert!(err.to_string().contains("must contain a mapping"));
    }
}
