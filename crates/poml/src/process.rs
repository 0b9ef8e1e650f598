//! The `process` entry point: parse, render and encode in one call.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::component::render;
use crate::context::{Context, Syntax};
use crate::encoder::{encode, OutputFormat, Payload};
use crate::error::{PomlError, Result};
use crate::output::OutputDestination;
use crate::parser::parse;
use crate::stylesheet::{Stylesheet, StylesheetParse};

/// Markup input: source text or a file to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    /// Markup text. A single line naming an existing file is read instead.
    Source(String),
    File(PathBuf),
}

impl From<&str> for Markup {
    fn from(source: &str) -> Self {
        Markup::Source(source.to_string())
    }
}

impl From<String> for Markup {
    fn from(source: String) -> Self {
        Markup::Source(source)
    }
}

impl From<&Path> for Markup {
    fn from(path: &Path) -> Self {
        Markup::File(path.to_path_buf())
    }
}

impl From<PathBuf> for Markup {
    fn from(path: PathBuf) -> Self {
        Markup::File(path)
    }
}

impl TryFrom<&Value> for Markup {
    type Error = PomlError;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::String(source) => Ok(Markup::Source(source.clone())),
            other => Err(PomlError::InvalidMarkup(format!(
                "expected markup text or a file path, got {}",
                json_kind(other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Markup {
    /// Returns the markup text and, when it came from a file, that file's
    /// directory.
    fn load(self) -> Result<(String, Option<PathBuf>)> {
        let path = match self {
            Markup::Source(source) => match source_path(&source) {
                Some(path) => path,
                None => return Ok((source, None)),
            },
            Markup::File(path) => path,
        };
        debug!(path = %path.display(), "reading markup file");
        let text = fs::read_to_string(&path).map_err(|e| PomlError::io(&path, e))?;
        Ok((text, path.parent().map(Path::to_path_buf)))
    }
}

/// The path named by single-line source text, if that file exists.
fn source_path(source: &str) -> Option<PathBuf> {
    let candidate = source.trim();
    if candidate.is_empty() || candidate.contains('\n') || candidate.contains('<') {
        return None;
    }
    let path = PathBuf::from(candidate);
    path.is_file().then_some(path)
}

/// Options for [`process`].
///
/// ```rust
/// use poml::{process, OutputFormat, ProcessOptions};
/// use serde_json::json;
///
/// let options = ProcessOptions::new()
///     .format(OutputFormat::Raw)
///     .chat(false)
///     .variable("name", json!("Ada"));
/// let payload = process("<p>Hello {{ name }}</p>", options).unwrap();
/// assert_eq!(payload.to_string(), "Hello Ada");
/// ```
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub format: OutputFormat,
    pub variables: Map<String, Value>,
    pub stylesheet: Stylesheet,
    pub chat: bool,
    /// Default syntax. A `<poml syntax="...">` container overrides it.
    pub syntax: Option<Syntax>,
    /// Write the payload here and return empty text instead.
    pub output_file: Option<PathBuf>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            variables: Map::new(),
            stylesheet: Stylesheet::default(),
            chat: true,
            syntax: None,
            output_file: None,
        }
    }
}

impl ProcessOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Replaces all variables.
    pub fn variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Binds one variable.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn stylesheet(mut self, stylesheet: Stylesheet) -> Self {
        self.stylesheet = stylesheet;
        self
    }

    /// Sets the stylesheet from JSON text. Invalid JSON is logged and ignored.
    pub fn stylesheet_json(mut self, json: &str) -> Self {
        match Stylesheet::parse(json) {
            StylesheetParse::Parsed(sheet) => self.stylesheet = sheet,
            StylesheetParse::Ignored(reason) => warn!(%reason, "ignoring stylesheet option"),
        }
        self
    }

    pub fn chat(mut self, chat: bool) -> Self {
        self.chat = chat;
        self
    }

    pub fn syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = Some(syntax);
        self
    }

    pub fn output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }
}

/// Compiles markup into a payload.
///
/// # Errors
///
/// - [`PomlError::Io`] when a markup file cannot be read or the output file
///   cannot be written
/// - [`PomlError::DuplicateSchema`] when the document registers two response
///   schemas
/// - [`PomlError::Serialization`] when the payload cannot be serialized
///
/// Everything else inside the document degrades into text.
pub fn process(markup: impl Into<Markup>, options: ProcessOptions) -> Result<Payload> {
    let (source, base_path) = markup.into().load()?;

    let mut ctx = Context::new().with_variables(options.variables);
    ctx.stylesheet = options.stylesheet;
    ctx.chat = options.chat;
    ctx.syntax = options.syntax;
    ctx.base_path = base_path;

    let mut elements = parse(&source, &mut ctx);
    debug!(elements = elements.len(), "parsed markup");
    let text = render(&mut elements, &mut ctx)?;
    let payload = encode(&text, &ctx, options.format)?;

    match options.output_file {
        Some(path) => {
            debug!(path = %path.display(), format = %options.format, "writing payload");
            OutputDestination::File(path).write_text(&payload.to_string())?;
            Ok(Payload::Text(String::new()))
        }
        None => Ok(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_markup_conversions() {
        assert_eq!(Markup::from("<p/>"), Markup::Source("<p/>".into()));
        assert_eq!(
            Markup::from(Path::new("a.poml")),
            Markup::File(PathBuf::from("a.poml"))
        );
        assert_eq!(
            Markup::try_from(&json!("<p/>")).unwrap(),
            Markup::Source("<p/>".into())
        );
        let err = Markup::try_from(&json!(42)).unwrap_err();
        assert!(matches!(err, PomlError::InvalidMarkup(msg) if msg.contains("a number")));
    }

    #[test]
    fn test_source_naming_a_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.poml");
        fs::write(&path, "<p>from disk</p>").unwrap();

        let (text, base) = Markup::from(path.to_string_lossy().into_owned()).load().unwrap();
        assert_eq!(text, "<p>from disk</p>");
        assert_eq!(base.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = process(Path::new("/definitely/not/here.poml"), ProcessOptions::new()).unwrap_err();
        assert!(matches!(err, PomlError::Io { .. }));
    }

    #[test]
    fn test_stylesheet_json_option() {
        let options = ProcessOptions::new().stylesheet_json(r#"{"cp": {"captionStyle": "bold"}}"#);
        assert!(!options.stylesheet.is_empty());
        let ignored = ProcessOptions::new().stylesheet_json("{ nope");
        assert!(ignored.stylesheet.is_empty());
    }

    #[test]
    fn test_output_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("prompt.json");
        let payload = process(
            "<p>Hi</p>",
            ProcessOptions::new()
                .format(OutputFormat::MessageDict)
                .output_file(&out),
        )
        .unwrap();
        assert_eq!(payload, Payload::Text(String::new()));
        let written: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written, json!([{"role": "user", "content": "Hi"}]));
    }
}
