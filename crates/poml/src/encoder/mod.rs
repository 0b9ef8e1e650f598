//! Final payload encoding.
//!
//! [`encode`] combines the rendered text with what the render left in the
//! [`Context`] (chat messages, schema, tools, runtime parameters, metadata)
//! into one of the [`OutputFormat`]s.

mod chat;

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Map, Value};

use crate::context::{ChatMessage, Context, SchemaPayload};
use crate::error::{PomlError, Result};

use chat::{flat_role, message_list};

/// Target encoding for [`encode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Rendered text; chat documents as `===== role =====` envelopes.
    #[default]
    Raw,
    /// `{content, metadata}`.
    Dict,
    /// `[{role, content}]`.
    MessageDict,
    /// Chat-completion request body with function-style tools.
    OpenAiChat,
    /// `{messages: [{type, data: {content}}]}`.
    Langchain,
    /// `{messages, output_schema, tools, runtime}`.
    Pydantic,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Raw,
        OutputFormat::Dict,
        OutputFormat::MessageDict,
        OutputFormat::OpenAiChat,
        OutputFormat::Langchain,
        OutputFormat::Pydantic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Raw => "raw",
            OutputFormat::Dict => "dict",
            OutputFormat::MessageDict => "message_dict",
            OutputFormat::OpenAiChat => "openai_chat",
            OutputFormat::Langchain => "langchain",
            OutputFormat::Pydantic => "pydantic",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = PomlError;

    /// Accepts the canonical names case-insensitively, with `-` in place of
    /// `_`.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == wanted)
            .ok_or_else(|| PomlError::UnknownFormat(s.to_string()))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encoded document.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Payload::Text(text) => Value::String(text),
            Payload::Json(value) => value,
        }
    }
}

/// Text as-is; JSON pretty-printed.
impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.write_str(text),
            Payload::Json(value) => {
                let pretty = serde_json::to_string_pretty(value).map_err(|_| fmt::Error)?;
                f.write_str(&pretty)
            }
        }
    }
}

/// Encodes rendered `text` and the final `ctx` state as `format`.
///
/// Chat-shaped formats take their messages from `ctx` when any were
/// accumulated. In that case `text` (output rendered outside `<human>`,
/// `<ai>` and `<system>` elements) is not part of the payload and is only
/// reported with a warning. Without accumulated messages, `text` is split
/// into messages by blank lines.
pub fn encode(text: &str, ctx: &Context, format: OutputFormat) -> Result<Payload> {
    let payload = match format {
        OutputFormat::Raw => Payload::Text(raw(text, ctx)),
        OutputFormat::Dict => Payload::Json(dict(text, ctx)?),
        OutputFormat::MessageDict => Payload::Json(serde_json::to_value(message_list(text, ctx))?),
        OutputFormat::OpenAiChat => Payload::Json(openai_chat(text, ctx)),
        OutputFormat::Langchain => Payload::Json(langchain(text, ctx)),
        OutputFormat::Pydantic => Payload::Json(pydantic(text, ctx)?),
    };
    Ok(payload)
}

fn raw(text: &str, ctx: &Context) -> String {
    if !ctx.chat {
        return text.to_string();
    }
    if !ctx.has_chat_messages() {
        let text = text.trim();
        if text.is_empty() {
            return String::new();
        }
        return envelope(&ChatMessage::new(flat_role(ctx), text));
    }
    message_list(text, ctx)
        .iter()
        .map(envelope)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn envelope(message: &ChatMessage) -> String {
    format!(
        "===== {} =====\n\n{}",
        message.role.short_name(),
        message.content
    )
}

fn dict(text: &str, ctx: &Context) -> Result<Value> {
    let content = if ctx.chat && ctx.has_chat_messages() {
        serde_json::to_value(ctx.chat_messages())?
    } else {
        Value::String(text.to_string())
    };

    let mut metadata = ctx.custom_metadata();
    metadata.insert("chat".into(), Value::Bool(ctx.chat));
    metadata.insert(
        "syntax".into(),
        Value::String(ctx.syntax.unwrap_or_default().as_str().to_string()),
    );
    if let Some(schema) = &ctx.response_schema {
        metadata.insert("response_schema".into(), schema.to_value());
    }
    if !ctx.tools.is_empty() {
        metadata.insert("tools".into(), serde_json::to_value(&ctx.tools)?);
    }
    if !ctx.runtime_parameters.is_empty() {
        metadata.insert(
            "runtime_parameters".into(),
            Value::Object(ctx.runtime_parameters.clone()),
        );
    }

    Ok(json!({ "content": content, "metadata": metadata }))
}

fn openai_chat(text: &str, ctx: &Context) -> Value {
    let messages: Vec<Value> = message_list(text, ctx)
        .iter()
        .map(|m| json!({ "role": m.role.api_name(), "content": m.content }))
        .collect();

    let mut body = Map::new();
    body.insert("messages".into(), Value::Array(messages));

    if !ctx.tools.is_empty() {
        let tools = ctx
            .tools
            .iter()
            .map(|tool| {
                let mut function = Map::new();
                function.insert("name".into(), Value::String(tool.name.clone()));
                if let Some(description) = &tool.description {
                    function.insert("description".into(), Value::String(description.clone()));
                }
                function.insert("parameters".into(), tool.parameters.to_value());
                json!({ "type": "function", "function": function })
            })
            .collect();
        body.insert("tools".into(), Value::Array(tools));
    }

    if let Some(SchemaPayload::Json(schema)) = &ctx.response_schema {
        body.insert(
            "response_format".into(),
            json!({
                "type": "json_schema",
                "json_schema": { "name": "schema", "schema": schema, "strict": true }
            }),
        );
    }

    for (key, value) in &ctx.runtime_parameters {
        body.insert(snake_case(key), value.clone());
    }
    Value::Object(body)
}

fn langchain(text: &str, ctx: &Context) -> Value {
    let messages: Vec<Value> = message_list(text, ctx)
        .iter()
        .map(|m| json!({ "type": m.role.short_name(), "data": { "content": m.content } }))
        .collect();
    json!({ "messages": messages })
}

fn pydantic(text: &str, ctx: &Context) -> Result<Value> {
    let messages: Vec<ChatMessage> = message_list(text, ctx);
    Ok(json!({
        "messages": serde_json::to_value(messages)?,
        "output_schema": ctx.response_schema.as_ref().map(SchemaPayload::to_value),
        "tools": serde_json::to_value(&ctx.tools)?,
        "runtime": ctx.runtime_parameters,
    }))
}

/// `maxTokens` becomes `max_tokens`.
fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
