//! The per-invocation rendering context.
//!
//! A [`Context`] carries everything components read and write while a
//! document renders: variables, stylesheet defaults, the chat and syntax modes,
//! the current header depth, and the registration buffers that the encoder
//! consumes at the end.
//!
//! # Forking
//!
//! [`Context::fork`] creates an isolated scope for a nested document. The fork
//! owns independent copies of variables, stylesheet, tools, disabled
//! components, schema and runtime parameters, but shares the chat message list
//! and custom metadata with its parent, so messages appended inside an
//! included file still reach the top-level payload.
//!
//! # Scoped changes
//!
//! Temporary changes go through [`ContextScope`], a guard that records the
//! previous value of everything it touches and restores it when dropped:
//!
//! ```rust
//! use poml::Context;
//! use serde_json::json;
//!
//! let mut ctx = Context::new();
//! {
//!     let mut scope = ctx.scope();
//!     scope.deepen();
//!     scope.bind("item", json!(1));
//!     assert_eq!(scope.header_level(), 2);
//! }
//! assert_eq!(ctx.header_level(), 1);
//! assert!(!ctx.variables.contains_key("item"));
//! ```

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::element::Element;
use crate::error::{PomlError, Result};
use crate::parser::restore_braces;
use crate::stylesheet::Stylesheet;

/// Output syntax for dual-mode components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Syntax {
    #[default]
    Markdown,
    Xml,
}

impl Syntax {
    pub fn as_str(self) -> &'static str {
        match self {
            Syntax::Markdown => "markdown",
            Syntax::Xml => "xml",
        }
    }
}

impl FromStr for Syntax {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Syntax::Markdown),
            "xml" => Ok(Syntax::Xml),
            other => Err(format!("unknown syntax '{}'", other)),
        }
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a chat message.
///
/// Serializes with chat-completion role names (`system`, `user`,
/// `assistant`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "user")]
    Human,
    #[serde(rename = "assistant")]
    Ai,
}

impl Role {
    /// Chat-completion role name.
    pub fn api_name(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "user",
            Role::Ai => "assistant",
        }
    }

    /// Short name used in raw envelopes and langchain payloads.
    pub fn short_name(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Ai => "ai",
        }
    }

    /// Label used when a message renders inline.
    pub fn label(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::Human => "Human",
            Role::Ai => "AI",
        }
    }
}

/// One accumulated chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A registered schema or tool parameter payload.
///
/// Bodies that are not JSON are kept verbatim as expressions for the caller to
/// interpret.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemaPayload {
    Json(Value),
    Expression(String),
}

impl SchemaPayload {
    pub fn to_value(&self) -> Value {
        match self {
            SchemaPayload::Json(value) => value.clone(),
            SchemaPayload::Expression(expr) => Value::String(expr.clone()),
        }
    }
}

/// A tool registered by `<tool-definition>` or `<meta type="tool">`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: SchemaPayload,
}

/// Mutable rendering environment for one `process` call.
///
/// `Context` holds its shared buffers in `Rc<RefCell<_>>` and is therefore
/// neither `Send` nor `Sync`.
#[derive(Debug)]
pub struct Context {
    pub variables: Map<String, Value>,
    pub stylesheet: Stylesheet,
    pub chat: bool,
    pub syntax: Option<Syntax>,
    pub response_schema: Option<SchemaPayload>,
    pub tools: Vec<ToolDefinition>,
    pub runtime_parameters: Map<String, Value>,
    pub disabled_components: BTreeSet<String>,
    /// Directory used to resolve relative `include` sources.
    pub base_path: Option<PathBuf>,
    header_level: usize,
    instructions_seen: bool,
    /// Nesting depth of `include` renders.
    pub(crate) include_depth: usize,
    chat_messages: Rc<RefCell<Vec<ChatMessage>>>,
    custom_metadata: Rc<RefCell<Map<String, Value>>>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            variables: Map::new(),
            stylesheet: Stylesheet::default(),
            chat: true,
            syntax: None,
            response_schema: None,
            tools: Vec::new(),
            runtime_parameters: Map::new(),
            disabled_components: BTreeSet::new(),
            base_path: None,
            header_level: 1,
            instructions_seen: false,
            include_depth: 0,
            chat_messages: Rc::new(RefCell::new(Vec::new())),
            custom_metadata: Rc::new(RefCell::new(Map::new())),
        }
    }
}

impl Context {
    /// A fresh context: chat on, header level 1, no syntax override.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn header_level(&self) -> usize {
        self.header_level
    }

    /// The syntax an element renders with: its own `syntax` attribute, then
    /// the context override, then markdown.
    pub fn effective_syntax(&self, element: &Element) -> Syntax {
        element
            .attr("syntax")
            .and_then(|s| s.parse().ok())
            .or(self.syntax)
            .unwrap_or_default()
    }

    /// Isolated nested scope sharing chat messages and custom metadata.
    pub fn fork(&self) -> Context {
        Context {
            variables: self.variables.clone(),
            stylesheet: self.stylesheet.clone(),
            chat: self.chat,
            syntax: self.syntax,
            response_schema: self.response_schema.clone(),
            tools: self.tools.clone(),
            runtime_parameters: self.runtime_parameters.clone(),
            disabled_components: self.disabled_components.clone(),
            base_path: self.base_path.clone(),
            header_level: self.header_level,
            instructions_seen: self.instructions_seen,
            include_depth: self.include_depth,
            chat_messages: Rc::clone(&self.chat_messages),
            custom_metadata: Rc::clone(&self.custom_metadata),
        }
    }

    /// Starts a scope whose changes are undone when it drops.
    pub fn scope(&mut self) -> ContextScope<'_> {
        ContextScope {
            ctx: self,
            saved: Vec::new(),
        }
    }

    // -- chat messages ------------------------------------------------------

    pub fn push_chat_message(&self, mut message: ChatMessage) {
        message.content = restore_braces(&message.content);
        self.chat_messages.borrow_mut().push(message);
    }

    /// Snapshot of the accumulated messages in document order.
    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.chat_messages.borrow().clone()
    }

    pub fn has_chat_messages(&self) -> bool {
        !self.chat_messages.borrow().is_empty()
    }

    // -- metadata -----------------------------------------------------------

    pub fn insert_metadata(&self, key: impl Into<String>, value: Value) {
        self.custom_metadata.borrow_mut().insert(key.into(), value);
    }

    pub fn custom_metadata(&self) -> Map<String, Value> {
        self.custom_metadata.borrow().clone()
    }

    // -- registration -------------------------------------------------------

    /// Registers the document's response schema.
    ///
    /// # Errors
    ///
    /// [`PomlError::DuplicateSchema`] if a schema is already registered.
    pub fn register_schema(&mut self, schema: SchemaPayload) -> Result<()> {
        if self.response_schema.is_some() {
            return Err(PomlError::DuplicateSchema);
        }
        self.response_schema = Some(schema);
        Ok(())
    }

    pub fn register_tool(&mut self, tool: ToolDefinition) {
        self.tools.push(tool);
    }

    pub fn is_disabled(&self, canonical_tag: &str) -> bool {
        self.disabled_components.contains(canonical_tag)
    }

    /// Records that an instruction-style component rendered.
    pub fn mark_instructions(&mut self) {
        self.instructions_seen = true;
    }

    pub fn instructions_seen(&self) -> bool {
        self.instructions_seen
    }
}

enum Restore {
    HeaderLevel(usize),
    Chat(bool),
    Syntax(Option<Syntax>),
    Variable(String, Option<Value>),
}

/// Guard over a [`Context`] that undoes its changes on drop.
///
/// Restores run in reverse order of the changes, so binding the same name
/// twice still leaves the original value in place afterwards. Dropping also
/// happens on early return and during unwinding.
pub struct ContextScope<'a> {
    ctx: &'a mut Context,
    saved: Vec<Restore>,
}

impl ContextScope<'_> {
    /// Increases the header level by one.
    pub fn deepen(&mut self) {
        let level = self.ctx.header_level + 1;
        self.set_header_level(level);
    }

    /// Sets the header level, clamped to at least 1.
    pub fn set_header_level(&mut self, level: usize) {
        self.saved.push(Restore::HeaderLevel(self.ctx.header_level));
        self.ctx.header_level = level.max(1);
    }

    pub fn set_chat(&mut self, chat: bool) {
        self.saved.push(Restore::Chat(self.ctx.chat));
        self.ctx.chat = chat;
    }

    pub fn set_syntax(&mut self, syntax: Option<Syntax>) {
        self.saved.push(Restore::Syntax(self.ctx.syntax));
        self.ctx.syntax = syntax;
    }

    /// Binds a variable for the lifetime of the scope.
    pub fn bind(&mut self, name: &str, value: Value) {
        let previous = self.ctx.variables.insert(name.to_string(), value);
        self.saved.push(Restore::Variable(name.to_string(), previous));
    }
}

impl Deref for ContextScope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for ContextScope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        while let Some(restore) = self.saved.pop() {
            match restore {
                Restore::HeaderLevel(level) => self.ctx.header_level = level,
                Restore::Chat(chat) => self.ctx.chat = chat,
                Restore::Syntax(syntax) => self.ctx.syntax = syntax,
                Restore::Variable(name, Some(value)) => {
                    self.ctx.variables.insert(name, value);
                }
                Restore::Variable(name, None) => {
                    self.ctx.variables.remove(&name);
                }
            }
        }
    }
}
