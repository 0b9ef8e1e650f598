//! Compile POML markup into prompts and chat payloads.
//!
//! POML is a tag-based prompt language. A document is parsed into an element
//! tree, rendered through components that react to a mutable [`Context`]
//! (stylesheets, nesting depth, syntax mode, chat accumulation), and encoded
//! into plain text or a structured chat payload.
//!
//! # Quick start
//!
//! ```rust
//! use poml::{process, OutputFormat, ProcessOptions};
//! use serde_json::json;
//!
//! let markup = r#"
//! <poml>
//!   <role>You are a patient tutor.</role>
//!   <task>Explain {{ topic }} in one paragraph.</task>
//! </poml>"#;
//!
//! let payload = process(
//!     markup,
//!     ProcessOptions::new()
//!         .format(OutputFormat::MessageDict)
//!         .variable("topic", json!("ownership")),
//! )
//! .unwrap();
//!
//! assert_eq!(
//!     payload.into_value(),
//!     json!([{
//!         "role": "system",
//!         "content": "# Role\n\nYou are a patient tutor.\n\n# Task\n\nExplain ownership in one paragraph."
//!     }])
//! );
//! ```
//!
//! # Pipeline
//!
//! | Stage | Entry point | Module |
//! |-------|-------------|--------|
//! | Parse | [`parse`] | [`parser`] |
//! | Render | [`render`] | [`component`] |
//! | Encode | [`encode`] | [`encoder`] |
//!
//! [`process`] runs all three. The `{{ }}` expression language lives in the
//! `poml-template` crate and is re-exported as [`template`].
//!
//! # Chat mode
//!
//! With chat on (the default), `<system>`, `<human>` and `<ai>` elements
//! become chat messages instead of text. Chat-shaped formats
//! ([`OutputFormat::MessageDict`], [`OutputFormat::OpenAiChat`], ...) use
//! those messages directly.

pub mod component;
mod context;
mod element;
pub mod encoder;
mod error;
mod output;
pub mod parser;
mod process;
mod stylesheet;

pub use poml_template as template;

pub use component::{canonical_tag, normalize_schema, render, CaptionStyle, Component};
pub use context::{
    ChatMessage, Context, ContextScope, Role, SchemaPayload, Syntax, ToolDefinition,
};
pub use element::{Element, TEXT_TAG};
pub use encoder::{encode, OutputFormat, Payload};
pub use error::{PomlError, Result};
pub use output::OutputDestination;
pub use parser::parse;
pub use process::{process, Markup, ProcessOptions};
pub use stylesheet::{Rule, Stylesheet, StylesheetParse};
