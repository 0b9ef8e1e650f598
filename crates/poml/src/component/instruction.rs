//! Captioned instruction components, examples and question/answer blocks.

use super::caption::{caption_or, render_captioned, render_captioned_or_empty, CaptionStyle};
use super::{attr_text, parse_bool, render_children, Component, ComponentRegistry};
use crate::context::{ChatMessage, Context, Role};
use crate::element::Element;
use crate::error::Result;

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register(&["cp", "captioned-paragraph"], Captioned::plain());
    registry.register(&["role"], Captioned::instruction("Role", CaptionStyle::Header));
    registry.register(&["task"], Captioned::instruction("Task", CaptionStyle::Header));
    registry.register(&["hint"], Captioned::instruction("Hint", CaptionStyle::Bold));
    registry.register(
        &["output-format"],
        Captioned::instruction("Output Format", CaptionStyle::Header),
    );
    registry.register(
        &["stepwise-instructions"],
        Captioned::instruction("Stepwise Instructions", CaptionStyle::Header),
    );
    registry.register(&["introducer"], Captioned::section("Introducer", CaptionStyle::Hidden));
    registry.register(&["examples", "example-set"], Examples);
    registry.register(&["example"], Example);
    registry.register(&["input", "example-input"], ExamplePart::new(Role::Human, "Input"));
    registry.register(&["output", "example-output"], ExamplePart::new(Role::Ai, "Output"));
    registry.register(&["qa", "question"], Question);
}

/// A component rendering its children under a fixed default caption.
struct Captioned {
    caption: &'static str,
    default_style: CaptionStyle,
    instruction: bool,
}

impl Captioned {
    /// `cp`: the caption comes from the element alone.
    const fn plain() -> Self {
        Self::section("", CaptionStyle::Header)
    }

    const fn section(caption: &'static str, default_style: CaptionStyle) -> Self {
        Self {
            caption,
            default_style,
            instruction: false,
        }
    }

    /// Marks the document as carrying instructions when rendered.
    const fn instruction(caption: &'static str, default_style: CaptionStyle) -> Self {
        Self {
            caption,
            default_style,
            instruction: true,
        }
    }
}

impl Component for Captioned {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        if self.instruction {
            ctx.mark_instructions();
        }
        let caption = caption_or(element, ctx, self.caption);
        if caption.is_empty() {
            return Ok(render_children(element, ctx)?.trim().to_string());
        }
        render_captioned(element, ctx, &caption, self.default_style)
    }
}

/// Applies an element's `chat` attribute for the duration of `f`.
fn with_chat_attr<T>(
    element: &mut Element,
    ctx: &mut Context,
    f: impl FnOnce(&mut Element, &mut Context) -> Result<T>,
) -> Result<T> {
    let mut scope = ctx.scope();
    if let Some(chat) = element.attr("chat").and_then(parse_bool) {
        scope.set_chat(chat);
    }
    f(element, &mut *scope)
}

/// Renders its examples under one caption. Nothing is rendered when every
/// example turned into chat messages.
struct Examples;

impl Component for Examples {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        with_chat_attr(element, ctx, |element, ctx| {
            let caption = caption_or(element, ctx, "Examples");
            render_captioned_or_empty(element, ctx, &caption, CaptionStyle::Header)
        })
    }
}

struct Example;

impl Component for Example {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        with_chat_attr(element, ctx, |element, ctx| {
            let caption = caption_or(element, ctx, "Example");
            render_captioned_or_empty(element, ctx, &caption, CaptionStyle::Hidden)
        })
    }
}

/// `input`/`output` inside an example: a chat message in chat mode, a bold
/// captioned block otherwise.
struct ExamplePart {
    role: Role,
    caption: &'static str,
}

impl ExamplePart {
    const fn new(role: Role, caption: &'static str) -> Self {
        Self { role, caption }
    }
}

impl Component for ExamplePart {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        if ctx.chat {
            let body = render_children(element, ctx)?;
            ctx.push_chat_message(ChatMessage::new(self.role, body.trim()));
            return Ok(String::new());
        }
        let caption = caption_or(element, ctx, self.caption);
        render_captioned(element, ctx, &caption, CaptionStyle::Bold)
    }
}

/// A question followed by an empty answer caption for the model to fill.
struct Question;

impl Component for Question {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        let question =
            attr_text(element, ctx, "questioncaption").unwrap_or_else(|| "Question".into());
        let answer = attr_text(element, ctx, "answercaption").unwrap_or_else(|| "Answer".into());

        let asked = render_captioned(element, ctx, &question, CaptionStyle::Bold)?;

        let mut prompt = Element::new("answer");
        for key in ["captionstyle", "syntax"] {
            if let Some(value) = element.attr(key) {
                prompt.attributes.insert(key.to_string(), value.to_string());
            }
        }
        let answered = render_captioned(&mut prompt, ctx, &answer, CaptionStyle::Bold)?;

        Ok(match (asked.is_empty(), answered.is_empty()) {
            (_, true) => asked,
            (true, false) => answered,
            (false, false) => format!("{}\n\n{}", asked, answered),
        })
    }
}
