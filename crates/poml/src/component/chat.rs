//! Chat-role components.
//!
//! In chat mode each role element appends one message and renders nothing.
//! With chat off the message is rendered inline with a role label.

use tracing::debug;

use super::caption::xml_wrap;
use super::{render_children, Component, ComponentRegistry};
use crate::context::{ChatMessage, Context, Role, Syntax};
use crate::element::Element;
use crate::error::Result;

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register(
        &["system", "system-msg", "system-message"],
        RoleMessage(Role::System),
    );
    registry.register(
        &["human", "user", "human-msg", "user-msg", "human-message", "user-message"],
        RoleMessage(Role::Human),
    );
    registry.register(
        &["ai", "assistant", "ai-msg", "assistant-msg", "ai-message", "assistant-message"],
        RoleMessage(Role::Ai),
    );
}

struct RoleMessage(Role);

impl Component for RoleMessage {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        let role = self.0;
        let body = render_children(element, ctx)?;
        let body = body.trim();

        if ctx.chat {
            debug!(role = role.short_name(), "chat message");
            ctx.push_chat_message(ChatMessage::new(role, body));
            return Ok(String::new());
        }

        Ok(match ctx.effective_syntax(element) {
            Syntax::Markdown if body.is_empty() => format!("**{}:**", role.label()),
            Syntax::Markdown => format!("**{}:** {}", role.label(), body),
            Syntax::Xml => xml_wrap(role.short_name(), body),
        })
    }
}
