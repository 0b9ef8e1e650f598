//! Message-list construction for chat-shaped encodings.

use tracing::warn;

use crate::context::{ChatMessage, Context, Role};

/// Prefixes that mark a flat-text segment as an assistant turn.
const ASSISTANT_PREFIXES: &[&str] = &["Assistant:", "AI:", "Answer:", "Response:"];

/// The role for a document that produced no structured messages.
///
/// Documents that rendered instruction components (`role`, `task`, `hint`,
/// `output-format`, `stepwise-instructions`) read as a system prompt. Every
/// other document, questions included, is a user turn.
pub(crate) fn flat_role(ctx: &Context) -> Role {
    if ctx.instructions_seen() {
        Role::System
    } else {
        Role::Human
    }
}

/// The document as chat messages.
///
/// Accumulated messages are used verbatim; rendered text outside them is
/// dropped with a warning. Without accumulated messages the text is split
/// into segments.
pub(crate) fn message_list(text: &str, ctx: &Context) -> Vec<ChatMessage> {
    let messages = ctx.chat_messages();
    if !messages.is_empty() {
        if !text.trim().is_empty() {
            warn!(
                chars = text.len(),
                "text outside chat messages is not part of the message list"
            );
        }
        return messages;
    }
    split_segments(text, flat_role(ctx))
}

/// Splits flat text on blank lines, classifying assistant continuations and
/// merging adjacent segments with the same role.
pub(crate) fn split_segments(text: &str, flat: Role) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();
    for segment in text.split("\n\n").map(str::trim).filter(|s| !s.is_empty()) {
        let role = if is_assistant_segment(segment) {
            Role::Ai
        } else {
            flat
        };
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(segment);
            }
            _ => messages.push(ChatMessage::new(role, segment)),
        }
    }
    messages
}

fn is_assistant_segment(segment: &str) -> bool {
    let unmarked = segment.trim_start_matches('*');
    ASSISTANT_PREFIXES
        .iter()
        .any(|prefix| unmarked.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_merges_same_role() {
        let messages = split_segments("one\n\ntwo\n\nAssistant: hi\n\nthree", Role::Human);
        assert_eq!(
            messages,
            vec![
                ChatMessage::new(Role::Human, "one\n\ntwo"),
                ChatMessage::new(Role::Ai, "Assistant: hi"),
                ChatMessage::new(Role::Human, "three"),
            ]
        );
    }

    #[test]
    fn test_bold_answer_label_is_assistant() {
        let messages = split_segments("**Question:** why?\n\n**Answer:**", Role::Human);
        assert_eq!(messages[1].role, Role::Ai);
    }

    #[test]
    fn test_flat_role() {
        let mut ctx = Context::new();
        assert_eq!(flat_role(&ctx), Role::Human);
        ctx.mark_instructions();
        assert_eq!(flat_role(&ctx), Role::System);
    }

    #[test]
    fn test_message_list_prefers_accumulated() {
        let ctx = Context::new();
        ctx.push_chat_message(ChatMessage::new(Role::Ai, "kept"));
        assert_eq!(
            message_list("stray text", &ctx),
            vec![ChatMessage::new(Role::Ai, "kept")]
        );
    }

    #[test]
    fn test_empty_text_has_no_messages() {
        assert!(split_segments("  \n\n ", Role::Human).is_empty());
    }
}
