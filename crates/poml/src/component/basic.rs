//! Leaf and structural formatting components.

use super::caption::{render_captioned, xml_wrap, CaptionStyle};
use super::{attr_text, parse_bool, render_children, render_fragments, Component, ComponentRegistry};
use crate::context::{Context, Syntax};
use crate::element::Element;
use crate::error::Result;

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register(&["poml", "loop", "document"], Passthrough);
    registry.register(&["p", "paragraph"], Paragraph);
    registry.register(&["span", "inline"], Span);
    registry.register(&["b", "bold", "strong"], Emphasis::new("**", "b"));
    registry.register(&["i", "italic", "em"], Emphasis::new("*", "i"));
    registry.register(&["u", "underline"], Emphasis::new("__", "u"));
    registry.register(&["s", "strike", "strikethrough"], Emphasis::new("~~", "s"));
    registry.register(&["code"], Code);
    registry.register(&["h", "header"], Header);
    registry.register(&["br", "newline"], LineBreak);
    registry.register(&["section"], Section);
    registry.register(&["list"], List);
    registry.register(&["item", "listitem"], Paragraph);
}

/// Renders children unchanged. Also used for unknown tags.
pub(super) struct Passthrough;

impl Component for Passthrough {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        render_children(element, ctx)
    }
}

struct Paragraph;

impl Component for Paragraph {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        Ok(render_children(element, ctx)?.trim().to_string())
    }
}

struct Span;

impl Component for Span {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        render_children(element, ctx)
    }

    fn is_inline(&self, _element: &Element) -> bool {
        true
    }
}

/// Inline emphasis: a markdown marker pair or an XML tag.
struct Emphasis {
    marker: &'static str,
    xml_tag: &'static str,
}

impl Emphasis {
    const fn new(marker: &'static str, xml_tag: &'static str) -> Self {
        Self { marker, xml_tag }
    }
}

impl Component for Emphasis {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        let body = render_children(element, ctx)?;
        let body = body.trim();
        if body.is_empty() {
            return Ok(String::new());
        }
        Ok(match ctx.effective_syntax(element) {
            Syntax::Markdown => format!("{m}{body}{m}", m = self.marker),
            Syntax::Xml => format!("<{t}>{body}</{t}>", t = self.xml_tag),
        })
    }

    fn is_inline(&self, _element: &Element) -> bool {
        true
    }
}

/// `code`: inline span or fenced block.
///
/// `inline="true|false"` decides explicitly; otherwise single-line content
/// is inline.
struct Code;

impl Component for Code {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        let inline = self.is_inline(element);
        let body = render_children(element, ctx)?;
        let lang = attr_text(element, ctx, "lang").unwrap_or_default();

        Ok(match (ctx.effective_syntax(element), inline) {
            (Syntax::Markdown, true) => {
                let ticks = if body.contains('`') { "``" } else { "`" };
                format!("{ticks}{body}{ticks}")
            }
            (Syntax::Markdown, false) => format!("```{}\n{}\n```", lang, body.trim_matches('\n')),
            (Syntax::Xml, _) if lang.is_empty() => xml_wrap("code", &body),
            (Syntax::Xml, _) => format!("<code lang=\"{}\">{}</code>", lang, body),
        })
    }

    fn is_inline(&self, element: &Element) -> bool {
        element
            .attr("inline")
            .and_then(parse_bool)
            .unwrap_or_else(|| !element.text_content().contains('\n'))
    }
}

/// A heading at the current header level.
struct Header;

impl Component for Header {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        let body = render_children(element, ctx)?;
        let body = body.trim();
        Ok(match ctx.effective_syntax(element) {
            Syntax::Markdown => format!("{} {}", "#".repeat(ctx.header_level()), body),
            Syntax::Xml => xml_wrap("h", body),
        })
    }
}

struct LineBreak;

impl Component for LineBreak {
    fn render(&self, _element: &mut Element, _ctx: &mut Context) -> Result<String> {
        Ok("\n".to_string())
    }

    fn is_inline(&self, _element: &Element) -> bool {
        true
    }
}

/// Captioned when `caption` is set, otherwise a nesting level for headers.
struct Section;

impl Component for Section {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        if let Some(caption) = attr_text(element, ctx, "caption") {
            return render_captioned(element, ctx, &caption, CaptionStyle::Header);
        }
        let mut scope = ctx.scope();
        scope.deepen();
        render_children(element, &mut scope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListStyle {
    Dash,
    Star,
    Plus,
    Decimal,
}

impl ListStyle {
    fn from_attr(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("star") => ListStyle::Star,
            Some("plus") => ListStyle::Plus,
            Some("decimal") => ListStyle::Decimal,
            _ => ListStyle::Dash,
        }
    }

    fn marker(self, index: usize) -> String {
        match self {
            ListStyle::Dash => "- ".to_string(),
            ListStyle::Star => "* ".to_string(),
            ListStyle::Plus => "+ ".to_string(),
            ListStyle::Decimal => format!("{}. ", index + 1),
        }
    }
}

/// Each rendered child (or loop iteration) becomes one item.
struct List;

impl Component for List {
    fn render(&self, element: &mut Element, ctx: &mut Context) -> Result<String> {
        let style = ListStyle::from_attr(element.attr("liststyle"));
        let syntax = ctx.effective_syntax(element);

        let mut items = Vec::new();
        for child in element.children.iter_mut() {
            for fragment in render_fragments(child, ctx)? {
                let text = fragment.text.trim();
                if !text.is_empty() {
                    items.push(text.to_string());
                }
            }
        }
        if items.is_empty() {
            return Ok(String::new());
        }

        let lines: Vec<String> = match syntax {
            Syntax::Markdown => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let marker = style.marker(index);
                    format!("{}{}", marker, indent_continuation(item, marker.len()))
                })
                .collect(),
            Syntax::Xml => items.iter().map(|item| xml_wrap("item", item)).collect(),
        };

        Ok(match syntax {
            Syntax::Markdown => lines.join("\n"),
            Syntax::Xml => format!("<list>\n{}\n</list>", lines.join("\n")),
        })
    }
}

/// Indents every line after the first by `width` spaces. Blank lines stay
/// empty.
fn indent_continuation(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    let mut lines = text.lines();
    let mut out = lines.next().unwrap_or_default().to_string();
    for line in lines {
        out.push('\n');
        if !line.is_empty() {
            out.push_str(&pad);
            out.push_str(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::render;
    use crate::parser::parse;
    use serde_json::json;

    fn render_markup(markup: &str) -> String {
        let mut ctx = Context::new();
        render_with(markup, &mut ctx)
    }

    fn render_with(markup: &str, ctx: &mut Context) -> String {
        let mut elements = parse(markup, ctx);
        render(&mut elements, ctx).unwrap()
    }

    #[test]
    fn test_emphasis_markdown_and_xml() {
        assert_eq!(
            render_markup("<p>Very <b>bold</b> and <i>slanted</i></p>"),
            "Very **bold** and *slanted*"
        );
        assert_eq!(
            render_markup(r#"<p syntax="xml">a <b>b</b></p>"#),
            "a <b>b</b>"
        );
    }

    #[test]
    fn test_code_inline_and_fenced() {
        assert_eq!(render_markup("<p>Run <code>ls</code> now</p>"), "Run `ls` now");
        assert_eq!(
            render_markup("<code lang=\"sh\">\necho a\necho b\n</code>"),
            "```sh\necho a\necho b\n```"
        );
        assert_eq!(
            render_markup(r#"<code inline="false">x</code>"#),
            "```\nx\n```"
        );
    }

    #[test]
    fn test_header_tracks_section_depth() {
        assert_eq!(
            render_markup("<h>Top</h><section><h>Inner</h></section>"),
            "# Top\n\n## Inner"
        );
    }

    #[test]
    fn test_list_styles() {
        assert_eq!(
            render_markup("<list><item>a</item><item>b</item></list>"),
            "- a\n- b"
        );
        assert_eq!(
            render_markup(r#"<list listStyle="decimal"><item>a</item><item>b</item></list>"#),
            "1. a\n2. b"
        );
    }

    #[test]
    fn test_list_over_loop() {
        let mut ctx = Context::new();
        ctx.variables.insert("xs".into(), json!(["x", "y"]));
        assert_eq!(
            render_with(r#"<list><item for="v in xs">{{v}}</item></list>"#, &mut ctx),
            "- x\n- y"
        );
    }

    #[test]
    fn test_list_xml() {
        assert_eq!(
            render_markup(r#"<list syntax="xml"><item>a</item></list>"#),
            "<list>\n<item>a</item>\n</list>"
        );
    }

    #[test]
    fn test_line_break() {
        assert_eq!(render_markup("<p>one<br/>two</p>"), "one\ntwo");
    }

    #[test]
    fn test_unknown_tag_passes_through() {
        assert_eq!(render_markup("<custom-thing>kept</custom-thing>"), "kept");
    }

    #[test]
    fn test_indent_continuation() {
        assert_eq!(indent_continuation("a\n\nb", 2), "a\n\n  b");
    }
}
