//! The caption-style contract shared by sectioning components.

use std::str::FromStr;

use deunicode::deunicode;

use super::{attr_text, render_children};
use crate::context::{Context, Syntax};
use crate::element::Element;
use crate::error::Result;

/// How a caption is placed in markdown output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptionStyle {
    /// `# Caption` followed by the content; children render one level deeper.
    #[default]
    Header,
    /// `**Caption:** content`
    Bold,
    /// `Caption: content`
    Plain,
    /// Content only.
    Hidden,
}

impl FromStr for CaptionStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" => Ok(CaptionStyle::Header),
            "bold" => Ok(CaptionStyle::Bold),
            "plain" => Ok(CaptionStyle::Plain),
            "hidden" => Ok(CaptionStyle::Hidden),
            other => Err(format!("unknown caption style '{}'", other)),
        }
    }
}

/// Renders `element`'s children under `caption`.
///
/// The element's `captionstyle` overrides `default_style`, and
/// `captiontexttransform` (`upper`, `lower`, `capitalize`) reshapes the
/// caption text. An empty body still renders the caption.
pub(crate) fn render_captioned(
    element: &mut Element,
    ctx: &mut Context,
    caption: &str,
    default_style: CaptionStyle,
) -> Result<String> {
    captioned(element, ctx, caption, default_style, true)
}

/// Like [`render_captioned`], but renders nothing when the body is empty.
pub(crate) fn render_captioned_or_empty(
    element: &mut Element,
    ctx: &mut Context,
    caption: &str,
    default_style: CaptionStyle,
) -> Result<String> {
    captioned(element, ctx, caption, default_style, false)
}

fn captioned(
    element: &mut Element,
    ctx: &mut Context,
    caption: &str,
    default_style: CaptionStyle,
    keep_empty: bool,
) -> Result<String> {
    let caption = transform_caption(caption, element.attr("captiontexttransform"));
    let style = element
        .attr("captionstyle")
        .and_then(|s| s.parse().ok())
        .unwrap_or(default_style);
    let syntax = ctx.effective_syntax(element);
    let level = ctx.header_level();

    let body = if syntax == Syntax::Markdown && style == CaptionStyle::Header {
        let mut scope = ctx.scope();
        scope.deepen();
        render_children(element, &mut scope)?
    } else {
        render_children(element, ctx)?
    };
    if body.is_empty() && !keep_empty {
        return Ok(body);
    }

    Ok(match (syntax, style) {
        (Syntax::Xml, _) => xml_wrap(&slug(&caption), &body),
        (Syntax::Markdown, CaptionStyle::Header) => {
            let heading = format!("{} {}", "#".repeat(level), caption);
            if body.is_empty() {
                heading
            } else {
                format!("{}\n\n{}", heading, body)
            }
        }
        (Syntax::Markdown, CaptionStyle::Bold) => prefixed(&format!("**{}:**", caption), &body),
        (Syntax::Markdown, CaptionStyle::Plain) => prefixed(&format!("{}:", caption), &body),
        (Syntax::Markdown, CaptionStyle::Hidden) => body,
    })
}

/// The element's `caption` attribute or `fallback`, substituted.
pub(crate) fn caption_or(element: &Element, ctx: &Context, fallback: &str) -> String {
    attr_text(element, ctx, "caption").unwrap_or_else(|| fallback.to_string())
}

fn prefixed(label: &str, body: &str) -> String {
    if body.is_empty() {
        label.to_string()
    } else {
        format!("{} {}", label, body)
    }
}

/// `<tag>body</tag>`, or `<tag/>` when the body is empty.
pub(crate) fn xml_wrap(tag: &str, body: &str) -> String {
    if body.is_empty() {
        format!("<{}/>", tag)
    } else if body.contains('\n') {
        format!("<{tag}>\n{body}\n</{tag}>")
    } else {
        format!("<{tag}>{body}</{tag}>")
    }
}

/// XML tag name for a caption: transliterated, lower-cased, dash-separated.
pub(crate) fn slug(caption: &str) -> String {
    let transliterated = deunicode(caption).to_lowercase();
    let mut slug = String::with_capacity(transliterated.len());
    for c in transliterated.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    match slug.chars().next() {
        None => "section".to_string(),
        // XML names cannot start with a digit.
        Some(c) if c.is_ascii_digit() => format!("section-{}", slug),
        Some(_) => slug.to_string(),
    }
}

fn transform_caption(caption: &str, transform: Option<&str>) -> String {
    match transform.map(str::to_ascii_lowercase).as_deref() {
        Some("upper") => caption.to_uppercase(),
        Some("lower") => caption.to_lowercase(),
        Some("capitalize") => {
            let mut chars = caption.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
        _ => caption.to_string(),
    }
}
