//! Markup compositor.
//!
//! Turns a flat message string plus a set of offset-based style spans into
//! nested, escaped HTML limited to the Telegram tag vocabulary
//! (`b i code pre a s blockquote`). Spans arrive in UTF-16 code units, may
//! overlap without proper containment, and may be malformed; the compositor
//! maps offsets, drops unusable spans, emits boundary events in a
//! deterministic order, and runs the assembled markup through a tolerant
//! repair pass. On repair failure the output degrades to fully escaped plain
//! text instead of propagating an error.

mod offset;
mod repair;

pub use offset::map_utf16_offset;

use std::fmt::Write as _;

/// Base URL for mention links.
const MENTION_BASE_URL: &str = "https://t.me";

/// Style span kind, mirroring the source protocol's entity types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanKind {
    Bold,
    Italic,
    Code,
    Pre { language: Option<String> },
    /// Link with an explicit target URL.
    TextLink { url: String },
    /// Bare URL; the matched text is the target.
    Url,
    /// `@username` mention; wrapped only when a non-empty username follows.
    Mention,
    /// Recognized but intentionally unwrapped.
    Hashtag,
    Strikethrough,
    Blockquote,
}

/// One contiguous styled run, in UTF-16 code units as declared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSpan {
    pub kind: SpanKind,
    pub offset: u32,
    pub length: u32,
}

/// Compositor output: the markup string plus whether composition (including
/// the repair pass) succeeded. When `markup_valid` is false, `html` holds
/// the fully escaped plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedText {
    pub html: String,
    pub markup_valid: bool,
}

enum Boundary {
    /// Full opening markup, attributes included.
    Open(String),
    /// Closing tag name.
    Close(&'static str),
}

/// Composes `text` and `spans` into nested HTML.
///
/// Deterministic for a fixed input: no randomness, no clock. Spans that map
/// out of bounds or to an empty range are dropped silently (malformed
/// upstream data, not an error).
pub fn compose(text: &str, spans: &[StyleSpan]) -> RenderedText {
    if text.is_empty() {
        return RenderedText {
            html: String::new(),
            markup_valid: true,
        };
    }

    let mut events: Vec<(usize, Boundary)> = Vec::with_capacity(spans.len() * 2);
    for span in spans {
        let start = map_utf16_offset(text, span.offset);
        let end = map_utf16_offset(text, span.offset.saturating_add(span.length));
        if start >= text.len() || end <= start {
            continue;
        }
        if let Some((open, close)) = boundary_tags(&span.kind, &text[start..end]) {
            events.push((start, Boundary::Open(open)));
            events.push((end, Boundary::Close(close)));
        }
    }

    if events.is_empty() {
        return RenderedText {
            html: escape_text(text),
            markup_valid: true,
        };
    }

    // A tag ending exactly where another begins must close first; the sort
    // is stable so same-class events keep span order.
    events.sort_by_key(|(pos, boundary)| (*pos, u8::from(matches!(boundary, Boundary::Open(_)))));

    let mut assembled = String::with_capacity(text.len() * 2);
    let mut last_pos = 0;
    for (pos, boundary) in &events {
        if *pos > last_pos {
            assembled.push_str(&escape_text(&text[last_pos..*pos]));
        }
        match boundary {
            Boundary::Open(markup) => assembled.push_str(markup),
            Boundary::Close(tag) => {
                let _ = write!(assembled, "</{tag}>");
            }
        }
        last_pos = *pos;
    }
    if last_pos < text.len() {
        assembled.push_str(&escape_text(&text[last_pos..]));
    }

    match repair::repair(&assembled) {
        Some(html) => RenderedText {
            html,
            markup_valid: true,
        },
        None => {
            tracing::warn!("markup repair failed, falling back to escaped plain text");
            RenderedText {
                html: escape_text(text),
                markup_valid: false,
            }
        }
    }
}

/// Opening markup and closing tag name for a span, or None when the span
/// produces no wrapping element (hashtags, mentions without a username,
/// links without a target).
fn boundary_tags(kind: &SpanKind, span_text: &str) -> Option<(String, &'static str)> {
    match kind {
        SpanKind::Bold => Some(("<b>".to_string(), "b")),
        SpanKind::Italic => Some(("<i>".to_string(), "i")),
        SpanKind::Code => Some(("<code>".to_string(), "code")),
        SpanKind::Pre { language } => {
            let open = match language.as_deref().filter(|lang| !lang.is_empty()) {
                Some(lang) => format!("<pre language=\"{}\">", escape_attr(lang)),
                None => "<pre>".to_string(),
            };
            Some((open, "pre"))
        }
        SpanKind::TextLink { url } => {
            if url.is_empty() {
                return None;
            }
            Some((format!("<a href=\"{}\">", escape_attr(url)), "a"))
        }
        SpanKind::Url => Some((format!("<a href=\"{}\">", escape_attr(span_text)), "a")),
        SpanKind::Mention => {
            let username = span_text.strip_prefix('@').filter(|name| !name.is_empty())?;
            Some((
                format!("<a href=\"{MENTION_BASE_URL}/{}\">", escape_attr(username)),
                "a",
            ))
        }
        SpanKind::Hashtag => None,
        SpanKind::Strikethrough => Some(("<s>".to_string(), "s")),
        SpanKind::Blockquote => Some(("<blockquote>".to_string(), "blockquote")),
    }
}

/// Escapes a literal text segment for interpolation between tags.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escapes an attribute value (URLs, language names) independently of the
/// surrounding text escaping.
fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
