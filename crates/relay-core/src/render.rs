//! Renderer: turns fetched items into plain text and batches them.
//!
//! Renderers are pure and total: a missing optional field becomes a
//! placeholder, never an error, so rendering cannot fail a cycle.

use regex::Regex;
use std::sync::LazyLock;

/// Maps one item to a human-readable text block.
pub trait Renderer<I>: Send + Sync {
    fn render(&self, item: &I) -> String;
}

impl<I, F> Renderer<I> for F
where
    F: Fn(&I) -> String + Send + Sync,
{
    fn render(&self, item: &I) -> String {
        self(item)
    }
}

// ---------------------------------------------------------------------------
// Batch assembly
// ---------------------------------------------------------------------------

/// Shape of the single outbound message built from a cycle's items.
///
/// `header` is required and may use `{count}`; `footer` is appended after the
/// last block when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFormat {
    pub header: String,
    pub footer: Option<String>,
}

impl Default for BatchFormat {
    fn default() -> Self {
        Self {
            header: "You have {count} new notifications:".to_string(),
            footer: None,
        }
    }
}

impl BatchFormat {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            footer: None,
        }
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into()).filter(|f: &String| !f.trim().is_empty());
        self
    }

    /// Join already-rendered blocks (newest first) under the count header.
    pub fn assemble(&self, blocks: &[String]) -> String {
        let mut out = self.header.replace("{count}", &blocks.len().to_string());
        out.push_str("\n\n");
        out.push_str(&blocks.join("\n\n"));
        if let Some(footer) = &self.footer {
            out.push_str("\n\n");
            out.push_str(footer);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Markup stripping
// ---------------------------------------------------------------------------

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p>\s*<p[^>]*>").expect("static regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("static regex"));

static NAMED_ENTITIES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "amp" => "&",
    "lt" => "<",
    "gt" => ">",
    "quot" => "\"",
    "apos" => "'",
    "nbsp" => "\u{a0}",
    "hellip" => "\u{2026}",
    "mdash" => "\u{2014}",
    "ndash" => "\u{2013}",
    "lsquo" => "\u{2018}",
    "rsquo" => "\u{2019}",
    "ldquo" => "\u{201c}",
    "rdquo" => "\u{201d}",
    "copy" => "\u{a9}",
};

/// Reduce upstream HTML to plain text.
///
/// Paragraph and `<br>` boundaries become newlines, every other tag is
/// dropped, then character references are decoded. Unknown entities are kept
/// verbatim.
pub fn strip_markup(html: &str) -> String {
    let text = LINE_BREAK.replace_all(html, "\n");
    let text = TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        decode_entity(name).unwrap_or_else(|| caps[0].to_string())
    });
    text.trim().to_string()
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    NAMED_ENTITIES.get(name).map(|s| s.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
