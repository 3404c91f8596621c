//! Text preparation for TTS: pause markers, unit length, escaping and cleanup.
//!
//! Pure functions, no I/O.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TextError;

/// Inline pause marker: `<break time="1.5s"/>` or `<break time='300ms' />`.
static RE_PAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<break\s+time=["'](\d+(?:\.\d+)?)(ms|s)["']\s*/>"#).unwrap()
});

// Markdown cleanup, applied in order by `strip_markdown`.
static RE_FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static RE_INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static RE_TABLE_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\|?[ \t:|-]*-{3,}[ \t:|-]*\|?[ \t]*$\n?").unwrap());
static RE_HR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[-*_]{3,}[ \t]*$").unwrap());
static RE_BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static RE_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]*").unwrap());
static RE_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]+\)").unwrap());
static RE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static RE_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[-*+][ \t]+").unwrap());
static RE_NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\d+\.[ \t]+").unwrap());
static RE_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*>[ \t]?").unwrap());

// Other cleanup passes.
static RE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").unwrap());
static RE_EMOJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{Extended_Pictographic}\x{FE0F}\x{200D}]").unwrap());
static RE_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+(?:[,\-–]\s*\d+)*\]").unwrap());
static RE_LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*(?:\r\n|\r|\n)+[ \t]*").unwrap());
static RE_MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());

/// Each second of pause costs this many units of the request budget.
pub const PAUSE_UNITS_PER_SECOND: f64 = 11.0;

/// Accepted range for [`pause_marker`], in seconds.
pub const MIN_PAUSE_SECS: f64 = 0.01;
pub const MAX_PAUSE_SECS: f64 = 100.0;

/// Number of characters kept by [`preview_text`] before the ellipsis.
const PREVIEW_CHARS: usize = 7;

// ─── Pause markers ─────────────────────────────────────────────────────────

/// A pause marker found in text.
#[derive(Debug, Clone, PartialEq)]
pub struct PauseMarker {
    /// Byte range of the whole `<break .../>` tag.
    pub span: Range<usize>,
    pub seconds: f64,
}

impl PauseMarker {
    /// Budget cost of this pause.
    pub fn units(&self) -> usize {
        pause_units(self.seconds)
    }
}

/// All pause markers in `text`, in order.
pub fn pause_markers(text: &str) -> Vec<PauseMarker> {
    RE_PAUSE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let value: f64 = caps[1].parse().ok()?;
            let seconds = if &caps[2] == "ms" { value / 1000.0 } else { value };
            Some(PauseMarker {
                span: whole.range(),
                seconds,
            })
        })
        .collect()
}

/// Remove every pause marker, leaving the surrounding text untouched.
pub fn strip_pause_markers(text: &str) -> String {
    RE_PAUSE.replace_all(text, "").into_owned()
}

/// Render a pause marker for `seconds`.
pub fn pause_marker(seconds: f64) -> Result<String, TextError> {
    if !(MIN_PAUSE_SECS..=MAX_PAUSE_SECS).contains(&seconds) {
        return Err(TextError::PauseOutOfRange(seconds));
    }
    Ok(format!("<break time=\"{seconds}s\"/>"))
}

/// Budget cost of a pause of `seconds`, saturating for absurd lengths.
pub fn pause_units(seconds: f64) -> usize {
    (seconds * PAUSE_UNITS_PER_SECOND).round() as usize
}

// ─── Unit length ───────────────────────────────────────────────────────────

/// Weighted width of a character: 1 for ASCII, 2 for everything else.
pub fn char_units(c: char) -> usize {
    if (c as u32) <= 127 { 1 } else { 2 }
}

/// Weighted length of `text` as counted against a provider budget.
///
/// Characters outside pause markers count per [`char_units`]; each marker
/// counts zero characters plus its [`pause_units`]. Saturates at `usize::MAX`.
pub fn unit_length(text: &str) -> usize {
    let mut total: usize = 0;
    let mut cursor = 0;
    for marker in pause_markers(text) {
        total = total
            .saturating_add(text[cursor..marker.span.start].chars().map(char_units).sum())
            .saturating_add(marker.units());
        cursor = marker.span.end;
    }
    total.saturating_add(text[cursor..].chars().map(char_units).sum())
}

// ─── Escaping ──────────────────────────────────────────────────────────────

/// XML-escape text for edge-style providers, keeping pause markers intact.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for marker in pause_markers(text) {
        push_escaped(&mut out, &text[cursor..marker.span.start]);
        out.push_str(&text[marker.span.clone()]);
        cursor = marker.span.end;
    }
    push_escaped(&mut out, &text[cursor..]);
    out
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
}

/// Short label for history lists: markers stripped, first 7 chars + `...`.
pub fn preview_text(text: &str) -> String {
    let clean = strip_pause_markers(text);
    if clean.chars().count() > PREVIEW_CHARS {
        let head: String = clean.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        clean
    }
}

// ─── Cleanup ───────────────────────────────────────────────────────────────

/// Which cleanup passes [`clean_text`] applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CleaningOptions {
    pub remove_markdown: bool,
    pub remove_emoji: bool,
    pub remove_urls: bool,
    pub remove_line_breaks: bool,
    pub remove_citations: bool,
    /// Comma-separated words or phrases to delete verbatim.
    pub custom_keywords: String,
}

impl Default for CleaningOptions {
    fn default() -> Self {
        Self {
            remove_markdown: true,
            remove_emoji: true,
            remove_urls: true,
            remove_line_breaks: true,
            remove_citations: true,
            custom_keywords: String::new(),
        }
    }
}

/// Clean text before synthesis so it reads naturally when spoken.
///
/// Pause markers survive every pass.
pub fn clean_text(text: &str, options: &CleaningOptions) -> String {
    let mut c = text.to_string();

    if options.remove_urls {
        c = RE_URL.replace_all(&c, "").into_owned();
    }
    if options.remove_markdown {
        c = strip_markdown(&c);
    }
    if options.remove_citations {
        c = RE_CITATION.replace_all(&c, "").into_owned();
    }
    if options.remove_emoji {
        c = RE_EMOJI.replace_all(&c, "").into_owned();
    }
    for keyword in options
        .custom_keywords
        .split([',', '，'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        c = c.replace(keyword, "");
    }
    if options.remove_line_breaks {
        c = RE_LINE_BREAKS.replace_all(&c, " ").into_owned();
    }

    c = RE_MULTI_SPACE.replace_all(&c, " ").into_owned();
    c.trim().to_string()
}

/// Strip markdown formatting.
///
/// Handles: fenced code blocks, table rules and pipes, inline code,
/// bold/italic, headings, images, links, quotes, bullets/numbered lists,
/// horizontal rules.
fn strip_markdown(text: &str) -> String {
    let mut c = text.to_string();

    // Fenced code blocks → removed
    c = RE_FENCED_CODE.replace_all(&c, " ").into_owned();
    // Table separator rows → removed, cell pipes → spaces
    c = RE_TABLE_RULE.replace_all(&c, "").into_owned();
    c = c
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 1 {
                trimmed.trim_matches('|').split('|').map(str::trim).collect::<Vec<_>>().join(", ")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    // Inline code → contents
    c = RE_INLINE_CODE.replace_all(&c, "$1").into_owned();
    // Horizontal rules → removed
    c = RE_HR.replace_all(&c, "").into_owned();
    // Bold → plain
    c = RE_BOLD.replace_all(&c, "$1").into_owned();
    // Italic → plain
    c = RE_ITALIC.replace_all(&c, "$1").into_owned();
    // Headings → pound signs removed
    c = RE_HEADING.replace_all(&c, "").into_owned();
    // Images → alt text, links → text only
    c = RE_IMAGE.replace_all(&c, "$1").into_owned();
    c = RE_LINK.replace_all(&c, "$1").into_owned();
    // Quotes, bullets, numbered lists → marker removed
    c = RE_QUOTE.replace_all(&c, "").into_owned();
    c = RE_BULLET.replace_all(&c, "").into_owned();
    c = RE_NUMBERED.replace_all(&c, "").into_owned();

    c
}
