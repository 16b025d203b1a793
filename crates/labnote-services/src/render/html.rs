//! HTML body to plain text, for PDF and CSV output

use labnote_core::AppError;
use regex::{Captures, Regex};
use std::sync::LazyLock;

struct Patterns {
    dropped: Regex,
    list_item: Regex,
    cell_end: Regex,
    block_end: Regex,
    tag: Regex,
    numeric_entity: Regex,
    blank_lines: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            dropped: Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>")?,
            list_item: Regex::new(r"(?i)<li[^>]*>")?,
            cell_end: Regex::new(r"(?i)</t[dh]>")?,
            block_end: Regex::new(
                r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6]|blockquote|pre|table|ul|ol)>",
            )?,
            tag: Regex::new(r"(?s)<[^>]*>")?,
            numeric_entity: Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);")?,
            blank_lines: Regex::new(r"\n[ \t]*\n([ \t]*\n)+")?,
        })
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::compile);

/// Convert an entity body to readable text: block elements become line breaks, list
/// items get a dash, tags are removed and entities decoded.
pub fn html_to_text(html: &str) -> Result<String, AppError> {
    let patterns = PATTERNS
        .as_ref()
        .map_err(|e| AppError::Render(format!("Failed to compile HTML patterns: {}", e)))?;

    let text = patterns.dropped.replace_all(html, "");
    let text = patterns.list_item.replace_all(&text, "- ");
    let text = patterns.cell_end.replace_all(&text, "\t");
    let text = patterns.block_end.replace_all(&text, "\n");
    let text = patterns.tag.replace_all(&text, "");
    let text = decode_entities(&patterns.numeric_entity, &text);
    let text = patterns.blank_lines.replace_all(&text, "\n\n");

    Ok(text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string())
}

fn decode_entities(numeric_entity: &Regex, text: &str) -> String {
    let text = numeric_entity.replace_all(text, |caps: &Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    // &amp; last so that "&amp;lt;" stays "&lt;"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
