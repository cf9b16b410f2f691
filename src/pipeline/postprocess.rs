//! Post-processing: deterministic cleanup of extracted text and model output.
//!
//! Two directions need tidying:
//!
//! - **Inbound page text.** pdfium returns text with hard line breaks at every
//!   visual line, hyphen-free but full of runs of spaces and tabs.
//!   [`normalize_page_text`] collapses all whitespace to single spaces so the
//!   summary prompt is compact and identical layouts produce identical prompts.
//!
//! - **Outbound completions.** Even well-prompted models wrap answers in
//!   ```` ```markdown ```` fences, emit `\r\n`, or pad lines.
//!   [`clean_response`] fixes those quirks without touching content; inline
//!   Markdown such as links and images is passed through as written.
//!
//! ## Rule Order
//!
//! Strip fences before normalising line endings so the fence regex sees the
//! raw reply.

use once_cell::sync::Lazy;
use regex::Regex;

/// Collapse every whitespace run (including newlines) to one space.
pub fn normalize_page_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Apply all cleanup rules to a raw completion.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 2+ consecutive blank lines down to 1
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 6. Trim surrounding whitespace
pub fn clean_response(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|text)?\r?\n(.*?)\r?\n```\s*$").expect("static regex")
});

fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_page_text() {
        assert_eq!(
            normalize_page_text("  Annual\treport\n\n2023   results \r\n"),
            "Annual report 2023 results"
        );
        assert_eq!(normalize_page_text(" \n\t "), "");
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(clean_response("```markdown\nA chart.\n```"), "A chart.");
        assert_eq!(clean_response("```\nplain\n```\n"), "plain");
    }

    #[test]
    fn test_inner_fences_survive() {
        let input = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(clean_response(input), input);
    }

    #[test]
    fn test_line_endings_and_trailing_space() {
        assert_eq!(clean_response("a  \r\nb\t\r\n"), "a\nb");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(clean_response("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_image_markdown_is_left_alone() {
        let input = "See ![revenue chart](fig.png) and ![logo](https://cdn.acme.io/logo.png)";
        assert_eq!(clean_response(input), input);
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(clean_response("\u{FEFF}he\u{200B}llo"), "hello");
    }
}
