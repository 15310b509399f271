//! Post-processing for extracted article text.
//!
//! Scrape output still carries site chrome: navigation headings, menu
//! links, footer boilerplate. [`clean_content`] strips the common cases and
//! normalizes whitespace so stored bodies read cleanly.

use crate::util::truncate_chars;

/// Appended when cleaned content exceeds the length limit
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated]";

/// Heading words that mark site chrome rather than article structure.
const CHROME_HEADINGS: &[&str] = &[
    "navigation",
    "main navigation",
    "site navigation",
    "nav",
    "menu",
    "main menu",
    "site menu",
    "footer",
    "skip to content",
    "skip to main content",
];

/// List items that are boilerplate site links when they stand alone.
const BOILERPLATE_ITEMS: &[&str] = &[
    "home",
    "about",
    "about us",
    "contact",
    "contact us",
    "privacy",
    "privacy policy",
];

/// Exact lines left behind by blog comment widgets and themes.
const SCAFFOLDING_LINES: &[&str] = &["Menu", "Loading Comments...", "Write a Comment...", "%d"];

/// Clean extracted text for storage.
///
/// Whitespace runs collapse to a single space, boilerplate lines are
/// dropped, blank-line runs collapse to one blank line and the result is
/// trimmed. Output longer than `max_len` characters is cut and suffixed with
/// [`TRUNCATION_MARKER`].
pub fn clean_content(text: &str, max_len: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = false;

    for raw in text.lines() {
        let line = collapse_horizontal_whitespace(raw);
        if is_boilerplate(&line) {
            continue;
        }

        // Keeping at most one blank line between paragraphs is the same as
        // collapsing three or more newlines to two.
        let blank = line.is_empty();
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;
        lines.push(line);
    }

    let joined = lines.join("\n");
    let cleaned = joined.trim();

    match truncate_chars(cleaned, max_len) {
        Some(head) => {
            tracing::debug!(max_len, "Truncating extracted content");
            format!("{}{}", head.trim_end(), TRUNCATION_MARKER)
        }
        None => cleaned.to_string(),
    }
}

/// Collapse runs of spaces/tabs to one space and trim the line end.
fn collapse_horizontal_whitespace(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_run = false;
    for c in line.chars() {
        if c == ' ' || c == '\t' || c == '\u{a0}' {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out.truncate(out.trim_end().len());
    out
}

fn is_boilerplate(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }

    if SCAFFOLDING_LINES.contains(&trimmed)
        || trimmed.starts_with("[Skip to content]")
        || trimmed.contains("Proudly powered by WordPress")
    {
        return true;
    }

    is_chrome_heading(trimmed) || is_bare_link(trimmed) || is_boilerplate_item(trimmed)
}

/// `# Navigation`, `## Footer`, `### Main menu` and friends
fn is_chrome_heading(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('#') else {
        return false;
    };
    let text = rest.trim_start_matches('#').trim();
    let text = text.trim_end_matches(':').to_lowercase();
    CHROME_HEADINGS.contains(&text.as_str())
}

/// A line consisting only of a markdown link or a URL
fn is_bare_link(line: &str) -> bool {
    if line.starts_with("http://") || line.starts_with("https://") {
        return !line.contains(char::is_whitespace);
    }
    markdown_link_text(line).is_some_and(|(_, rest)| rest.is_empty())
}

/// `* Home`, `- [About us](/about)`, `+ Privacy Policy`
fn is_boilerplate_item(line: &str) -> bool {
    let Some(item) = line
        .strip_prefix(['*', '-', '+'])
        .filter(|rest| rest.starts_with(' '))
        .map(str::trim)
    else {
        return false;
    };

    let label = match markdown_link_text(item) {
        Some((text, rest)) if rest.is_empty() => text,
        Some(_) => return false,
        None => item,
    };
    BOILERPLATE_ITEMS.contains(&label.trim().to_lowercase().as_str())
}

/// Split `[text](target)rest` into `(text, rest)`.
fn markdown_link_text(line: &str) -> Option<(&str, &str)> {
    let inner = line.strip_prefix('[')?;
    let close = inner.find("](")?;
    let text = &inner[..close];
    let after = &inner[close + 2..];
    let end = after.find(')')?;
    Some((text, after[end + 1..].trim()))
}
