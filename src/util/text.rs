use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Ellipsis appended by [`truncate_to_width`]
const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Returns the first `max_chars` characters of `s` if it is longer than that.
///
/// `None` means the string already fits. Slicing always lands on a char
/// boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> Option<&str> {
    s.char_indices()
        .nth(max_chars)
        .map(|(byte_idx, _)| &s[..byte_idx])
}

/// Truncates a string to fit within a maximum terminal display width.
///
/// Wide characters (CJK, emoji) count as two columns. When truncation is
/// needed the result ends in `"..."`; widths too narrow for an ellipsis get
/// as many characters as fit.
///
/// # Examples
///
/// ```
/// use newsdesk::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("A longer headline", 10), "A longe...");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width <= ELLIPSIS_WIDTH {
        max_width
    } else {
        max_width - ELLIPSIS_WIDTH
    };

    let mut used = 0;
    let mut out = String::with_capacity(max_width);
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }

    if max_width > ELLIPSIS_WIDTH {
        out.push_str(ELLIPSIS);
    }
    Cow::Owned(out)
}

/// Removes control characters other than newline and tab.
///
/// Titles and descriptions arrive from remote feeds and are echoed to the
/// terminal by the CLI.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect(),
    )
}
