// Context-sensitive escaping for Markdown serialization.
//
// Escapes the characters that would otherwise start Markdown constructs when
// the output is re-parsed. Phrasing context escapes the common set; link
// text additionally escapes `]`, which would close the bracket early.

use std::sync::LazyLock;

use regex::Regex;

static NEEDS_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\\`*_\[\]!&<]|~~").unwrap());

/// Math placeholder tokens (including the degraded form without sigils)
/// must survive serialization byte-for-byte so the restorer can find them.
static MATH_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:%%)?MATH_PLACEHOLDER_\d+(?:%%)?").unwrap());

/// Escape special Markdown characters in inline text, leaving math
/// placeholder tokens untouched.
///
/// `in_link_text` adds `]` to the escape set. Outside links a standalone `]`
/// is harmless, and escaping it globally would corrupt the task-list
/// checkbox syntax (`[x]`, `[ ]`) the list serializer emits.
pub(crate) fn escape_text(text: &str, in_link_text: bool) -> String {
    if !MATH_PLACEHOLDER.is_match(text) {
        return escape_segment(text, in_link_text);
    }
    let mut result = String::with_capacity(text.len() + 8);
    let mut last = 0;
    for token in MATH_PLACEHOLDER.find_iter(text) {
        result.push_str(&escape_segment(&text[last..token.start()], in_link_text));
        result.push_str(token.as_str());
        last = token.end();
    }
    result.push_str(&escape_segment(&text[last..], in_link_text));
    result
}

fn escape_segment(text: &str, in_link_text: bool) -> String {
    // Fast path: nothing that could need escaping.
    if !NEEDS_ESCAPE.is_match(text) {
        return text.to_string();
    }

    // Byte indexing is sound here: every matched character is single-byte
    // ASCII, so the offsets always land on UTF-8 boundaries.
    let mut result = String::with_capacity(text.len() + 8);
    let mut last = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        let escape = match b {
            b'\\' | b'[' | b'_' | b'*' | b'`' | b'<' => true,
            b']' => in_link_text,
            // `~` only triggers GFM strikethrough as `~~`; escape the first
            // of each pair.
            b'~' => bytes.get(i + 1) == Some(&b'~'),
            // `!` only matters before `[` (potential image).
            b'!' => bytes.get(i + 1) == Some(&b'['),
            // `&` before alphanumerics or `#` reads as a character reference.
            b'&' => matches!(
                bytes.get(i + 1),
                Some(b'#') | Some(b'A'..=b'Z') | Some(b'a'..=b'z')
            ),
            _ => false,
        };

        if escape {
            result.push_str(&text[last..i]);
            result.push('\\');
            last = i;
        }
    }

    result.push_str(&text[last..]);
    result
}

/// Escape the first character of a block when it would trigger a construct
/// at a line break: ATX markers, blockquotes, list markers, setext
/// underlines, fences, and ordered-list numbers.
pub(crate) fn escape_at_break_start(mut content: String) -> String {
    let bytes = content.as_bytes();
    if bytes.is_empty() {
        return content;
    }

    let first = bytes[0];
    let second = bytes.get(1).copied();

    let needs_escape = match first {
        b'#' | b'>' => true,
        b'*' => second.map_or(true, |c| matches!(c, b' ' | b'\t' | b'\r' | b'\n' | b'*')),
        b'+' => second.map_or(true, |c| matches!(c, b' ' | b'\t' | b'\r' | b'\n')),
        b'-' => second.map_or(true, |c| matches!(c, b' ' | b'\t' | b'\r' | b'\n' | b'-')),
        b'=' => second.map_or(true, |c| matches!(c, b' ' | b'\t')),
        b'_' => second == Some(b'_'),
        b'`' => second == Some(b'`'),
        b'~' => second == Some(b'~'),
        b'<' => second.is_some_and(|c| matches!(c, b'!' | b'/' | b'?') || c.is_ascii_alphabetic()),
        _ => false,
    };

    if needs_escape {
        content.insert(0, '\\');
        return content;
    }

    // Ordered list marker: digits then `.` or `)` then whitespace or end.
    // Insert the backslash before the delimiter.
    if first.is_ascii_digit() {
        let mut j = 1;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j < bytes.len() && (bytes[j] == b'.' || bytes[j] == b')') {
            let after = bytes.get(j + 1);
            if after.is_none() || matches!(after, Some(b' ' | b'\t' | b'\r' | b'\n')) {
                content.insert(j, '\\');
            }
        }
    }

    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn phrasing_leaves_bracket_close_alone() {
        assert_eq!(escape_text("a]b", false), "a]b");
        assert_eq!(escape_text("a[b", false), "a\\[b");
    }

    #[test]
    fn link_text_escapes_both_brackets() {
        assert_eq!(escape_text("a]b", true), "a\\]b");
        assert_eq!(escape_text("a[b", true), "a\\[b");
    }

    #[test]
    fn double_tilde_escapes_first_only() {
        assert_eq!(escape_text("a~~b", false), "a\\~~b");
        assert_eq!(escape_text("~/.bashrc", false), "~/.bashrc");
    }

    #[test]
    fn math_placeholders_pass_untouched() {
        assert_eq!(
            escape_text("%%MATH_PLACEHOLDER_3%%", false),
            "%%MATH_PLACEHOLDER_3%%"
        );
        // Degraded form, and escaping still applies around the token.
        assert_eq!(
            escape_text("a_b MATH_PLACEHOLDER_0 c_d", false),
            "a\\_b MATH_PLACEHOLDER_0 c\\_d"
        );
    }

    #[test]
    fn at_break_escapes_heading_and_list_markers() {
        assert_eq!(escape_at_break_start("# not a heading".into()), "\\# not a heading");
        assert_eq!(escape_at_break_start("- not a list".into()), "\\- not a list");
        assert_eq!(escape_at_break_start("1. not a list".into()), "1\\. not a list");
        assert_eq!(escape_at_break_start("10) neither".into()), "10\\) neither");
    }

    #[test]
    fn at_break_leaves_safe_starts() {
        assert_eq!(escape_at_break_start("plain".into()), "plain");
        assert_eq!(escape_at_break_start("1x2".into()), "1x2");
        assert_eq!(escape_at_break_start("-joined".into()), "-joined");
    }
}
