// LaTeX normalizer.
//
// Existing LaTeX passes through with light cleanup: stray empty brace groups
// collapse, spacing around sub/superscript markers is normalized, outer math
// delimiters the source may carry are stripped (the restorer adds its own).

use std::sync::LazyLock;

use regex::Regex;

static SUP_SPACING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\^\s*").unwrap());
static SUB_SPACING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*_\s*").unwrap());
static EMPTY_GROUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\s*\}").unwrap());
static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

pub(crate) fn normalize_latex(content: &str) -> String {
    let mut value = content.trim().to_string();

    // Strip delimiters carried in the source; the restorer re-wraps.
    for (open, close) in [("$$", "$$"), ("$", "$"), (r"\[", r"\]"), (r"\(", r"\)")] {
        if value.len() > open.len() + close.len()
            && value.starts_with(open)
            && value.ends_with(close)
        {
            value = value[open.len()..value.len() - close.len()].trim().to_string();
            break;
        }
    }

    let value = value.replace('\n', " ");
    let value = SUP_SPACING.replace_all(&value, "^");
    let value = SUB_SPACING.replace_all(&value, "_");
    let value = EMPTY_GROUP.replace_all(&value, "");
    let value = SPACE_RUN.replace_all(&value, " ");
    value.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_latex_passes_through() {
        assert_eq!(normalize_latex(r"\frac{a}{b}"), r"\frac{a}{b}");
    }

    #[test]
    fn outer_dollars_are_stripped() {
        assert_eq!(normalize_latex("$x^2$"), "x^2");
        assert_eq!(normalize_latex("$$ E = mc^2 $$"), "E = mc^2");
        assert_eq!(normalize_latex(r"\( a+b \)"), "a+b");
    }

    #[test]
    fn subscript_spacing_is_tightened() {
        assert_eq!(normalize_latex("x ^ 2 + a _ i"), "x^2 + a_i");
    }

    #[test]
    fn stray_empty_groups_collapse() {
        assert_eq!(normalize_latex(r"x{}y"), "xy");
    }

    #[test]
    fn bare_dollar_inside_is_kept() {
        // Only balanced outer delimiters are stripped.
        assert_eq!(normalize_latex("$x"), "$x");
    }
}
