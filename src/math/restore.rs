// Placeholder restoration.
//
// Swaps placeholder tokens in the serialized Markdown back for their
// converted LaTeX, wrapped in `$…$` or `$$…$$`. Conversion results are
// cached per (content, format) tuple; a degraded token form without the
// `%%` sigils is tolerated. Delimiter balance is validated at the end.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{degraded_token, placeholder_token, MathFormat, MathPlaceholders};

/// Restorer configuration.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Warn when the restored output has unbalanced math delimiters.
    pub validate_delimiters: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            validate_delimiters: true,
        }
    }
}

static EXCESS_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Replace every placeholder in `markdown` with its delimited LaTeX form.
/// Input containing no placeholders is returned unchanged.
pub fn restore_math(
    markdown: &str,
    placeholders: &MathPlaceholders,
    options: &RestoreOptions,
) -> String {
    if placeholders.is_empty() {
        return markdown.to_string();
    }

    let mut output = markdown.to_string();
    let mut cache: HashMap<(String, MathFormat), String> = HashMap::new();

    // Highest ordinal first: the degraded form of id 1 is a prefix of the
    // degraded form of id 12, so ascending replacement could corrupt it.
    let mut entries: Vec<_> = placeholders.iter().collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    for (id, entry) in entries {
        let latex = cache
            .entry((entry.content.clone(), entry.format))
            .or_insert_with(|| super::convert(&entry.content, entry.format))
            .clone();
        let replacement = if entry.display {
            format!("\n\n$${latex}$$\n\n")
        } else {
            format!("${latex}$")
        };

        let token = placeholder_token(id);
        if output.contains(&token) {
            output = output.replace(&token, &replacement);
            continue;
        }
        let degraded = degraded_token(id);
        if output.contains(&degraded) {
            output = output.replace(&degraded, &replacement);
        } else {
            tracing::warn!(id, "math placeholder missing from serialized output");
        }
    }

    let output = EXCESS_BLANK_LINES.replace_all(&output, "\n\n").into_owned();

    if options.validate_delimiters {
        validate_delimiters(&output);
    }
    output
}

fn validate_delimiters(output: &str) {
    let dollars = output.matches('$').count();
    let doubles = output.matches("$$").count();
    if dollars % 2 != 0 {
        tracing::warn!(count = dollars, "odd number of `$` delimiters after restore");
    }
    if doubles % 2 != 0 {
        tracing::warn!(count = doubles, "odd number of `$$` delimiters after restore");
    }
}
