// Math round-trip: extraction, conversion, restoration.
//
// Math content is located in the DOM before the walk and replaced with inert
// placeholder spans so Markdown escaping cannot corrupt it. After
// serialization the placeholders are swapped back in, converted to LaTeX and
// wrapped in `$…$` / `$$…$$` delimiters.

pub(crate) mod ascii;
pub(crate) mod extract;
pub(crate) mod latex;
pub(crate) mod mathml;
pub(crate) mod restore;

use std::collections::BTreeMap;

pub use extract::{extract_math, MathOptions};
pub use restore::{restore_math, RestoreOptions};

/// Source format of an extracted math fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFormat {
    Latex,
    MathMl,
    Ascii,
}

impl MathFormat {
    /// Parse a format label. Accepts the aliases `latex|tex`, `mathml|mml`
    /// and `ascii|asciimath`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "latex" | "tex" => Some(MathFormat::Latex),
            "mathml" | "mml" => Some(MathFormat::MathMl),
            "ascii" | "asciimath" => Some(MathFormat::Ascii),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MathFormat::Latex => "latex",
            MathFormat::MathMl => "mathml",
            MathFormat::Ascii => "ascii",
        }
    }
}

/// One extracted math fragment, keyed by its placeholder ordinal.
#[derive(Debug, Clone)]
pub struct MathPlaceholder {
    pub content: String,
    pub format: MathFormat,
    pub display: bool,
}

/// The placeholder table produced by extraction. Ordinals are assigned
/// monotonically in extraction order.
#[derive(Debug, Default, Clone)]
pub struct MathPlaceholders {
    entries: BTreeMap<u64, MathPlaceholder>,
    next_id: u64,
}

impl MathPlaceholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fragment and return its placeholder ordinal.
    pub fn insert(&mut self, placeholder: MathPlaceholder) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, placeholder);
        id
    }

    pub fn get(&self, id: u64) -> Option<&MathPlaceholder> {
        self.entries.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &MathPlaceholder)> {
        self.entries.iter().map(|(id, p)| (*id, p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The textual marker substituted into the DOM. Chosen so no downstream
/// Markdown escape rewrites it.
pub fn placeholder_token(id: u64) -> String {
    format!("%%MATH_PLACEHOLDER_{id}%%")
}

/// The degraded marker form the restorer also tolerates.
pub fn degraded_token(id: u64) -> String {
    format!("MATH_PLACEHOLDER_{id}")
}

/// Convert math content of a known format to LaTeX. Conversion is
/// best-effort: a fragment that cannot be translated structurally falls back
/// to a textual rewrite rather than failing.
pub fn convert(content: &str, format: MathFormat) -> String {
    match format {
        MathFormat::Latex => latex::normalize_latex(content),
        MathFormat::MathMl => mathml::mathml_to_latex(content),
        MathFormat::Ascii => ascii::ascii_to_latex(content),
    }
}

/// Format-label keyed converter registry, for callers that carry formats as
/// strings. Unknown labels fall back to the LaTeX normalizer.
#[derive(Default)]
pub struct ConverterRegistry {
    overrides: BTreeMap<String, fn(&str) -> String>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a converter for a format label, shadowing the built-in.
    pub fn register(&mut self, label: &str, converter: fn(&str) -> String) {
        self.overrides
            .insert(label.trim().to_ascii_lowercase(), converter);
    }

    pub fn convert(&self, label: &str, content: &str) -> String {
        if let Some(converter) = self.overrides.get(&label.trim().to_ascii_lowercase()) {
            return converter(content);
        }
        match MathFormat::from_label(label) {
            Some(format) => convert(content, format),
            None => latex::normalize_latex(content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn format_labels_accept_aliases() {
        assert_eq!(MathFormat::from_label("TeX"), Some(MathFormat::Latex));
        assert_eq!(MathFormat::from_label("mml"), Some(MathFormat::MathMl));
        assert_eq!(
            MathFormat::from_label("asciimath"),
            Some(MathFormat::Ascii)
        );
        assert_eq!(MathFormat::from_label("wiring"), None);
    }

    #[test]
    fn ordinals_count_up_in_insertion_order() {
        let mut placeholders = MathPlaceholders::new();
        let a = placeholders.insert(MathPlaceholder {
            content: "a".into(),
            format: MathFormat::Latex,
            display: false,
        });
        let b = placeholders.insert(MathPlaceholder {
            content: "b".into(),
            format: MathFormat::Latex,
            display: true,
        });
        assert_eq!((a, b), (0, 1));
        assert_eq!(placeholder_token(a), "%%MATH_PLACEHOLDER_0%%");
    }

    #[test]
    fn registry_falls_back_to_latex_for_unknown_labels() {
        let registry = ConverterRegistry::new();
        assert_eq!(registry.convert("unknown", "x + y"), "x + y");
    }

    #[test]
    fn registry_overrides_win() {
        fn shout(_: &str) -> String {
            "LOUD".to_string()
        }
        let mut registry = ConverterRegistry::new();
        registry.register("latex", shout);
        assert_eq!(registry.convert("LaTeX", "x"), "LOUD");
    }
}
