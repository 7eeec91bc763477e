// Math extraction.
//
// Locates math content in the DOM (MathML elements, math scripts, annotated
// elements, math-classed elements), detects its format and display mode, and
// replaces each occurrence with an inert placeholder span the Markdown
// pipeline cannot corrupt.

use std::sync::LazyLock;

use regex::Regex;

use super::{placeholder_token, MathFormat, MathPlaceholder, MathPlaceholders};
use crate::tree::{self, outer_html, text_content, AstData, AstNode, Attribute, Handle};

/// Extractor configuration: the selector set used to locate math.
#[derive(Debug, Clone)]
pub struct MathOptions {
    pub enabled: bool,
    /// Class tokens that mark an element as math content.
    pub classes: Vec<String>,
    /// Attributes that carry math content or mark its format.
    pub data_attributes: Vec<String>,
}

impl Default for MathOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            classes: ["math", "tex", "latex", "katex", "mathjax", "asciimath"]
                .map(String::from)
                .to_vec(),
            data_attributes: ["data-math", "data-latex", "data-mathml", "data-asciimath"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Replace every math occurrence in the DOM with a placeholder span and
/// return the placeholder table. Running it on a document without math
/// changes nothing and returns an empty table.
pub fn extract_math(dom: &Handle, options: &MathOptions) -> MathPlaceholders {
    let mut placeholders = MathPlaceholders::new();
    if !options.enabled {
        return placeholders;
    }

    let mut candidates = Vec::new();
    collect_candidates(dom, options, &mut candidates);

    for element in candidates {
        if in_head(&element) {
            continue;
        }
        let Some((content, format)) = capture(&element) else {
            continue;
        };
        let display = detect_display(&element, &content);
        let id = placeholders.insert(MathPlaceholder {
            content,
            format,
            display,
        });

        let span = AstNode::new(AstData::Element {
            name: "SPAN".into(),
            attrs: vec![
                Attribute {
                    name: "data-math-placeholder".into(),
                    value: "true".into(),
                },
                Attribute {
                    name: "data-math-format".into(),
                    value: format.as_str().into(),
                },
                Attribute {
                    name: "data-math-display".into(),
                    value: if display { "block" } else { "inline" }.into(),
                },
            ],
        });
        tree::append(&span, tree::text(placeholder_token(id)));
        if tree::replace(&element, span).is_err() {
            tracing::warn!(id, "math element had no parent, placeholder skipped");
        }
    }

    placeholders
}

/// Collect math candidates in document order, outermost first; children of a
/// candidate are not scanned.
fn collect_candidates(node: &Handle, options: &MathOptions, out: &mut Vec<Handle>) {
    if is_candidate(node, options) {
        out.push(node.clone());
        return;
    }
    for child in node.children_snapshot() {
        collect_candidates(&child, options, out);
    }
}

fn is_candidate(node: &Handle, options: &MathOptions) -> bool {
    let Some(tag) = node.tag_name() else {
        return false;
    };
    if tag == "MATH" {
        return true;
    }
    if tag == "SCRIPT" {
        let script_type = node.get_attribute("type").unwrap_or_default();
        return script_type.contains("math/tex") || script_type.contains("math/asciimath");
    }
    if options.data_attributes.iter().any(|a| node.has_attribute(a)) {
        return true;
    }
    options.classes.iter().any(|c| node.has_class(c))
}

fn in_head(node: &Handle) -> bool {
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if ancestor.is_element("HEAD") {
            return true;
        }
        current = ancestor.parent();
    }
    false
}

/// Pull the content and format out of a candidate. Returns None when the
/// candidate turns out to be empty or not math after all.
fn capture(element: &Handle) -> Option<(String, MathFormat)> {
    // Explicit format-bearing attributes win.
    for (attr, format) in [
        ("data-latex", MathFormat::Latex),
        ("data-mathml", MathFormat::MathMl),
        ("data-asciimath", MathFormat::Ascii),
    ] {
        if element.has_attribute(attr) {
            let value = element.get_attribute(attr).unwrap_or_default();
            let content = if value.trim().is_empty() {
                candidate_text(element, format)
            } else {
                value
            };
            return non_empty(content).map(|c| (c, format));
        }
    }
    if element.has_attribute("data-math") {
        let value = element.get_attribute("data-math").unwrap_or_default();
        let format = element
            .get_attribute("data-math-format")
            .and_then(|f| MathFormat::from_label(&f));
        let content = if value.trim().is_empty() {
            text_content(element)
        } else {
            value
        };
        let content = non_empty(content)?;
        let format = format.unwrap_or_else(|| detect_format(&content));
        return Some((content, format));
    }

    // Element type.
    if element.is_element("MATH") {
        if text_content(element).trim().is_empty() && element.children.borrow().is_empty() {
            return None;
        }
        return Some((outer_html(element), MathFormat::MathMl));
    }
    if element.is_element("SCRIPT") {
        let script_type = element.get_attribute("type").unwrap_or_default();
        let content = non_empty(text_content(element))?;
        if !looks_mathy(&content) {
            return None;
        }
        let format = if script_type.contains("math/asciimath") {
            MathFormat::Ascii
        } else {
            MathFormat::Latex
        };
        return Some((content, format));
    }

    // Class-based candidates: content heuristics decide the format.
    let content = non_empty(text_content(element))?;
    Some((content.clone(), detect_format(&content)))
}

fn candidate_text(element: &Handle, format: MathFormat) -> String {
    if format == MathFormat::MathMl {
        tree::elements_by_tag_name(element, "MATH")
            .first()
            .map(outer_html)
            .unwrap_or_else(|| text_content(element))
    } else {
        text_content(element)
    }
}

fn non_empty(content: String) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

static BACKSLASH_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+").unwrap());
static DOLLAR_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$[^$]+\$").unwrap());
static ASCII_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:sqrt|sin|cos|tan|log|ln|lim|sum|prod|abs|floor|ceil)\s*\(").unwrap()
});
static SLASH_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9]+\s*/\s*[A-Za-z0-9]+\b").unwrap());

/// Whether script content looks like math at all. Guards against extraction
/// of loader scripts that merely carry a math MIME type.
fn looks_mathy(content: &str) -> bool {
    BACKSLASH_COMMAND.is_match(content)
        || DOLLAR_SPAN.is_match(content)
        || ASCII_CALL.is_match(content)
        || SLASH_FRACTION.is_match(content)
        || content.chars().filter(|c| "^_{}=+".contains(*c)).count() >= 2
}

fn detect_format(content: &str) -> MathFormat {
    if content.contains("<math") {
        return MathFormat::MathMl;
    }
    if content.contains(r"\begin{")
        || BACKSLASH_COMMAND.is_match(content)
        || DOLLAR_SPAN.is_match(content)
        || content.contains("$$")
    {
        return MathFormat::Latex;
    }
    if ASCII_CALL.is_match(content) || SLASH_FRACTION.is_match(content) {
        return MathFormat::Ascii;
    }
    // Punctuation-heavy content without commands still reads as LaTeX.
    MathFormat::Latex
}

const BLOCK_PARENTS: &[&str] = &[
    "P", "DIV", "SECTION", "ARTICLE", "ASIDE", "MAIN", "BODY", "CENTER", "FIGURE", "BLOCKQUOTE",
];

const INLINE_ANCESTORS: &[&str] = &["H1", "H2", "H3", "H4", "H5", "H6", "LI", "TD", "TH"];

static COMPLEX_ENVIRONMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\begin\{(?:align|equation|gather|multline)").unwrap());

fn detect_display(element: &Handle, content: &str) -> bool {
    // Explicit markers.
    match element.get_attribute("display").as_deref() {
        Some("block") => return true,
        Some("inline") => return false,
        _ => {}
    }
    if element.get_attribute("mode").as_deref() == Some("display") {
        return true;
    }
    match element.get_attribute("data-math-display").as_deref() {
        Some("block") => return true,
        Some("inline") => return false,
        _ => {}
    }
    for token in ["display-math", "math-display", "block", "equation"] {
        if element.has_class(token) {
            return true;
        }
    }
    if element
        .get_attribute("type")
        .is_some_and(|t| t.contains("mode=display"))
    {
        return true;
    }
    if content.contains(r"\displaystyle") {
        return true;
    }

    // Structural context: headings, list items and table cells stay inline.
    let mut current = element.parent();
    while let Some(ancestor) = current {
        if let Some(tag) = ancestor.tag_name() {
            if INLINE_ANCESTORS.contains(&tag.as_str()) {
                return false;
            }
        }
        current = ancestor.parent();
    }

    // The only significant child of a block element stands alone.
    if let Some(parent) = element.parent() {
        let parent_is_block = parent
            .tag_name()
            .is_some_and(|t| BLOCK_PARENTS.contains(&t.as_str()));
        if parent_is_block && only_significant_child(&parent, element) {
            return true;
        }
    }

    // Content complexity.
    if COMPLEX_ENVIRONMENT.is_match(content) {
        return true;
    }
    for marker in [r"\frac", r"\sum", r"\int", r"\prod"] {
        if content.contains(marker) {
            return true;
        }
    }
    content.len() > 30 && content.contains(['\\', '_', '^'])
}

fn only_significant_child(parent: &Handle, element: &Handle) -> bool {
    parent.children.borrow().iter().all(|sibling| {
        if std::rc::Rc::ptr_eq(sibling, element) {
            return true;
        }
        matches!(&*sibling.data.borrow(), AstData::Text { value } if value.trim().is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, ParseOptions};
    use pretty_assertions::assert_eq;

    fn dom(html: &str) -> Handle {
        parse(html, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn mathml_element_is_extracted_with_markup() {
        let doc = dom("<p>ratio <math><mfrac><mi>a</mi><mi>b</mi></mfrac></math> here</p>");
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert_eq!(placeholders.len(), 1);
        let entry = placeholders.get(0).unwrap();
        assert_eq!(entry.format, MathFormat::MathMl);
        assert!(entry.content.contains("<mfrac>"));
        assert!(!entry.display);

        let spans = tree::elements_by_tag_name(&doc, "SPAN");
        let span = spans
            .iter()
            .find(|s| s.has_attribute("data-math-placeholder"))
            .expect("placeholder span");
        assert_eq!(text_content(span), "%%MATH_PLACEHOLDER_0%%");
    }

    #[test]
    fn script_math_tex_is_latex() {
        // The paragraph anchors the script in <body>; head scripts are
        // never extracted.
        let doc = dom(r#"<p>where</p><script type="math/tex">x^2 + 1</script>"#);
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders.get(0).unwrap().format, MathFormat::Latex);
    }

    #[test]
    fn script_without_math_content_is_skipped() {
        let doc = dom(r#"<p>where</p><script type="math/tex">loadRenderer()</script>"#);
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert!(placeholders.is_empty());
    }

    #[test]
    fn display_mode_from_attribute() {
        let doc = dom(r#"<p>x</p><math display="block"><mi>y</mi></math>"#);
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert!(placeholders.get(0).unwrap().display);
    }

    #[test]
    fn sole_child_of_block_parent_is_display() {
        let doc = dom("<div><math><mi>x</mi></math></div>");
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert!(placeholders.get(0).unwrap().display);
    }

    #[test]
    fn math_in_heading_stays_inline() {
        let doc = dom(r#"<h2><math display="inline"><mi>x</mi></math></h2>"#);
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert!(!placeholders.get(0).unwrap().display);
    }

    #[test]
    fn data_latex_attribute_wins_over_class() {
        let doc = dom(r#"<span class="math" data-latex="\alpha + \beta">α+β</span>"#);
        let placeholders = extract_math(&doc, &MathOptions::default());
        let entry = placeholders.get(0).unwrap();
        assert_eq!(entry.format, MathFormat::Latex);
        assert_eq!(entry.content, r"\alpha + \beta");
    }

    #[test]
    fn class_candidates_use_content_heuristics() {
        let doc = dom(r#"<span class="asciimath">sqrt(x)</span>"#);
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert_eq!(placeholders.get(0).unwrap().format, MathFormat::Ascii);
    }

    #[test]
    fn head_content_is_ignored() {
        let doc = dom(r#"<head><script type="math/tex">x^2+y^2=z^2</script></head><p>b</p>"#);
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert!(placeholders.is_empty());
    }

    #[test]
    fn empty_math_is_skipped() {
        let doc = dom("<math></math><p>x</p>");
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert!(placeholders.is_empty());
    }

    #[test]
    fn extraction_is_inert_without_math() {
        let doc = dom("<p>plain prose</p>");
        let before = outer_html(&doc);
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert!(placeholders.is_empty());
        assert_eq!(outer_html(&doc), before);
    }

    #[test]
    fn ordinals_follow_document_order() {
        let doc = dom(
            "<p>a <math><mi>x</mi></math> b <math><mi>y</mi></math> c</p>",
        );
        let placeholders = extract_math(&doc, &MathOptions::default());
        assert_eq!(placeholders.len(), 2);
        assert!(placeholders.get(0).unwrap().content.contains("x"));
        assert!(placeholders.get(1).unwrap().content.contains("y"));
    }

    #[test]
    fn disabled_extraction_is_a_no_op() {
        let doc = dom("<math><mi>x</mi></math>");
        let options = MathOptions {
            enabled: false,
            ..Default::default()
        };
        assert!(extract_math(&doc, &options).is_empty());
    }
}
