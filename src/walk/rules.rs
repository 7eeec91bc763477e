// Built-in tag rules.
//
// One rule per HTML element (or element group). Rules only produce tree
// nodes; string formatting belongs to the serializer. Registration happens
// in `default_registry`, where the pseudo-tags (`H`, `EM`, `STRONG`, `DEL`)
// expand to their synonym sets.

use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;

use super::registry::{Registry, TagRule};
use super::{wrap, Context};
use crate::error::Error;
use crate::tree::{text_content, AstData, AstNode, Handle};

/// Registry with every built-in rule installed.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register("H", Rc::new(HeadingRule));
    registry.register("P", Rc::new(ParagraphRule));
    registry.register("BLOCKQUOTE", Rc::new(BlockquoteRule));
    registry.register("UL", Rc::new(ListRule));
    registry.register("OL", Rc::new(ListRule));
    registry.register("LI", Rc::new(ListItemRule));
    registry.register("PRE", Rc::new(CodeBlockRule));
    let inline_code: Rc<dyn TagRule> = Rc::new(InlineCodeRule);
    for tag in ["CODE", "KBD", "SAMP", "TT", "VAR"] {
        registry.register(tag, inline_code.clone());
    }
    registry.register("EM", Rc::new(EmphasisRule));
    registry.register("STRONG", Rc::new(StrongRule));
    registry.register("DEL", Rc::new(StrikethroughRule));
    registry.register("A", Rc::new(LinkRule));
    registry.register("IMG", Rc::new(ImageRule));
    registry.register("BR", Rc::new(BreakRule));
    registry.register("HR", Rc::new(ThematicBreakRule));
    registry.register("DIV", Rc::new(DivRule));
    registry.register("TABLE", Rc::new(TableRule));
    registry.register("INPUT", Rc::new(InputRule));
    registry.register("SUP", Rc::new(SupRule));
    registry.register("SECTION", Rc::new(SectionRule));
    registry.register("IFRAME", Rc::new(IframeRule));
    registry.register("Q", Rc::new(QuoteRule));
    registry.register("DL", Rc::new(DefinitionListRule));
    let media: Rc<dyn TagRule> = Rc::new(MediaRule);
    registry.register("AUDIO", media.clone());
    registry.register("VIDEO", media);
    registry
}

// ---------------------------------------------------------------------------
// Block rules
// ---------------------------------------------------------------------------

struct HeadingRule;

impl TagRule for HeadingRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let level = element
            .tag_name()
            .and_then(|t| t.chars().last())
            .and_then(|c| c.to_digit(10));
        let Some(level @ 1..=6) = level else {
            return Ok(vec![]);
        };
        let children = cx.render_children(element);
        Ok(vec![AstNode::new_with_children(
            AstData::Heading { level: level as u8 },
            children,
        )])
    }
}

struct ParagraphRule;

impl TagRule for ParagraphRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let children = cx.render_children(element);
        if wrap::is_whitespace_only(&children) {
            return Ok(vec![]);
        }
        Ok(vec![AstNode::new_with_children(
            AstData::Paragraph,
            children,
        )])
    }
}

struct BlockquoteRule;

impl TagRule for BlockquoteRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let children = wrap::wrap(cx.render_children(element));
        Ok(vec![AstNode::new_with_children(
            AstData::Blockquote,
            children,
        )])
    }
}

/// Direct element children of these tags make a list item "spread" when an
/// item holds more than one of them.
const SPREADING: &[&str] = &["P", "BLOCKQUOTE", "PRE", "UL", "OL", "DIV"];

struct ListRule;

impl TagRule for ListRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let ordered = element.is_element("OL");
        let start = if ordered {
            element
                .get_attribute("start")
                .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
                .and_then(|s| s.parse::<u32>().ok())
                .filter(|&s| s > 0)
        } else {
            None
        };

        let tight = element
            .children_snapshot()
            .iter()
            .filter(|c| c.is_element("LI"))
            .all(|li| {
                li.children_snapshot()
                    .iter()
                    .filter(|c| {
                        c.tag_name()
                            .is_some_and(|t| SPREADING.contains(&t.as_str()))
                    })
                    .count()
                    <= 1
            });

        let items: Vec<Handle> = cx
            .render_children(element)
            .into_iter()
            .filter(|n| matches!(&*n.data.borrow(), AstData::ListItem { .. }))
            .collect();
        if items.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![AstNode::new_with_children(
            AstData::List {
                ordered,
                start,
                tight,
            },
            items,
        )])
    }
}

struct ListItemRule;

impl TagRule for ListItemRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        // A stray list item outside any list renders as a plain paragraph.
        if !cx.is_inside("UL") && !cx.is_inside("OL") {
            let children = cx.render_children(element);
            if wrap::is_whitespace_only(&children) {
                return Ok(vec![]);
            }
            return Ok(vec![AstNode::new_with_children(
                AstData::Paragraph,
                children,
            )]);
        }

        // Task-list checkbox: the first descendant checkbox input decides the
        // checked state and is dropped from the content (the input rule emits
        // nothing).
        let checked = find_checkbox(element).map(|input| input.has_attribute("checked"));

        let children = cx.render_children(element);
        let children = if children.iter().any(|c| !c.is_phrasing()) {
            wrap::wrap(children)
        } else if wrap::is_whitespace_only(&children) {
            Vec::new()
        } else {
            vec![AstNode::new_with_children(AstData::Paragraph, children)]
        };

        Ok(vec![AstNode::new_with_children(
            AstData::ListItem { checked },
            children,
        )])
    }
}

fn find_checkbox(node: &Handle) -> Option<Handle> {
    for child in node.children_snapshot() {
        if child.is_element("INPUT")
            && child
                .get_attribute("type")
                .is_some_and(|t| t.eq_ignore_ascii_case("checkbox"))
        {
            return Some(child);
        }
        if let Some(found) = find_checkbox(&child) {
            return Some(found);
        }
    }
    None
}

/// Language extraction patterns, tried in order against the full class
/// attribute value.
static LANG_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"language-(\w+)").unwrap(),
        Regex::new(r"lang-(\w+)").unwrap(),
        Regex::new(r"brush:\s*(\w+)").unwrap(),
        Regex::new(r"^(\w+)$").unwrap(),
    ]
});

fn language_from_class(class: &str) -> Option<String> {
    LANG_PATTERNS
        .iter()
        .find_map(|re| re.captures(class.trim()).map(|c| c[1].to_string()))
}

struct CodeBlockRule;

impl TagRule for CodeBlockRule {
    fn emit(&self, element: &Handle, _cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let code = crate::tree::elements_by_tag_name(element, "CODE")
            .into_iter()
            .next();

        let lang = code
            .as_ref()
            .and_then(|c| c.get_attribute("class"))
            .and_then(|c| language_from_class(&c))
            .or_else(|| {
                element
                    .get_attribute("class")
                    .and_then(|c| language_from_class(&c))
            });

        let source = text_content(code.as_ref().unwrap_or(element));
        Ok(vec![AstNode::new(AstData::CodeBlock {
            value: normalize_code_value(&source),
            lang,
            meta: None,
        })])
    }
}

/// Normalize line endings to LF and strip leading/trailing blank lines.
fn normalize_code_value(source: &str) -> String {
    let value = source.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = value.split('\n').collect();
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end].join("\n")
}

struct ThematicBreakRule;

impl TagRule for ThematicBreakRule {
    fn emit(&self, _element: &Handle, _cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        Ok(vec![AstNode::new(AstData::ThematicBreak)])
    }
}

struct DivRule;

impl TagRule for DivRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        // ARIA heading: <div role="heading" aria-level="3">.
        if element
            .get_attribute("role")
            .is_some_and(|r| r.eq_ignore_ascii_case("heading"))
        {
            let level = element
                .get_attribute("aria-level")
                .and_then(|l| l.parse::<u8>().ok())
                .filter(|l| (1..=6).contains(l))
                .unwrap_or(2);
            let children = cx.render_children(element);
            return Ok(vec![AstNode::new_with_children(
                AstData::Heading { level },
                children,
            )]);
        }

        let children = cx.render_children(element);
        if children.is_empty() || wrap::is_whitespace_only(&children) {
            return Ok(vec![]);
        }
        if children.iter().any(|c| !c.is_phrasing()) {
            // Block content present: splice the children in place.
            Ok(wrap::wrap(children))
        } else {
            Ok(vec![AstNode::new_with_children(
                AstData::Paragraph,
                children,
            )])
        }
    }
}

struct TableRule;

impl TagRule for TableRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        // GFM cells cannot hold tables; a nested table degrades to its text.
        if cx.is_inside("TABLE") {
            return Ok(vec![crate::tree::text(
                text_content(element).trim().to_string(),
            )]);
        }

        let mut row_elements: Vec<(Handle, bool)> = Vec::new();
        for child in element.children_snapshot() {
            match child.tag_name().as_deref() {
                Some("THEAD") => {
                    for tr in child.children_snapshot() {
                        if tr.is_element("TR") {
                            row_elements.push((tr, true));
                        }
                    }
                }
                Some("TBODY") | Some("TFOOT") => {
                    for tr in child.children_snapshot() {
                        if tr.is_element("TR") {
                            row_elements.push((tr, false));
                        }
                    }
                }
                Some("TR") => row_elements.push((child, false)),
                _ => {}
            }
        }
        if row_elements.is_empty() {
            return Ok(vec![]);
        }
        // GFM requires a header row; without a <thead> the first row serves.
        if !row_elements.iter().any(|(_, header)| *header) {
            row_elements[0].1 = true;
        }

        let header_row = row_elements
            .iter()
            .find(|(_, header)| *header)
            .map(|(tr, _)| tr.clone());
        let align = header_row
            .map(|tr| {
                cell_elements(&tr)
                    .iter()
                    .map(|cell| cell_alignment(cell))
                    .collect()
            })
            .unwrap_or_default();

        let mut rows = Vec::new();
        for (tr, is_header) in row_elements {
            let mut cells = Vec::new();
            for cell in cell_elements(&tr) {
                let children = cx.render_children(&cell);
                cells.push(AstNode::new_with_children(AstData::TableCell, children));
            }
            rows.push(AstNode::new_with_children(
                AstData::TableRow { is_header },
                cells,
            ));
        }

        Ok(vec![AstNode::new_with_children(
            AstData::Table { align },
            rows,
        )])
    }
}

fn cell_elements(tr: &Handle) -> Vec<Handle> {
    tr.children_snapshot()
        .into_iter()
        .filter(|c| c.is_element("TD") || c.is_element("TH"))
        .collect()
}

fn cell_alignment(cell: &Handle) -> Option<crate::tree::AlignKind> {
    use crate::tree::AlignKind;
    let from_attr = cell.get_attribute("align").map(|a| a.to_ascii_lowercase());
    let from_style = cell.get_attribute("style").and_then(|style| {
        let style = style.to_ascii_lowercase();
        let idx = style.find("text-align")?;
        let rest = &style[idx..];
        ["left", "right", "center"]
            .iter()
            .find(|k| rest.contains(*k))
            .map(|k| k.to_string())
    });
    match from_attr.or(from_style).as_deref() {
        Some("left") => Some(AlignKind::Left),
        Some("right") => Some(AlignKind::Right),
        Some("center") => Some(AlignKind::Center),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Inline rules
// ---------------------------------------------------------------------------

struct InlineCodeRule;

impl TagRule for InlineCodeRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        // CODE under PRE is consumed by the code-block rule.
        if cx.is_inside("PRE") {
            return Ok(cx.render_children(element));
        }
        let value = text_content(element);
        if value.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![AstNode::new(AstData::InlineCode { value })])
    }
}

struct EmphasisRule;

impl TagRule for EmphasisRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let children = cx.render_children(element);
        if children.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![AstNode::new_with_children(AstData::Emphasis, children)])
    }
}

struct StrongRule;

impl TagRule for StrongRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let children = cx.render_children(element);
        if children.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![AstNode::new_with_children(AstData::Strong, children)])
    }
}

struct StrikethroughRule;

impl TagRule for StrikethroughRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let children = cx.render_children(element);
        if children.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![AstNode::new_with_children(
            AstData::Strikethrough,
            children,
        )])
    }
}

struct LinkRule;

impl TagRule for LinkRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        // Anchors without an href are jump targets; walk them transparently.
        let Some(href) = element.get_attribute("href") else {
            return Ok(cx.render_children(element));
        };
        let title = element.get_attribute("title");
        let children = cx.render_children(element);
        // The href is carried verbatim; URL rewriting is a pipeline concern.
        Ok(vec![AstNode::new_with_children(
            AstData::Link { url: href, title },
            children,
        )])
    }
}

struct ImageRule;

impl TagRule for ImageRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let Some(src) = element.get_attribute("src") else {
            return Ok(vec![]);
        };
        Ok(vec![AstNode::new(AstData::Image {
            url: cx.resolve(&src),
            title: element.get_attribute("title"),
            alt: element.get_attribute("alt").unwrap_or_default(),
        })])
    }
}

struct BreakRule;

impl TagRule for BreakRule {
    fn emit(&self, _element: &Handle, _cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        Ok(vec![AstNode::new(AstData::Break { hard: true })])
    }
}

struct InputRule;

impl TagRule for InputRule {
    fn emit(&self, _element: &Handle, _cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        // Checkbox state is read by the list-item rule; inputs themselves
        // carry no Markdown content.
        Ok(vec![])
    }
}

static FOOTNOTE_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#(?:fn|footnote)[-:]?(.+)$").unwrap());

static FOOTNOTE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:fn|footnote)[-:]?(.+)$").unwrap());

struct SupRule;

impl TagRule for SupRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        // <sup><a href="#fn1">1</a></sup> is the conventional footnote
        // reference shape; anything else walks transparently.
        let anchors: Vec<Handle> = element
            .children_snapshot()
            .into_iter()
            .filter(|c| c.is_element("A"))
            .collect();
        if let [anchor] = anchors.as_slice() {
            if let Some(href) = anchor.get_attribute("href") {
                if let Some(caps) = FOOTNOTE_FRAGMENT.captures(&href) {
                    let identifier = caps[1].to_string();
                    return Ok(vec![AstNode::new(AstData::FootnoteReference {
                        label: Some(identifier.clone()),
                        identifier,
                    })]);
                }
            }
        }
        Ok(cx.render_children(element))
    }
}

struct SectionRule;

impl TagRule for SectionRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        if !element.has_class("footnotes") {
            return Ok(wrap::wrap(cx.render_children(element)));
        }
        let mut definitions = Vec::new();
        for li in crate::tree::elements_by_tag_name(element, "LI") {
            let Some(id) = li.get_attribute("id") else {
                continue;
            };
            let Some(caps) = FOOTNOTE_ID.captures(&id) else {
                continue;
            };
            let identifier = caps[1].to_string();
            let children = wrap::wrap(cx.render_children(&li));
            definitions.push(AstNode::new_with_children(
                AstData::FootnoteDefinition {
                    label: Some(identifier.clone()),
                    identifier,
                },
                children,
            ));
        }
        if definitions.is_empty() {
            return Ok(wrap::wrap(cx.render_children(element)));
        }
        Ok(definitions)
    }
}

/// Embedded YouTube players become a linked thumbnail.
static YOUTUBE_EMBED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"www\.youtube(?:-nocookie)?\.com/embed/([-\w]+)").unwrap()
});

struct IframeRule;

impl TagRule for IframeRule {
    fn emit(&self, element: &Handle, _cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let Some(src) = element.get_attribute("src") else {
            return Ok(vec![]);
        };

        if let Some(caps) = YOUTUBE_EMBED.captures(&src) {
            let media_id = &caps[1];
            let thumbnail = AstNode::new(AstData::Image {
                url: format!("https://img.youtube.com/vi/{media_id}/0.jpg"),
                title: None,
                alt: "Embedded YouTube video".into(),
            });
            return Ok(vec![AstNode::new_with_children(
                AstData::Link {
                    url: format!("https://www.youtube.com/watch?v={media_id}"),
                    title: None,
                },
                vec![thumbnail],
            )]);
        }

        // Any other embed degrades to a plain link on its source.
        let label = element
            .get_attribute("title")
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| src.clone());
        Ok(vec![AstNode::new_with_children(
            AstData::Link {
                url: src,
                title: None,
            },
            vec![crate::tree::text(label)],
        )])
    }
}

struct QuoteRule;

impl TagRule for QuoteRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let mut children = cx.render_children(element);
        if children.is_empty() {
            return Ok(vec![]);
        }
        let mut result = vec![crate::tree::text("\"")];
        result.append(&mut children);
        result.push(crate::tree::text("\""));
        Ok(result)
    }
}

/// Definition lists flatten to term/description paragraphs: terms bold,
/// descriptions plain.
struct DefinitionListRule;

impl TagRule for DefinitionListRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let mut result = Vec::new();
        for child in element.children_snapshot() {
            match child.tag_name().as_deref() {
                Some("DT") => {
                    let inline = cx.render_children(&child);
                    if wrap::is_whitespace_only(&inline) {
                        continue;
                    }
                    let strong = AstNode::new_with_children(AstData::Strong, inline);
                    result.push(AstNode::new_with_children(
                        AstData::Paragraph,
                        vec![strong],
                    ));
                }
                Some("DD") => {
                    let children = cx.render_children(&child);
                    if wrap::is_whitespace_only(&children) {
                        continue;
                    }
                    if children.iter().any(|c| !c.is_phrasing()) {
                        result.extend(wrap::wrap(children));
                    } else {
                        result.push(AstNode::new_with_children(AstData::Paragraph, children));
                    }
                }
                _ => result.extend(cx.render_children(&child)),
            }
        }
        Ok(result)
    }
}

/// Audio and video elements degrade to a link on their source.
struct MediaRule;

impl TagRule for MediaRule {
    fn emit(&self, element: &Handle, cx: &mut Context<'_>) -> Result<Vec<Handle>, Error> {
        let src = element.get_attribute("src").or_else(|| {
            element
                .children_snapshot()
                .iter()
                .find(|c| c.is_element("SOURCE"))
                .and_then(|s| s.get_attribute("src"))
        });
        let Some(src) = src else {
            // No playable source: fall back to the element's fallback content.
            return Ok(cx.render_children(element));
        };
        let label = element
            .get_attribute("title")
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| src.clone());
        Ok(vec![AstNode::new_with_children(
            AstData::Link {
                url: src,
                title: None,
            },
            vec![crate::tree::text(label)],
        )])
    }
}
