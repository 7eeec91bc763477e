// Structured JSON document output.
//
// Projects a Markdown tree onto the `{title, content}` document shape:
// heading-delimited sections whose children are typed content blocks. Every
// block carries both the `content` and `children` arrays.

use serde::{Deserialize, Serialize};

use crate::tree::{text_content, AstData, Handle};

/// The JSON document: a title plus a flat list of sections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub title: String,
    pub content: Vec<Content>,
}

/// One typed content block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(rename = "type")]
    pub kind: String,
    /// Heading level for section/heading blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    /// Code language, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub content: Vec<String>,
    pub children: Vec<Content>,
}

impl Content {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            level: None,
            language: None,
            content: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Project a Markdown tree onto the document shape. The title falls back to
/// the first heading when none is supplied.
pub fn to_document(root: &Handle, title: Option<String>) -> Document {
    let children = root.children_snapshot();

    let title = title
        .or_else(|| {
            children
                .iter()
                .find(|c| matches!(&*c.data.borrow(), AstData::Heading { .. }))
                .map(|h| text_content(h).trim().to_string())
        })
        .unwrap_or_default();

    let mut sections: Vec<Content> = Vec::new();
    let mut current = Content::new("section");

    for child in &children {
        let heading_level = match &*child.data.borrow() {
            AstData::Heading { level } => Some(*level),
            _ => None,
        };
        if let Some(level) = heading_level {
            if !current.content.is_empty() || !current.children.is_empty() {
                sections.push(current);
            }
            current = Content::new("section");
            current.level = Some(level);
            current.content.push(text_content(child).trim().to_string());
        } else if let Some(block) = block_content(child) {
            current.children.push(block);
        }
    }
    if !current.content.is_empty() || !current.children.is_empty() {
        sections.push(current);
    }

    Document {
        title,
        content: sections,
    }
}

fn block_content(node: &Handle) -> Option<Content> {
    let data = node.data.borrow().clone();
    let block = match data {
        AstData::Paragraph => {
            let mut block = Content::new("paragraph");
            block.content.push(text_content(node).trim().to_string());
            block
        }
        AstData::Blockquote => {
            let mut block = Content::new("quote");
            block.children = node
                .children_snapshot()
                .iter()
                .filter_map(block_content)
                .collect();
            block
        }
        AstData::List { ordered, .. } => {
            let mut block = Content::new(if ordered { "ordered-list" } else { "list" });
            for item in node.children_snapshot() {
                block.content.push(text_content(&item).trim().to_string());
            }
            block
        }
        AstData::CodeBlock { value, lang, .. } => {
            let mut block = Content::new("code");
            block.language = lang;
            block.content.push(value);
            block
        }
        AstData::Table { .. } => {
            let mut block = Content::new("table");
            for row in node.children_snapshot() {
                let cells: Vec<String> = row
                    .children_snapshot()
                    .iter()
                    .map(|c| text_content(c).trim().to_string())
                    .collect();
                block.content.push(cells.join(" | "));
            }
            block
        }
        AstData::ThematicBreak => Content::new("break"),
        AstData::Html { value } => {
            let mut block = Content::new("html");
            block.content.push(value);
            block
        }
        AstData::FootnoteDefinition { identifier, .. } => {
            let mut block = Content::new("footnote");
            block.content.push(identifier);
            block.content.push(text_content(node).trim().to_string());
            block
        }
        // Stray phrasing content at block level reads as a paragraph.
        _ => {
            let value = text_content(node).trim().to_string();
            if value.is_empty() {
                return None;
            }
            let mut block = Content::new("paragraph");
            block.content.push(value);
            block
        }
    };
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::parse::{parse, ParseOptions};
    use crate::walk::{default_registry, walk};
    use pretty_assertions::assert_eq;

    fn document_for(html: &str) -> Document {
        let dom = parse(html, &ParseOptions::default()).unwrap();
        let root = walk(&dom, &default_registry()).root;
        normalize(&root).unwrap();
        to_document(&root, None)
    }

    #[test]
    fn title_falls_back_to_first_heading() {
        let doc = document_for("<h1>My Page</h1><p>body</p>");
        assert_eq!(doc.title, "My Page");
    }

    #[test]
    fn headings_open_sections() {
        let doc = document_for("<h2>A</h2><p>one</p><h2>B</h2><p>two</p>");
        assert_eq!(doc.content.len(), 2);
        assert_eq!(doc.content[0].kind, "section");
        assert_eq!(doc.content[0].level, Some(2));
        assert_eq!(doc.content[0].content, vec!["A"]);
        assert_eq!(doc.content[0].children[0].kind, "paragraph");
        assert_eq!(doc.content[1].content, vec!["B"]);
    }

    #[test]
    fn leading_content_without_heading_gets_a_section() {
        let doc = document_for("<p>intro</p><h2>Later</h2>");
        assert_eq!(doc.content.len(), 2);
        assert!(doc.content[0].level.is_none());
        assert_eq!(doc.content[0].children[0].content, vec!["intro"]);
    }

    #[test]
    fn block_kinds_map() {
        let doc = document_for(
            "<blockquote><p>q</p></blockquote>\
             <ul><li>a</li><li>b</li></ul>\
             <pre><code class=\"language-rust\">fn x() {}</code></pre>",
        );
        let kinds: Vec<&str> = doc.content[0]
            .children
            .iter()
            .map(|c| c.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["quote", "list", "code"]);
        assert_eq!(
            doc.content[0].children[2].language.as_deref(),
            Some("rust")
        );
    }

    #[test]
    fn serializes_with_type_field() {
        let doc = document_for("<h1>T</h1><p>b</p>");
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains(r#""type":"section""#), "{json}");
        assert!(json.contains(r#""title":"T""#), "{json}");
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
