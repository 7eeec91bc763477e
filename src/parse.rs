// HTML parser adapter.
//
// Wraps html5ever and rebuilds its RcDom output as `tree` nodes: element
// names are normalized to uppercase, attribute names keep their parsed case,
// whitespace-only text and comments are subject to the adapter options.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::ParseOpts;
use markup5ever_rcdom::{Handle as DomHandle, NodeData, RcDom};

use crate::error::Error;
use crate::tree::{append, AstData, AstNode, Attribute, Handle};

/// Adapter options.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Surface parse errors instead of recovering.
    pub strict: bool,
    /// Discard whitespace-only text nodes at the adapter boundary.
    pub normalize: bool,
    /// Retain comment nodes.
    pub preserve_comments: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: false,
            normalize: true,
            preserve_comments: false,
        }
    }
}

/// Parse an HTML string into a normalized DOM.
///
/// In non-strict mode a parse that yields no content triggers one recovery
/// attempt with the input wrapped in a synthetic block element; only when
/// that also yields nothing does the adapter fail.
pub fn parse(html: &str, options: &ParseOptions) -> Result<Handle, Error> {
    let document = parse_once(html, options)?;
    if has_payload(&document) || html.trim().is_empty() {
        return Ok(document);
    }

    if options.strict {
        return Err(Error::Parse("document yielded no content".into()));
    }

    tracing::debug!("empty parse result, retrying with a synthetic wrapper");
    let wrapped = format!("<div>{html}</div>");
    let document = parse_once(&wrapped, options)?;
    if has_payload(&document) {
        Ok(document)
    } else {
        Err(Error::Parse("recovery parse yielded no content".into()))
    }
}

fn parse_once(html: &str, options: &ParseOptions) -> Result<Handle, Error> {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            drop_doctype: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let dom = parse_document(RcDom::default(), opts)
        .from_utf8()
        .one(html.as_bytes());

    if options.strict {
        let errors = dom.errors.borrow();
        if let Some(first) = errors.first() {
            return Err(Error::Parse(format!(
                "{} ({} error(s) total)",
                first,
                errors.len()
            )));
        }
    }

    let document = AstNode::new(AstData::Document);
    convert_children(&dom.document, &document, options);
    Ok(document)
}

/// Recursively convert html5ever nodes into `tree` nodes.
fn convert_children(dom_node: &DomHandle, parent: &Handle, options: &ParseOptions) {
    for child in dom_node.children.borrow().iter() {
        match &child.data {
            NodeData::Element { name, attrs, .. } => {
                let attrs = attrs
                    .borrow()
                    .iter()
                    .map(|a| Attribute {
                        name: a.name.local.to_string(),
                        value: a.value.to_string(),
                    })
                    .collect();
                let element = AstNode::new(AstData::Element {
                    name: name.local.to_ascii_uppercase().to_string(),
                    attrs,
                });
                convert_children(child, &element, options);
                append(parent, element);
            }
            NodeData::Text { contents } => {
                let value = contents.borrow().to_string();
                if value.is_empty() {
                    continue;
                }
                if options.normalize && value.trim().is_empty() {
                    continue;
                }
                append(parent, AstNode::new(AstData::Text { value }));
            }
            NodeData::Comment { contents } => {
                if options.preserve_comments {
                    append(
                        parent,
                        AstNode::new(AstData::Comment {
                            value: contents.to_string(),
                        }),
                    );
                }
            }
            // Doctypes are dropped by the tree builder; processing
            // instructions and the document node itself carry no content.
            _ => convert_children(child, parent, options),
        }
    }
}

/// Whether the document contains anything beyond the html/head/body scaffold
/// the HTML5 tree builder always materializes.
fn has_payload(document: &Handle) -> bool {
    subtree_has_payload(document)
}

fn subtree_has_payload(node: &Handle) -> bool {
    for child in node.children.borrow().iter() {
        let significant = match &*child.data.borrow() {
            AstData::Element { name, .. } => !matches!(name.as_str(), "HTML" | "HEAD" | "BODY"),
            AstData::Text { .. } | AstData::Comment { .. } => true,
            _ => false,
        };
        if significant || subtree_has_payload(child) {
            return true;
        }
    }
    false
}
