// Markdown-tree → CommonMark/GFM serializer.
//
// Walks the tree and emits a Markdown string. The output rules are fixed
// (ATX headings, fenced code, compact pipe tables, `$`-delimited math left
// untouched); only the bullet and emphasis markers are configurable.

pub(crate) mod escape;
pub(crate) mod handlers;

use crate::error::Error;
use crate::tree::Handle;

/// Serializer configuration.
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    /// Unordered list bullet. Default `-`.
    pub bullet: char,
    /// Emphasis marker; strong doubles it. Default `*`.
    pub emphasis: char,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            bullet: '-',
            emphasis: '*',
        }
    }
}

/// Serializer state threaded through all handlers.
pub(crate) struct State<'a> {
    pub options: &'a SerializeOptions,
    /// Whether the next text is at the start of a block, where at-break
    /// character escaping applies (`#`, `>`, list markers, …).
    pub at_break: bool,
    /// Inside link text (`[…]`): `]` must be escaped as well.
    pub in_link_text: bool,
    /// Inside a table cell: `|` must be escaped.
    pub in_table_cell: bool,
    /// Node-kind path from the root, for render error reports.
    pub path: Vec<&'static str>,
}

impl<'a> State<'a> {
    pub fn new(options: &'a SerializeOptions) -> Self {
        Self {
            options,
            at_break: false,
            in_link_text: false,
            in_table_cell: false,
            path: Vec::new(),
        }
    }

    pub fn render_error(&self, node: &Handle) -> Error {
        Error::Render {
            node_type: node.kind().to_string(),
            path: self.path.join(" > "),
        }
    }
}

/// Serialize a Markdown tree to a string. Fails with a render error when the
/// tree still contains HTML-side variants (elements, comments) or a nested
/// document node.
pub fn serialize(root: &Handle, options: &SerializeOptions) -> Result<String, Error> {
    let mut state = State::new(options);
    let mut output = handlers::handle(&mut state, root)?;

    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{AstData, AstNode, text};
    use pretty_assertions::assert_eq;

    #[test]
    fn output_gains_trailing_newline() {
        let doc = AstNode::new_with_children(
            AstData::Document,
            vec![AstNode::new_with_children(
                AstData::Paragraph,
                vec![text("hello")],
            )],
        );
        assert_eq!(serialize(&doc, &SerializeOptions::default()).unwrap(), "hello\n");
    }

    #[test]
    fn empty_document_serializes_to_empty_string() {
        let doc = AstNode::new(AstData::Document);
        assert_eq!(serialize(&doc, &SerializeOptions::default()).unwrap(), "");
    }

    #[test]
    fn leftover_element_nodes_are_render_errors() {
        let doc = AstNode::new_with_children(
            AstData::Document,
            vec![AstNode::new(AstData::Element {
                name: "DIV".into(),
                attrs: vec![],
            })],
        );
        let err = serialize(&doc, &SerializeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
        assert!(err.to_string().contains("element"));
    }
}
