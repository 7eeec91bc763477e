// Markdown-tree normalization.
//
// Post-walk pass that merges adjacent text nodes, drops empty ones, trims
// leading/trailing whitespace in edge positions of headings, paragraphs and
// the root, then re-establishes parent links and checks the structural
// invariants.

use crate::error::Error;
use crate::tree::{self, AstData, Handle};

/// Normalize a walked tree in place. Fails only when the tree violates a
/// structural invariant after repair.
pub fn normalize(root: &Handle) -> Result<(), Error> {
    normalize_node(root);
    tree::establish(std::slice::from_ref(root));
    tree::check_invariants(root)
}

fn normalize_node(node: &Handle) {
    for child in node.children_snapshot() {
        normalize_node(&child);
    }

    merge_adjacent_text(node);
    node.children
        .borrow_mut()
        .retain(|c| !matches!(&*c.data.borrow(), AstData::Text { value } if value.is_empty()));

    // Strikethrough is included because straddling splits can leave edge
    // spaces in its content at block boundaries.
    let should_trim = matches!(
        &*node.data.borrow(),
        AstData::Heading { .. } | AstData::Paragraph | AstData::Document | AstData::Strikethrough
    );
    if should_trim {
        trim_container(node);
    }
}

/// Merge adjacent Text nodes into a single node.
fn merge_adjacent_text(node: &Handle) {
    let mut children = node.children.borrow_mut();
    let mut i = 0;
    while i + 1 < children.len() {
        let both_text = matches!(&*children[i].data.borrow(), AstData::Text { .. })
            && matches!(&*children[i + 1].data.borrow(), AstData::Text { .. });
        if both_text {
            let next = children.remove(i + 1);
            let suffix = match &*next.data.borrow() {
                AstData::Text { value } => value.clone(),
                _ => unreachable!("checked above"),
            };
            if let AstData::Text { value } = &mut *children[i].data.borrow_mut() {
                value.push_str(&suffix);
            }
        } else {
            i += 1;
        }
    }
}

/// Trim whitespace (including newlines) from the first and last text children.
fn trim_container(node: &Handle) {
    let children = node.children.borrow();
    if let Some(first) = children.first() {
        if let AstData::Text { value } = &mut *first.data.borrow_mut() {
            *value = value
                .trim_start_matches([' ', '\t', '\n', '\r'])
                .to_string();
        }
    }
    if let Some(last) = children.last() {
        if let AstData::Text { value } = &mut *last.data.borrow_mut() {
            *value = value.trim_end_matches([' ', '\t', '\n', '\r']).to_string();
        }
    }
}
