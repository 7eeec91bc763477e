// Implicit paragraph detection and block-in-inline resolution.
//
// When a flow container has mixed phrasing + block children, phrasing runs
// are wrapped in implicit Paragraph nodes. Inline wrappers that ended up
// containing block content (links around divs, and the like) are dissolved
// so their children join the flow stream.

use crate::tree::{AstData, AstNode, Handle};

/// Wrap mixed content: phrasing runs become paragraphs, block content passes
/// through unchanged. Input that is already uniform is returned as-is.
pub(crate) fn wrap(nodes: Vec<Handle>) -> Vec<Handle> {
    if !wrap_needed(&nodes) {
        return nodes;
    }

    let nodes = dissolve_straddling(nodes);
    let mut result = Vec::new();
    let mut phrasing_run: Vec<Handle> = Vec::new();

    for node in nodes {
        if node.is_phrasing() {
            phrasing_run.push(node);
        } else {
            flush_run(&mut phrasing_run, &mut result);
            result.push(node);
        }
    }
    flush_run(&mut phrasing_run, &mut result);

    result
}

fn flush_run(run: &mut Vec<Handle>, result: &mut Vec<Handle>) {
    if run.is_empty() {
        return;
    }
    let run = std::mem::take(run);
    if !is_whitespace_only(&run) {
        result.push(AstNode::new_with_children(AstData::Paragraph, run));
    }
}

/// Check whether any node in the list is non-phrasing, i.e. wrapping is
/// needed to keep phrasing and flow content apart.
fn wrap_needed(nodes: &[Handle]) -> bool {
    nodes
        .iter()
        .any(|node| !node.is_phrasing() || wrap_needed(&node.children.borrow()))
}

/// Dissolve inline wrappers that straddle block content: a Link or
/// Strikethrough whose subtree contains flow nodes is replaced by its
/// children so each block child can stand on its own.
fn dissolve_straddling(nodes: Vec<Handle>) -> Vec<Handle> {
    let mut result = Vec::new();
    for node in nodes {
        let straddles = matches!(
            &*node.data.borrow(),
            AstData::Link { .. } | AstData::Strikethrough
        ) && node.children.borrow().iter().any(|c| c.is_flow());
        if straddles {
            result.extend(node.children_snapshot());
        } else {
            result.push(node);
        }
    }
    result
}

/// Check if a list of nodes contains only whitespace text.
pub(crate) fn is_whitespace_only(nodes: &[Handle]) -> bool {
    nodes.iter().all(|node| match &*node.data.borrow() {
        AstData::Text { value } => value.trim().is_empty(),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::text;

    #[test]
    fn phrasing_only_input_is_untouched() {
        let nodes = vec![text("a"), text("b")];
        let wrapped = wrap(nodes);
        assert_eq!(wrapped.len(), 2);
        assert!(matches!(&*wrapped[0].data.borrow(), AstData::Text { .. }));
    }

    #[test]
    fn mixed_content_wraps_phrasing_runs() {
        let nodes = vec![
            text("before"),
            AstNode::new(AstData::ThematicBreak),
            text("after"),
        ];
        let wrapped = wrap(nodes);
        assert_eq!(wrapped.len(), 3);
        assert!(matches!(&*wrapped[0].data.borrow(), AstData::Paragraph));
        assert!(matches!(
            &*wrapped[1].data.borrow(),
            AstData::ThematicBreak
        ));
        assert!(matches!(&*wrapped[2].data.borrow(), AstData::Paragraph));
    }

    #[test]
    fn whitespace_runs_between_blocks_are_dropped() {
        let nodes = vec![
            AstNode::new(AstData::ThematicBreak),
            text("  \n"),
            AstNode::new(AstData::ThematicBreak),
        ];
        let wrapped = wrap(nodes);
        assert_eq!(wrapped.len(), 2);
    }

    #[test]
    fn straddling_link_is_dissolved() {
        let link = AstNode::new_with_children(
            AstData::Link {
                url: "https://example.com".into(),
                title: None,
            },
            vec![AstNode::new_with_children(
                AstData::Paragraph,
                vec![text("inside")],
            )],
        );
        let wrapped = wrap(vec![link]);
        assert_eq!(wrapped.len(), 1);
        assert!(matches!(&*wrapped[0].data.borrow(), AstData::Paragraph));
    }
}
