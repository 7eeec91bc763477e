// DOM → Markdown tree conversion.
//
// Walks the normalized DOM produced by the parser adapter and dispatches each
// element to a registered tag rule. Rules produce `tree` nodes; the walker
// maintains the ancestor stack, captures the first <base> href, and degrades
// gracefully when a rule fails.

pub(crate) mod registry;
pub(crate) mod rules;
pub(crate) mod wrap;

use url::Url;

use crate::error::Error;
use crate::tree::{append, AstData, AstNode, Handle};

pub use registry::{Registry, TagRule};
pub use rules::default_registry;

/// Output of a walk: the Markdown tree plus the rule failures that were
/// degraded into empty text nodes along the way.
pub struct WalkResult {
    pub root: Handle,
    pub warnings: Vec<Error>,
}

/// Traversal context handed to tag rules.
///
/// Exposes the ancestor path (uppercase tag names, outermost first), ancestor
/// queries, recursive child rendering through the registry, and URL
/// resolution against the document's frozen base.
pub struct Context<'a> {
    registry: &'a Registry,
    ancestors: Vec<String>,
    base_url: Option<Url>,
    warnings: Vec<Error>,
}

impl<'a> Context<'a> {
    fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            ancestors: Vec::new(),
            base_url: None,
            warnings: Vec::new(),
        }
    }

    /// The ancestor path of the current element, outermost first.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Whether any ancestor has the given tag name (case-insensitive).
    pub fn is_inside(&self, tag: &str) -> bool {
        self.ancestors.iter().any(|a| a.eq_ignore_ascii_case(tag))
    }

    /// Resolve a URL against the frozen base URL, when one was seen.
    pub fn resolve(&self, raw: &str) -> String {
        if let Some(base) = &self.base_url {
            if let Ok(resolved) = base.join(raw) {
                return resolved.to_string();
            }
        }
        raw.to_string()
    }

    /// Recursively convert an element's children through the registry,
    /// splicing each child's results in source order.
    pub fn render_children(&mut self, element: &Handle) -> Vec<Handle> {
        let tag = element.tag_name();
        if let Some(tag) = &tag {
            self.ancestors.push(tag.clone());
        }
        let mut result = Vec::new();
        for child in element.children_snapshot() {
            result.extend(self.one(&child));
        }
        if tag.is_some() {
            self.ancestors.pop();
        }
        result
    }

    /// Convert a single DOM node.
    fn one(&mut self, node: &Handle) -> Vec<Handle> {
        let data = node.data.borrow().clone();
        match data {
            AstData::Text { value } => {
                if value.is_empty() {
                    vec![]
                } else {
                    vec![AstNode::new(AstData::Text { value })]
                }
            }
            AstData::Comment { value } => {
                vec![AstNode::new(AstData::Html {
                    value: format!("<!--{value}-->"),
                })]
            }
            AstData::Element { ref name, .. } => self.dispatch(node, name),
            AstData::Document => self.render_children(node),
            _ => vec![],
        }
    }

    fn dispatch(&mut self, element: &Handle, tag: &str) -> Vec<Handle> {
        if crate::debug::is_enabled() && self.ancestors.len() <= crate::debug::trace_depth() {
            tracing::trace!(tag, depth = self.ancestors.len(), "dispatch");
        }

        // The first <base href> freezes the document base URL.
        if tag == "BASE" {
            if self.base_url.is_none() {
                if let Some(href) = element.get_attribute("href") {
                    self.base_url = Url::parse(&href).ok();
                }
            }
            return vec![];
        }

        if self.registry.is_ignored(tag) {
            return vec![];
        }

        if let Some(rule) = self.registry.get(tag) {
            return match rule.emit(element, self) {
                Ok(nodes) => nodes,
                Err(cause) => {
                    let error = Error::Rule {
                        tag_name: tag.to_string(),
                        cause: cause.to_string(),
                    };
                    tracing::warn!(tag, %cause, "tag rule failed, emitting empty text");
                    self.warnings.push(error);
                    vec![AstNode::new(AstData::Text {
                        value: String::new(),
                    })]
                }
            };
        }

        if let Some(rule) = self.registry.default_rule() {
            return match rule.emit(element, self) {
                Ok(nodes) => nodes,
                Err(cause) => {
                    tracing::warn!(tag, %cause, "default rule failed, walking transparently");
                    self.render_children(element)
                }
            };
        }

        if self.registry.is_passthrough(tag) {
            // Walk transparently: children in place, the element discarded.
            self.render_children(element)
        } else {
            // Unknown element with no rule: retain as raw HTML.
            vec![AstNode::new(AstData::Html {
                value: crate::tree::outer_html(element),
            })]
        }
    }
}

/// Convert a normalized DOM into a Markdown tree using the given registry.
pub fn walk(dom: &Handle, registry: &Registry) -> WalkResult {
    let mut cx = Context::new(registry);
    let children = cx.render_children(dom);
    let children = wrap::wrap(children);

    let root = AstNode::new(AstData::Document);
    for child in children {
        append(&root, child);
    }
    WalkResult {
        root,
        warnings: cx.warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, ParseOptions};

    fn walk_html(html: &str) -> Handle {
        let dom = parse(html, &ParseOptions::default()).unwrap();
        walk(&dom, &default_registry()).root
    }

    #[test]
    fn walks_heading_into_heading_node() {
        let root = walk_html("<h2>Title</h2>");
        let children = root.children.borrow();
        assert_eq!(children.len(), 1);
        assert!(matches!(
            &*children[0].data.borrow(),
            AstData::Heading { level: 2 }
        ));
    }

    #[test]
    fn child_order_follows_source_order() {
        let root = walk_html("<p>one</p><p>two</p><p>three</p>");
        let texts: Vec<String> = root
            .children
            .borrow()
            .iter()
            .map(crate::tree::text_content)
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn unknown_tag_without_passthrough_is_retained_as_raw_html() {
        let root = walk_html("<p>a</p><fancy-widget data-x=\"1\">inner</fancy-widget>");
        let children = root.children.borrow();
        let raw = children
            .iter()
            .find(|c| matches!(&*c.data.borrow(), AstData::Html { .. }))
            .expect("raw html node");
        if let AstData::Html { value } = &*raw.data.borrow() {
            assert!(value.contains("<fancy-widget"));
            assert!(value.contains("inner"));
        };
    }

    #[test]
    fn walking_is_deterministic() {
        let html = "<h1>T</h1><ul><li>a</li><li>b</li></ul>";
        let one = crate::serialize::serialize(
            &walk_html(html),
            &crate::serialize::SerializeOptions::default(),
        )
        .unwrap();
        let two = crate::serialize::serialize(
            &walk_html(html),
            &crate::serialize::SerializeOptions::default(),
        )
        .unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn parents_are_established_during_walk() {
        let root = walk_html("<ul><li>a</li></ul>");
        assert!(crate::tree::verify(std::slice::from_ref(&root)).is_empty());
    }
}
