// Unified AST node model and relationship management.
//
// One node type serves both trees in the pipeline: the normalized DOM the
// parser adapter produces (Document/Element/Text/Comment) and the Markdown
// tree the walker produces. Ownership follows markup5ever_rcdom: parents own
// their children, and every non-root node carries a weak back-reference to
// its parent, used for traversal queries only.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::error::Error;

/// Reference-counted handle to a node.
pub type Handle = Rc<AstNode>;

/// Weak reference to a node, used for parent pointers.
pub type WeakHandle = Weak<AstNode>;

/// Alignment of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AlignKind {
    Left,
    Right,
    Center,
}

/// An attribute on an `Element` node. Name case is preserved as parsed;
/// lookups compare names case-insensitively.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// The tagged payload of a node.
///
/// The Markdown variants mirror mdast; `Element` and `Comment` are the looser
/// HTML-side superset sharing the same child/parent vocabulary, so the
/// transformation pipeline can run over either tree.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AstData {
    Document,

    // HTML-side variants
    Element { name: String, attrs: Vec<Attribute> },
    Comment { value: String },

    // Flow (block) content
    Heading { level: u8 },
    Paragraph,
    Blockquote,
    List { ordered: bool, start: Option<u32>, tight: bool },
    ListItem { checked: Option<bool> },
    CodeBlock { value: String, lang: Option<String>, meta: Option<String> },
    ThematicBreak,
    Table { align: Vec<Option<AlignKind>> },
    TableRow { is_header: bool },
    TableCell,
    Html { value: String },

    // Phrasing (inline) content
    Text { value: String },
    Emphasis,
    Strong,
    Strikethrough,
    Link { url: String, title: Option<String> },
    Image { url: String, title: Option<String>, alt: String },
    InlineCode { value: String },
    Break { hard: bool },

    // Footnotes (GFM)
    FootnoteDefinition { identifier: String, label: Option<String> },
    FootnoteReference { identifier: String, label: Option<String> },
}

impl AstData {
    /// Stable lowercase name of the variant, used in errors and traces.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AstData::Document => "document",
            AstData::Element { .. } => "element",
            AstData::Comment { .. } => "comment",
            AstData::Heading { .. } => "heading",
            AstData::Paragraph => "paragraph",
            AstData::Blockquote => "blockquote",
            AstData::List { .. } => "list",
            AstData::ListItem { .. } => "list-item",
            AstData::CodeBlock { .. } => "code-block",
            AstData::ThematicBreak => "thematic-break",
            AstData::Table { .. } => "table",
            AstData::TableRow { .. } => "table-row",
            AstData::TableCell => "table-cell",
            AstData::Html { .. } => "html",
            AstData::Text { .. } => "text",
            AstData::Emphasis => "emphasis",
            AstData::Strong => "strong",
            AstData::Strikethrough => "strikethrough",
            AstData::Link { .. } => "link",
            AstData::Image { .. } => "image",
            AstData::InlineCode { .. } => "inline-code",
            AstData::Break { .. } => "break",
            AstData::FootnoteDefinition { .. } => "footnote-definition",
            AstData::FootnoteReference { .. } => "footnote-reference",
        }
    }

    /// Whether this variant is phrasing (inline) content.
    pub fn is_phrasing(&self) -> bool {
        matches!(
            self,
            AstData::Text { .. }
                | AstData::Emphasis
                | AstData::Strong
                | AstData::Strikethrough
                | AstData::Link { .. }
                | AstData::Image { .. }
                | AstData::InlineCode { .. }
                | AstData::Break { .. }
                | AstData::FootnoteReference { .. }
        )
    }

    /// Whether this variant is flow (block) content.
    pub fn is_flow(&self) -> bool {
        matches!(
            self,
            AstData::Heading { .. }
                | AstData::Paragraph
                | AstData::Blockquote
                | AstData::List { .. }
                | AstData::CodeBlock { .. }
                | AstData::ThematicBreak
                | AstData::Table { .. }
                | AstData::Html { .. }
                | AstData::FootnoteDefinition { .. }
        )
    }

    /// Whether this variant never owns children.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            AstData::CodeBlock { .. }
                | AstData::ThematicBreak
                | AstData::Html { .. }
                | AstData::Comment { .. }
                | AstData::Text { .. }
                | AstData::Image { .. }
                | AstData::InlineCode { .. }
                | AstData::Break { .. }
                | AstData::FootnoteReference { .. }
        )
    }
}

/// A node in the tree. Constructed through [`AstNode::new`]; owned by its
/// parent from insertion onward.
pub struct AstNode {
    pub data: RefCell<AstData>,
    pub parent: Cell<Option<WeakHandle>>,
    pub children: RefCell<Vec<Handle>>,
    /// Free-form metadata bag (heading ids, link rel/target, …).
    pub meta: RefCell<BTreeMap<String, String>>,
}

impl std::fmt::Debug for AstNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AstNode")
            .field("data", &self.data.borrow())
            .field("children", &self.children.borrow())
            .finish_non_exhaustive()
    }
}

impl AstNode {
    /// Create a detached node.
    pub fn new(data: AstData) -> Handle {
        Rc::new(AstNode {
            data: RefCell::new(data),
            parent: Cell::new(None),
            children: RefCell::new(Vec::new()),
            meta: RefCell::new(BTreeMap::new()),
        })
    }

    /// Create a node and append the given children.
    pub fn new_with_children(data: AstData, children: Vec<Handle>) -> Handle {
        let node = AstNode::new(data);
        for child in children {
            append(&node, child);
        }
        node
    }

    /// Upgrade the weak parent pointer, if any.
    pub fn parent(&self) -> Option<Handle> {
        let weak = self.parent.take();
        let parent = weak.as_ref().and_then(Weak::upgrade);
        self.parent.set(weak);
        parent
    }

    /// Variant name of this node.
    pub fn kind(&self) -> &'static str {
        self.data.borrow().kind_name()
    }

    pub fn is_phrasing(&self) -> bool {
        self.data.borrow().is_phrasing()
    }

    pub fn is_flow(&self) -> bool {
        self.data.borrow().is_flow()
    }

    /// Snapshot of the child list (cheap handle clones), so callers can
    /// iterate without holding the `RefCell` borrow across mutation.
    pub fn children_snapshot(&self) -> Vec<Handle> {
        self.children.borrow().clone()
    }

    // -- Element accessors --------------------------------------------------

    /// Uppercase tag name, when this node is an element.
    pub fn tag_name(&self) -> Option<String> {
        match &*self.data.borrow() {
            AstData::Element { name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    /// Whether this node is an element with the given tag name
    /// (case-insensitive).
    pub fn is_element(&self, tag: &str) -> bool {
        match &*self.data.borrow() {
            AstData::Element { name, .. } => name.eq_ignore_ascii_case(tag),
            _ => false,
        }
    }

    /// Value of the named attribute (name compared case-insensitively).
    pub fn get_attribute(&self, name: &str) -> Option<String> {
        match &*self.data.borrow() {
            AstData::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name.eq_ignore_ascii_case(name))
                .map(|a| a.value.clone()),
            _ => None,
        }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    /// Set or replace an attribute. No-op on non-element nodes.
    pub fn set_attribute(&self, name: &str, value: &str) {
        if let AstData::Element { attrs, .. } = &mut *self.data.borrow_mut() {
            match attrs.iter_mut().find(|a| a.name.eq_ignore_ascii_case(name)) {
                Some(attr) => attr.value = value.to_string(),
                None => attrs.push(Attribute {
                    name: name.to_string(),
                    value: value.to_string(),
                }),
            }
        }
    }

    /// Remove an attribute if present.
    pub fn remove_attribute(&self, name: &str) {
        if let AstData::Element { attrs, .. } = &mut *self.data.borrow_mut() {
            attrs.retain(|a| !a.name.eq_ignore_ascii_case(name));
        }
    }

    /// Whether the `class` attribute contains the given token (exact,
    /// case-sensitive token match).
    pub fn has_class(&self, token: &str) -> bool {
        self.get_attribute("class")
            .is_some_and(|c| c.split_ascii_whitespace().any(|t| t == token))
    }
}

/// Convenience constructor for text nodes.
pub fn text(value: impl Into<String>) -> Handle {
    AstNode::new(AstData::Text { value: value.into() })
}

/// Concatenated text content of a subtree, in source order.
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    if let AstData::Text { value } = &*node.data.borrow() {
        out.push_str(value);
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// All elements with the given tag name (case-insensitive), in document order.
/// The root itself is included when it matches.
pub fn elements_by_tag_name(root: &Handle, tag: &str) -> Vec<Handle> {
    let mut out = Vec::new();
    collect_elements(root, tag, &mut out);
    out
}

fn collect_elements(node: &Handle, tag: &str, out: &mut Vec<Handle>) {
    if node.is_element(tag) {
        out.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect_elements(child, tag, out);
    }
}

/// All elements whose `class` attribute contains the given token (exact,
/// case-sensitive token match), in document order.
pub fn elements_by_class_name(root: &Handle, class: &str) -> Vec<Handle> {
    let mut out = Vec::new();
    collect_by_class(root, class, &mut out);
    out
}

fn collect_by_class(node: &Handle, class: &str, out: &mut Vec<Handle>) {
    if node.has_class(class) {
        out.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect_by_class(child, class, out);
    }
}

/// Serialize an element subtree back to HTML source. Tag names are emitted
/// lowercase; text is entity-escaped just enough to round-trip.
pub fn outer_html(node: &Handle) -> String {
    let mut out = String::new();
    write_html(node, &mut out);
    out
}

/// Serialize a node's children back to HTML source.
pub fn inner_html(node: &Handle) -> String {
    let mut out = String::new();
    for child in node.children.borrow().iter() {
        write_html(child, &mut out);
    }
    out
}

const VOID_ELEMENTS: &[&str] = &[
    "AREA", "BASE", "BR", "COL", "EMBED", "HR", "IMG", "INPUT", "LINK", "META", "SOURCE",
    "TRACK", "WBR",
];

fn write_html(node: &Handle, out: &mut String) {
    match &*node.data.borrow() {
        AstData::Element { name, attrs } => {
            let lower = name.to_ascii_lowercase();
            out.push('<');
            out.push_str(&lower);
            for attr in attrs {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                out.push_str(&attr.value.replace('&', "&amp;").replace('"', "&quot;"));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&name.as_str()) {
                return;
            }
            for child in node.children.borrow().iter() {
                write_html(child, out);
            }
            out.push_str("</");
            out.push_str(&lower);
            out.push('>');
        }
        AstData::Text { value } => {
            out.push_str(
                &value
                    .replace('&', "&amp;")
                    .replace('<', "&lt;")
                    .replace('>', "&gt;"),
            );
        }
        AstData::Comment { value } => {
            out.push_str("<!--");
            out.push_str(value);
            out.push_str("-->");
        }
        _ => {
            for child in node.children.borrow().iter() {
                write_html(child, out);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Graph edits
// ---------------------------------------------------------------------------

/// Append a child to a parent, detaching it from any previous parent.
pub fn append(parent: &Handle, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// Remove a node from its parent's child list and clear its back-reference.
/// A detached node keeps its own subtree intact.
pub fn detach(node: &Handle) {
    if let Some(parent) = node.parent() {
        parent
            .children
            .borrow_mut()
            .retain(|c| !Rc::ptr_eq(c, node));
    }
    node.parent.set(None);
}

/// Attach a node under a parent, optionally at a specific index. Fails when
/// the edit would create a cycle.
pub fn attach(node: &Handle, parent: &Handle, index: Option<usize>) -> Result<(), Error> {
    if Rc::ptr_eq(node, parent) || is_ancestor_of(node, parent) {
        return Err(Error::Normalization {
            node_type: node.kind().to_string(),
            message: "attach would create a cycle".into(),
        });
    }
    detach(node);
    node.parent.set(Some(Rc::downgrade(parent)));
    let mut children = parent.children.borrow_mut();
    let at = index.unwrap_or(children.len()).min(children.len());
    children.insert(at, node.clone());
    Ok(())
}

/// Replace a node with another, in place.
pub fn replace(old: &Handle, new: Handle) -> Result<(), Error> {
    let parent = old.parent().ok_or_else(|| Error::Normalization {
        node_type: old.kind().to_string(),
        message: "replace target has no parent".into(),
    })?;
    let index = position_of(&parent, old).ok_or_else(|| Error::Normalization {
        node_type: old.kind().to_string(),
        message: "replace target missing from its parent's children".into(),
    })?;
    detach(&new);
    new.parent.set(Some(Rc::downgrade(&parent)));
    parent.children.borrow_mut()[index] = new;
    old.parent.set(None);
    Ok(())
}

/// Insert a node immediately before a reference node.
pub fn insert_before(new: Handle, reference: &Handle) -> Result<(), Error> {
    let parent = reference.parent().ok_or_else(|| Error::Normalization {
        node_type: reference.kind().to_string(),
        message: "insert_before reference has no parent".into(),
    })?;
    let index = position_of(&parent, reference).unwrap_or(0);
    attach(&new, &parent, Some(index))
}

/// Insert a node immediately after a reference node.
pub fn insert_after(new: Handle, reference: &Handle) -> Result<(), Error> {
    let parent = reference.parent().ok_or_else(|| Error::Normalization {
        node_type: reference.kind().to_string(),
        message: "insert_after reference has no parent".into(),
    })?;
    let index = position_of(&parent, reference).map(|i| i + 1);
    attach(&new, &parent, index)
}

/// Index of a child within a parent's child list.
fn position_of(parent: &Handle, child: &Handle) -> Option<usize> {
    parent
        .children
        .borrow()
        .iter()
        .position(|c| Rc::ptr_eq(c, child))
}

/// Whether `a` appears in the ancestor chain of `b`.
pub fn is_ancestor_of(a: &Handle, b: &Handle) -> bool {
    let mut current = b.parent();
    while let Some(node) = current {
        if Rc::ptr_eq(&node, a) {
            return true;
        }
        current = node.parent();
    }
    false
}

// ---------------------------------------------------------------------------
// Relationship management
// ---------------------------------------------------------------------------

/// A child whose back-reference does not point at its owning parent.
#[derive(Debug, Clone)]
pub struct RelationshipFault {
    pub node: Handle,
    pub expected_parent: Handle,
    pub actual_parent: Option<Handle>,
}

/// Set every child's back-reference to its owning parent, recursively.
/// Idempotent: running it twice changes nothing.
pub fn establish(roots: &[Handle]) {
    for root in roots {
        establish_one(root);
    }
}

fn establish_one(parent: &Handle) {
    for child in parent.children.borrow().iter() {
        child.parent.set(Some(Rc::downgrade(parent)));
        establish_one(child);
    }
}

/// Check that every child's back-reference points at its owning parent.
/// Returns the faults found; an empty list means the tree satisfies the
/// ownership invariant.
pub fn verify(roots: &[Handle]) -> Vec<RelationshipFault> {
    let mut faults = Vec::new();
    for root in roots {
        verify_one(root, &mut faults);
    }
    faults
}

fn verify_one(parent: &Handle, faults: &mut Vec<RelationshipFault>) {
    for child in parent.children.borrow().iter() {
        let actual = child.parent();
        let ok = actual.as_ref().is_some_and(|p| Rc::ptr_eq(p, parent));
        if !ok {
            faults.push(RelationshipFault {
                node: child.clone(),
                expected_parent: parent.clone(),
                actual_parent: actual,
            });
        }
        verify_one(child, faults);
    }
}

/// Overwrite stale back-references, returning how many were corrected.
pub fn repair(roots: &[Handle]) -> usize {
    let mut repaired = 0;
    for root in roots {
        repair_one(root, &mut repaired);
    }
    repaired
}

fn repair_one(parent: &Handle, repaired: &mut usize) {
    for child in parent.children.borrow().iter() {
        let ok = child.parent().is_some_and(|p| Rc::ptr_eq(&p, parent));
        if !ok {
            child.parent.set(Some(Rc::downgrade(parent)));
            *repaired += 1;
        }
        repair_one(child, repaired);
    }
}

/// Structural deep copy. Back-references in the clone point at cloned
/// parents, never at the originals.
pub fn deep_clone(node: &Handle) -> Handle {
    let copy = AstNode::new(node.data.borrow().clone());
    *copy.meta.borrow_mut() = node.meta.borrow().clone();
    for child in node.children.borrow().iter() {
        append(&copy, deep_clone(child));
    }
    copy
}

// ---------------------------------------------------------------------------
// Invariant checks
// ---------------------------------------------------------------------------

/// Check the structural invariants of a produced tree: ownership links,
/// acyclicity, container constraints (list items in lists, rows in tables,
/// cells in rows), heading levels, leaf-ness, and root uniqueness.
pub fn check_invariants(root: &Handle) -> Result<(), Error> {
    if !matches!(&*root.data.borrow(), AstData::Document) {
        return Err(Error::Normalization {
            node_type: root.kind().to_string(),
            message: "root must be a document node".into(),
        });
    }
    if root.parent().is_some() {
        return Err(Error::Normalization {
            node_type: "document".into(),
            message: "document node must not have a parent".into(),
        });
    }
    let faults = verify(std::slice::from_ref(root));
    if let Some(fault) = faults.first() {
        return Err(Error::Normalization {
            node_type: fault.node.kind().to_string(),
            message: format!("{} stale parent links", faults.len()),
        });
    }
    check_node(root, root)
}

fn check_node(node: &Handle, root: &Handle) -> Result<(), Error> {
    let data = node.data.borrow().clone();

    if !Rc::ptr_eq(node, root) && matches!(data, AstData::Document) {
        return Err(Error::Normalization {
            node_type: "document".into(),
            message: "document node below the root".into(),
        });
    }
    if data.is_leaf() && !node.children.borrow().is_empty() {
        return Err(Error::Normalization {
            node_type: data.kind_name().to_string(),
            message: "leaf variant owns children".into(),
        });
    }
    if let AstData::Heading { level } = data {
        if !(1..=6).contains(&level) {
            return Err(Error::Normalization {
                node_type: "heading".into(),
                message: format!("level {level} out of range"),
            });
        }
    }
    if let AstData::List { ordered, start, .. } = data {
        if let Some(start) = start {
            if start == 0 || !ordered {
                return Err(Error::Normalization {
                    node_type: "list".into(),
                    message: "start must be positive and ordered-only".into(),
                });
            }
        }
    }

    for child in node.children.borrow().iter() {
        let child_data = child.data.borrow().clone();
        let placement_ok = match child_data {
            AstData::ListItem { .. } => matches!(data, AstData::List { .. }),
            AstData::TableRow { .. } => matches!(data, AstData::Table { .. }),
            AstData::TableCell => matches!(data, AstData::TableRow { .. }),
            _ => true,
        };
        if !placement_ok {
            return Err(Error::Normalization {
                node_type: child_data.kind_name().to_string(),
                message: format!("not allowed inside `{}`", data.kind_name()),
            });
        }
        // Inline-only variants never directly contain flow content.
        if data.is_phrasing() && child_data.is_flow() {
            return Err(Error::Normalization {
                node_type: data.kind_name().to_string(),
                message: format!("phrasing node contains flow `{}`", child_data.kind_name()),
            });
        }
        check_node(child, root)?;
    }
    Ok(())
}
