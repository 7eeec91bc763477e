// Tree transformation pipeline.
//
// An ordered list of operations, each a predicate/transform pair, applied to
// the tree one complete pass at a time. Structural operations that wrap
// nodes run pre-order; everything else runs post-order. Every operation sees
// a node at most once per pass.

pub mod ops;

use url::Url;

use crate::error::Error;
use crate::tree::{self, Handle};

/// What an operation did with a node.
pub enum Action {
    /// Leave the node in place (its fields may have been mutated).
    Keep,
    /// Remove the node and its subtree.
    Remove,
    /// Replace the node with another node.
    Replace(Handle),
    /// Replace the node with a sequence of nodes spliced into the parent.
    Splice(Vec<Handle>),
}

/// Traversal order for an operation's pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Parents before children; used by wrapping operations so the fresh
    /// wrapper is not itself revisited.
    Pre,
    /// Children before parents; the default.
    Post,
}

/// Shared read-only context handed to operations.
pub struct TransformContext {
    pub root: Handle,
    pub base_url: Option<Url>,
}

/// A single transformation over the tree.
pub trait Operation {
    /// Name used in traces and error messages.
    fn name(&self) -> &'static str;

    fn order(&self) -> Order {
        Order::Post
    }

    /// Cheap predicate deciding whether `apply` runs for this node.
    fn should_apply(&self, node: &Handle) -> bool;

    fn apply(&self, node: &Handle, cx: &TransformContext) -> Result<Action, Error>;
}

/// An ordered, finite list of operations. No fixed-point iteration: each
/// operation runs exactly one pass, in registration order.
#[derive(Default)]
pub struct Pipeline {
    operations: Vec<Box<dyn Operation>>,
    base_url: Option<Url>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation at the end of the pipeline.
    pub fn push(mut self, operation: impl Operation + 'static) -> Self {
        self.operations.push(Box::new(operation));
        self
    }

    /// Base URL exposed to operations through the context.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Run every operation, in order, as one complete pass each.
    pub fn run(&self, root: &Handle) -> Result<(), Error> {
        for operation in &self.operations {
            tracing::debug!(operation = operation.name(), "transform pass");
            let cx = TransformContext {
                root: root.clone(),
                base_url: self.base_url.clone(),
            };
            match operation.order() {
                Order::Post => apply_post(operation.as_ref(), root, &cx)?,
                Order::Pre => apply_pre(operation.as_ref(), root, &cx)?,
            }
        }
        Ok(())
    }
}

fn apply_post(op: &dyn Operation, node: &Handle, cx: &TransformContext) -> Result<(), Error> {
    for child in node.children_snapshot() {
        apply_post(op, &child, cx)?;
    }
    apply_one(op, node, cx)
}

fn apply_pre(op: &dyn Operation, node: &Handle, cx: &TransformContext) -> Result<(), Error> {
    apply_one(op, node, cx)?;
    // Recurse into the original node's children: when the node was wrapped,
    // the wrapper itself is intentionally not revisited.
    for child in node.children_snapshot() {
        apply_pre(op, &child, cx)?;
    }
    Ok(())
}

fn apply_one(op: &dyn Operation, node: &Handle, cx: &TransformContext) -> Result<(), Error> {
    if !op.should_apply(node) {
        return Ok(());
    }
    match op.apply(node, cx)? {
        Action::Keep => Ok(()),
        Action::Remove => {
            tree::detach(node);
            Ok(())
        }
        Action::Replace(new) => {
            if node.parent().is_some() {
                tree::replace(node, new)?;
            }
            Ok(())
        }
        Action::Splice(nodes) => {
            if node.parent().is_none() {
                return Ok(());
            }
            for new in nodes {
                tree::insert_before(new, node)?;
            }
            tree::detach(node);
            Ok(())
        }
    }
}
