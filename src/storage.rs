// AST storage.
//
// A key/value surface over whole trees. The canonical backend is in-memory;
// the stored form is a parent-free mirror with serde derives, so any
// persistent backend can round-trip it and rebuild the back-references with
// `tree::establish` on load.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tree::{self, AstData, AstNode, Handle};

/// Parent-free serializable mirror of a tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredNode {
    pub data: AstData,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StoredNode>,
}

impl StoredNode {
    /// Capture a tree, dropping the parent back-references.
    pub fn from_handle(node: &Handle) -> Self {
        StoredNode {
            data: node.data.borrow().clone(),
            meta: node.meta.borrow().clone(),
            children: node
                .children
                .borrow()
                .iter()
                .map(StoredNode::from_handle)
                .collect(),
        }
    }

    /// Rebuild a live tree; back-references are re-established.
    pub fn to_handle(&self) -> Handle {
        let node = AstNode::new(self.data.clone());
        *node.meta.borrow_mut() = self.meta.clone();
        for child in &self.children {
            node.children.borrow_mut().push(child.to_handle());
        }
        tree::establish(std::slice::from_ref(&node));
        node
    }
}

/// The storage contract.
pub trait AstStorage {
    fn store(&mut self, id: &str, ast: &Handle) -> Result<(), Error>;
    fn retrieve(&self, id: &str) -> Option<Handle>;
    fn exists(&self, id: &str) -> bool;
    fn delete(&mut self, id: &str) -> bool;
    fn list(&self) -> Vec<String>;
}

/// Backend configuration.
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Reject stores beyond this many entries. None means unbounded.
    pub max_entries: Option<usize>,
}

/// The canonical in-memory backend.
#[derive(Default)]
pub struct MemoryStorage {
    entries: HashMap<String, StoredNode>,
    options: StorageOptions,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: StorageOptions) -> Self {
        Self {
            entries: HashMap::new(),
            options,
        }
    }
}

impl AstStorage for MemoryStorage {
    fn store(&mut self, id: &str, ast: &Handle) -> Result<(), Error> {
        if let Some(max) = self.options.max_entries {
            if self.entries.len() >= max && !self.entries.contains_key(id) {
                return Err(Error::Normalization {
                    node_type: ast.kind().to_string(),
                    message: format!("storage full ({max} entries)"),
                });
            }
        }
        self.entries
            .insert(id.to_string(), StoredNode::from_handle(ast));
        Ok(())
    }

    fn retrieve(&self, id: &str) -> Option<Handle> {
        self.entries.get(id).map(StoredNode::to_handle)
    }

    fn exists(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    fn delete(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{append, text, text_content};
    use pretty_assertions::assert_eq;

    fn sample_tree() -> Handle {
        let doc = AstNode::new(AstData::Document);
        let p = AstNode::new_with_children(AstData::Paragraph, vec![text("hello")]);
        append(&doc, p);
        doc
    }

    #[test]
    fn store_and_retrieve_round_trips() {
        let mut storage = MemoryStorage::new();
        storage.store("doc-1", &sample_tree()).unwrap();
        assert!(storage.exists("doc-1"));

        let restored = storage.retrieve("doc-1").unwrap();
        assert_eq!(text_content(&restored), "hello");
        // Back-references were rebuilt on load.
        assert!(tree::verify(std::slice::from_ref(&restored)).is_empty());
    }

    #[test]
    fn retrieved_trees_are_independent_copies() {
        let mut storage = MemoryStorage::new();
        storage.store("doc", &sample_tree()).unwrap();
        let first = storage.retrieve("doc").unwrap();
        tree::append(&first, AstNode::new(AstData::ThematicBreak));
        let second = storage.retrieve("doc").unwrap();
        assert_eq!(second.children.borrow().len(), 1);
    }

    #[test]
    fn serialized_form_has_no_parent_field() {
        let stored = StoredNode::from_handle(&sample_tree());
        let json = serde_json::to_string(&stored).unwrap();
        assert!(!json.contains("parent"), "{json}");
        let back: StoredNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stored);
    }

    #[test]
    fn delete_and_list() {
        let mut storage = MemoryStorage::new();
        storage.store("b", &sample_tree()).unwrap();
        storage.store("a", &sample_tree()).unwrap();
        assert_eq!(storage.list(), vec!["a", "b"]);
        assert!(storage.delete("a"));
        assert!(!storage.delete("a"));
        assert_eq!(storage.list(), vec!["b"]);
    }

    #[test]
    fn max_entries_rejects_new_keys_only() {
        let mut storage = MemoryStorage::with_options(StorageOptions {
            max_entries: Some(1),
        });
        storage.store("one", &sample_tree()).unwrap();
        assert!(storage.store("two", &sample_tree()).is_err());
        // Overwriting an existing key is always allowed.
        storage.store("one", &sample_tree()).unwrap();
    }
}
