//! Path Index
//!
//! Maps instance paths such as
//! `/ietf-interfaces:interfaces/interface[name='eth0']/enabled` to the live
//! data node at that position. Entries hold `Weak` references so the index
//! never keeps a node alive; a dropped tree leaves dead entries behind only
//! until it unregisters them (or until [`PathIndex::prune`]).
//!
//! The index is passed explicitly to every tree that should use it, wrapped
//! as a [`SharedPathIndex`]. Several partial trees sharing one index can
//! resolve leafrefs across each other.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::{Rc, Weak};
use tracing::trace;

use crate::error::{Result, Violation, YangError};
use crate::restriction::LeafValue;
use crate::tree::{DataNode, NodeRef};

pub type SharedPathIndex = Rc<RefCell<PathIndex>>;

#[derive(Debug, Default)]
pub struct PathIndex {
    entries: HashMap<String, IndexEntry>,
    /// Schema path -> instance paths
    by_schema_path: HashMap<String, BTreeSet<String>>,
}

#[derive(Debug)]
struct IndexEntry {
    node: Weak<RefCell<DataNode>>,
    /// Taken from the node's schema, never re-parsed from the instance path
    schema_path: String,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh index ready to be handed to trees
    pub fn shared() -> SharedPathIndex {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn register(&mut self, path: &str, node: &NodeRef) -> Result<()> {
        match self.entries.get(path).and_then(|e| e.node.upgrade()) {
            Some(existing) if Rc::ptr_eq(&existing, node) => return Ok(()),
            Some(_) => return Err(YangError::validation(path, Violation::PathInUse)),
            None => {}
        }
        // A dead entry may still be listed under its schema path
        self.unregister(path);

        let schema_path = node.borrow().schema().schema_path.clone();
        self.by_schema_path
            .entry(schema_path.clone())
            .or_default()
            .insert(path.to_string());
        self.entries.insert(
            path.to_string(),
            IndexEntry {
                node: Rc::downgrade(node),
                schema_path,
            },
        );
        trace!(path = %path, "registered");
        Ok(())
    }

    /// Remove `path`; returns whether it was present
    pub fn unregister(&mut self, path: &str) -> bool {
        let Some(entry) = self.entries.remove(path) else {
            return false;
        };
        if let Some(paths) = self.by_schema_path.get_mut(&entry.schema_path) {
            paths.remove(path);
            if paths.is_empty() {
                self.by_schema_path.remove(&entry.schema_path);
            }
        }
        trace!(path = %path, "unregistered");
        true
    }

    /// Unregister `path` only if it still points at `node`
    pub(crate) fn release(&mut self, path: &str, node: &NodeRef) {
        let owned = match self.entries.get(path) {
            Some(entry) => entry.node.as_ptr() == Rc::as_ptr(node),
            None => false,
        };
        if owned {
            self.unregister(path);
        }
    }

    pub fn lookup(&self, path: &str) -> Result<NodeRef> {
        self.entries
            .get(path)
            .and_then(|e| e.node.upgrade())
            .ok_or_else(|| YangError::PathNotFound {
                path: path.to_string(),
            })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.get(path).map(|e| e.node.strong_count() > 0).unwrap_or(false)
    }

    /// Live nodes instantiated from the schema node at `schema_path`
    pub fn instances_of(&self, schema_path: &str) -> Vec<NodeRef> {
        self.by_schema_path
            .get(schema_path)
            .into_iter()
            .flatten()
            .filter_map(|path| self.entries.get(path).and_then(|e| e.node.upgrade()))
            .collect()
    }

    /// True if some live instance of `schema_path` holds `value`
    pub fn has_value(&self, schema_path: &str, value: &LeafValue) -> bool {
        self.instances_of(schema_path).iter().any(|node| match &*node.borrow() {
            DataNode::Leaf(leaf) => leaf.value.as_ref() == Some(value),
            DataNode::LeafList(list) => list.values.contains(value),
            _ => false,
        })
    }

    /// Drop entries whose node is gone; returns how many were removed
    pub fn prune(&mut self) -> usize {
        let dead: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.node.strong_count() == 0)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &dead {
            self.unregister(path);
        }
        dead.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }
}

/// Remove `[...]` predicates from a path, honoring quoted values
pub fn strip_predicates(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in path.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') if depth > 0 => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') if depth > 0 => depth -= 1,
            (None, c) if depth == 0 => out.push(c),
            (None, _) => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_predicates() {
        assert_eq!(
            strip_predicates("/m:top/list[name='a/b]'][id='2']/leaf"),
            "/m:top/list/leaf"
        );
        assert_eq!(strip_predicates("/m:routes/route[3]/prefix"), "/m:routes/route/prefix");
        assert_eq!(strip_predicates("/m:plain"), "/m:plain");
    }

    #[test]
    fn test_unregister_unknown_path() {
        let mut index = PathIndex::new();
        assert!(!index.unregister("/m:nothing"));
        assert!(matches!(
            index.lookup("/m:nothing"),
            Err(YangError::PathNotFound { .. })
        ));
        assert_eq!(index.prune(), 0);
    }
}
