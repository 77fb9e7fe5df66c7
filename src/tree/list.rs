use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::node::{self, DataNode, NodeRef};
use super::{Container, Leaf, TreeContext};
use crate::error::{Result, Violation, YangError};
use crate::identity::Resolution;
use crate::restriction::LeafValue;
use crate::schema::{NodeSchema, QName};

/// Handle to a keyed (or keyless) list
#[derive(Clone)]
pub struct List {
    pub(crate) node: NodeRef,
    pub(crate) ctx: TreeContext,
}

impl List {
    pub fn path(&self) -> String {
        self.node.borrow().path().to_string()
    }

    pub fn schema(&self) -> Arc<NodeSchema> {
        self.node.borrow().schema().clone()
    }

    /// Key leaf names in schema order
    pub fn key_names(&self) -> Vec<String> {
        self.schema().keys().to_vec()
    }

    pub fn len(&self) -> usize {
        self.read(|l| l.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical entry keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.read(|l| l.entries.keys().cloned().collect())
    }

    /// Entries in insertion order
    pub fn entries(&self) -> Vec<Container> {
        self.read(|l| l.entries.values().cloned().collect::<Vec<_>>())
            .into_iter()
            .map(|node| Container {
                node,
                ctx: self.ctx.clone(),
            })
            .collect()
    }

    /// Add an entry from a space-separated composite key.
    ///
    /// Components are taken in key order; the last one takes the remainder
    /// of the string, spaces included.
    pub fn add(&self, key: &str) -> Result<Container> {
        let schema = self.schema();
        let components = split_key(key, schema.keys()).map_err(|v| YangError::validation(self.path(), v))?;
        let values: Vec<Value> = components.into_iter().map(Value::from).collect();
        self.insert(&values, Resolution::Lenient)
    }

    /// Add an entry from one value per key leaf
    pub fn add_with(&self, components: &[Value]) -> Result<Container> {
        self.insert(components, Resolution::Lenient)
    }

    /// Add an entry to a keyless list
    pub fn append(&self) -> Result<Container> {
        let schema = self.schema();
        let list_path = self.path();
        if !schema.keys().is_empty() {
            return Err(YangError::validation(
                list_path,
                Violation::Other("list is keyed; use add".to_string()),
            ));
        }

        let seq = {
            let mut data = self.node.borrow_mut();
            let DataNode::List(list) = &mut *data else {
                return Err(YangError::validation(list_path, Violation::Other("not a list".to_string())));
            };
            list.next_seq += 1;
            list.next_seq
        };

        let entry = node::instantiate_container(&schema, format!("{}[{}]", list_path, seq), self.ctx.index.as_ref())?;
        if let DataNode::List(list) = &mut *self.node.borrow_mut() {
            list.entries.insert(seq.to_string(), entry.clone());
        }
        Ok(Container {
            node: entry,
            ctx: self.ctx.clone(),
        })
    }

    pub fn get(&self, key: &str) -> Option<Container> {
        let canonical = self.canonical_key(key)?;
        let entry = self.read(|l| l.entries.get(&canonical).cloned())?;
        Some(Container {
            node: entry,
            ctx: self.ctx.clone(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Detach an entry and drop its paths from the index
    pub fn remove(&self, key: &str) -> Result<()> {
        let removed = self
            .canonical_key(key)
            .and_then(|canonical| match &mut *self.node.borrow_mut() {
                DataNode::List(list) => list.entries.shift_remove(&canonical),
                _ => None,
            });

        let entry = removed.ok_or_else(|| YangError::PathNotFound {
            path: format!("{}[{}]", self.path(), key),
        })?;
        if let Some(index) = &self.ctx.index {
            node::release(&entry, index);
        }
        debug!(list = %self.path(), key = %key, "removed list entry");
        Ok(())
    }

    pub(crate) fn insert(&self, components: &[Value], resolution: Resolution) -> Result<Container> {
        self.insert_entry(components, resolution, true).map(|(entry, _)| entry)
    }

    /// Add an entry; with `check_instance` off, key leafrefs pointing outside
    /// the entry are returned with their raw values for a later check.
    pub(crate) fn insert_entry(
        &self,
        components: &[Value],
        resolution: Resolution,
        check_instance: bool,
    ) -> Result<(Container, Vec<(Leaf, Value)>)> {
        let schema = self.schema();
        let list_path = self.path();
        let key_names = schema.keys();

        if key_names.is_empty() {
            return Err(YangError::validation(
                list_path,
                Violation::Other("list has no keys; use append".to_string()),
            ));
        }
        if components.len() < key_names.len() {
            return Err(YangError::validation(
                list_path,
                Violation::MissingKey(key_names[components.len()].clone()),
            ));
        }
        if components.len() > key_names.len() {
            return Err(YangError::validation(
                list_path,
                Violation::Other(format!("expected {} key values, got {}", key_names.len(), components.len())),
            ));
        }

        let mut values: Vec<LeafValue> = Vec::with_capacity(key_names.len());
        let mut mirrors: Vec<(Arc<NodeSchema>, Option<Arc<NodeSchema>>)> = Vec::with_capacity(key_names.len());

        for (name, raw) in key_names.iter().zip(components) {
            let key_schema = self
                .key_schema(&schema, name)
                .ok_or_else(|| YangError::validation(&list_path, Violation::MissingKey(name.clone())))?;

            // A key pointing at a leaf of its own entry is assigned together with it
            let entry_prefix = format!("{}/", schema.schema_path);
            let in_entry = self
                .ctx
                .schema
                .leafref_target(&key_schema.schema_path)
                .filter(|t| t.schema_path.starts_with(&entry_prefix))
                .cloned();

            let value = self
                .ctx
                .validate(&key_schema, raw, resolution, check_instance && in_entry.is_none())
                .map_err(|v| YangError::validation(format!("{}/{}", list_path, name), v))?;
            values.push(value);
            mirrors.push((key_schema, in_entry));
        }

        let key = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ");
        if self.read(|l| l.entries.contains_key(&key)) {
            return Err(YangError::DuplicateKey { path: list_path, key });
        }

        let predicates: String = key_names
            .iter()
            .zip(&values)
            .map(|(name, value)| format!("[{}={}]", name, quote(&value.to_string())))
            .collect();
        let entry = node::instantiate_container(&schema, format!("{}{}", list_path, predicates), self.ctx.index.as_ref())?;

        let mut unchecked = Vec::new();
        for (((key_schema, target), value), raw) in mirrors.iter().zip(&values).zip(components) {
            if let Some(leaf) = node::find_in_entry(&entry, key_schema) {
                if let DataNode::Leaf(data) = &mut *leaf.borrow_mut() {
                    data.value = Some(value.clone());
                    data.explicitly_set = true;
                    data.is_key = true;
                }
                let leafref_key = key_schema.leaf_type().is_some_and(|t| t.involves_leafref());
                if !check_instance && target.is_none() && leafref_key {
                    let key_leaf = Leaf {
                        node: leaf.clone(),
                        ctx: self.ctx.clone(),
                    };
                    unchecked.push((key_leaf, raw.clone()));
                }
            }
            if let Some(leaf) = target.as_ref().and_then(|t| node::find_in_entry(&entry, t)) {
                if let DataNode::Leaf(data) = &mut *leaf.borrow_mut() {
                    data.value = Some(value.clone());
                    data.explicitly_set = true;
                    data.key_mirror = true;
                }
            }
        }

        if let DataNode::List(list) = &mut *self.node.borrow_mut() {
            list.entries.insert(key.clone(), entry.clone());
        }
        debug!(list = %list_path, key = %key, "added list entry");

        let entry = Container {
            node: entry,
            ctx: self.ctx.clone(),
        };
        Ok((entry, unchecked))
    }

    fn key_schema(&self, schema: &NodeSchema, name: &str) -> Option<Arc<NodeSchema>> {
        let children = schema.children()?;
        let idx = children.position(&QName::new(schema.module.clone(), name))?;
        children.get(idx).cloned()
    }

    /// Normalize a user-supplied key the same way `add` would
    fn canonical_key(&self, key: &str) -> Option<String> {
        if self.read(|l| l.entries.contains_key(key)) {
            return Some(key.to_string());
        }

        let schema = self.schema();
        let parts = split_key(key, schema.keys()).ok()?;
        let mut normalized = Vec::with_capacity(parts.len());
        for (name, part) in schema.keys().iter().zip(parts) {
            let key_schema = self.key_schema(&schema, name)?;
            let value = self
                .ctx
                .validate(&key_schema, &Value::from(part), Resolution::Lenient, false)
                .ok()?;
            normalized.push(value.to_string());
        }
        Some(normalized.join(" "))
    }

    fn read<R: Default>(&self, f: impl FnOnce(&super::ListData) -> R) -> R {
        match &*self.node.borrow() {
            DataNode::List(list) => f(list),
            _ => R::default(),
        }
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "List({}, {} entries)", self.path(), self.len())
    }
}

/// Split a composite key into one component per key leaf
fn split_key<'k>(key: &'k str, key_names: &[String]) -> std::result::Result<Vec<&'k str>, Violation> {
    if key_names.len() <= 1 {
        return Ok(vec![key]);
    }

    let mut parts = Vec::with_capacity(key_names.len());
    let mut rest = key;
    for missing in &key_names[1..] {
        match rest.split_once(' ') {
            Some((part, tail)) => {
                parts.push(part);
                rest = tail;
            }
            None => return Err(Violation::MissingKey(missing.clone())),
        }
    }
    parts.push(rest);
    Ok(parts)
}

fn quote(value: &str) -> String {
    if value.contains('\'') {
        format!("\"{}\"", value)
    } else {
        format!("'{}'", value)
    }
}
