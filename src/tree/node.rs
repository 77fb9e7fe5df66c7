//! Data node storage
//!
//! Nodes are `Rc<RefCell<DataNode>>`: the tree owns them, handles share
//! them, and the path index only holds `Weak` references.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::Result;
use crate::path_index::SharedPathIndex;
use crate::restriction::LeafValue;
use crate::schema::{NodeSchema, SchemaKind};

pub type NodeRef = Rc<RefCell<DataNode>>;

#[derive(Debug)]
pub enum DataNode {
    /// A container, the tree root, or one list entry
    Container(ContainerData),
    List(ListData),
    Leaf(LeafData),
    LeafList(LeafListData),
}

#[derive(Debug)]
pub struct ContainerData {
    pub(crate) schema: Arc<NodeSchema>,
    pub(crate) path: String,
    /// Parallel to the schema's children, except at a partial root
    pub(crate) children: Vec<NodeRef>,
}

#[derive(Debug)]
pub struct ListData {
    pub(crate) schema: Arc<NodeSchema>,
    pub(crate) path: String,
    /// Canonical key -> entry container, in insertion order
    pub(crate) entries: IndexMap<String, NodeRef>,
    /// Next sequence number for keyless entries
    pub(crate) next_seq: u64,
}

#[derive(Debug)]
pub struct LeafData {
    pub(crate) schema: Arc<NodeSchema>,
    pub(crate) path: String,
    pub(crate) value: Option<LeafValue>,
    pub(crate) explicitly_set: bool,
    pub(crate) is_key: bool,
    /// Holds the value of a key leafref pointing into the same entry
    pub(crate) key_mirror: bool,
}

#[derive(Debug)]
pub struct LeafListData {
    pub(crate) schema: Arc<NodeSchema>,
    pub(crate) path: String,
    pub(crate) values: Vec<LeafValue>,
    pub(crate) explicitly_set: bool,
}

impl DataNode {
    pub fn schema(&self) -> &Arc<NodeSchema> {
        match self {
            DataNode::Container(c) => &c.schema,
            DataNode::List(l) => &l.schema,
            DataNode::Leaf(l) => &l.schema,
            DataNode::LeafList(l) => &l.schema,
        }
    }

    /// Instance path of this node
    pub fn path(&self) -> &str {
        match self {
            DataNode::Container(c) => &c.path,
            DataNode::List(l) => &l.path,
            DataNode::Leaf(l) => &l.path,
            DataNode::LeafList(l) => &l.path,
        }
    }
}

impl PartialEq for DataNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataNode::Container(a), DataNode::Container(b)) => {
                Arc::ptr_eq(&a.schema, &b.schema) && a.path == b.path && a.children == b.children
            }
            (DataNode::List(a), DataNode::List(b)) => {
                Arc::ptr_eq(&a.schema, &b.schema)
                    && a.entries.len() == b.entries.len()
                    && a.entries.iter().zip(b.entries.iter()).all(|((ka, ea), (kb, eb))| ka == kb && ea == eb)
            }
            (DataNode::Leaf(a), DataNode::Leaf(b)) => {
                Arc::ptr_eq(&a.schema, &b.schema) && a.value == b.value && a.explicitly_set == b.explicitly_set
            }
            (DataNode::LeafList(a), DataNode::LeafList(b)) => {
                Arc::ptr_eq(&a.schema, &b.schema) && a.values == b.values && a.explicitly_set == b.explicitly_set
            }
            _ => false,
        }
    }
}

/// Instance path of `child` below a node at `parent_path` owned by `parent_module`
pub(crate) fn child_path(parent_path: &str, parent_module: &str, child: &NodeSchema) -> String {
    if child.module == parent_module {
        format!("{}/{}", parent_path, child.name)
    } else {
        format!("{}/{}:{}", parent_path, child.module, child.name)
    }
}

/// Create `schema` and everything below it at `path`
pub(crate) fn instantiate(schema: &Arc<NodeSchema>, path: String, index: Option<&SharedPathIndex>) -> Result<NodeRef> {
    let node = match &schema.kind {
        SchemaKind::Container { .. } => return instantiate_container(schema, path, index),
        SchemaKind::List { .. } => DataNode::List(ListData {
            schema: schema.clone(),
            path,
            entries: IndexMap::new(),
            next_seq: 0,
        }),
        SchemaKind::Leaf { default, .. } => DataNode::Leaf(LeafData {
            schema: schema.clone(),
            path,
            value: default.clone(),
            explicitly_set: false,
            is_key: false,
            key_mirror: false,
        }),
        SchemaKind::LeafList { .. } => DataNode::LeafList(LeafListData {
            schema: schema.clone(),
            path,
            values: Vec::new(),
            explicitly_set: false,
        }),
    };

    let node = Rc::new(RefCell::new(node));
    register(&node, index)?;
    Ok(node)
}

/// A container (or list entry) with all of its schema children
pub(crate) fn instantiate_container(
    schema: &Arc<NodeSchema>,
    path: String,
    index: Option<&SharedPathIndex>,
) -> Result<NodeRef> {
    let mut children = Vec::new();
    if let Some(child_schemas) = schema.children() {
        children.reserve(child_schemas.len());
        for child in child_schemas.iter() {
            match instantiate(child, child_path(&path, &schema.module, child), index) {
                Ok(node) => children.push(node),
                Err(e) => {
                    if let Some(index) = index {
                        for node in &children {
                            release(node, index);
                        }
                    }
                    return Err(e);
                }
            }
        }
    }

    let node = Rc::new(RefCell::new(DataNode::Container(ContainerData {
        schema: schema.clone(),
        path,
        children,
    })));
    if let Err(e) = register(&node, index) {
        if let Some(index) = index {
            release(&node, index);
        }
        return Err(e);
    }
    Ok(node)
}

fn register(node: &NodeRef, index: Option<&SharedPathIndex>) -> Result<()> {
    match index {
        Some(index) => {
            let path = node.borrow().path().to_string();
            index.borrow_mut().register(&path, node)
        }
        None => Ok(()),
    }
}

/// Unregister `node` and its whole subtree from `index`
pub(crate) fn release(node: &NodeRef, index: &SharedPathIndex) {
    let data = node.borrow();
    index.borrow_mut().release(data.path(), node);
    match &*data {
        DataNode::Container(c) => {
            for child in &c.children {
                release(child, index);
            }
        }
        DataNode::List(l) => {
            for entry in l.entries.values() {
                release(entry, index);
            }
        }
        DataNode::Leaf(_) | DataNode::LeafList(_) => {}
    }
}

/// Find the leaf for `target` inside a list entry, not descending into nested lists
pub(crate) fn find_in_entry(entry: &NodeRef, target: &Arc<NodeSchema>) -> Option<NodeRef> {
    let data = entry.borrow();
    let DataNode::Container(container) = &*data else {
        return None;
    };
    for child in &container.children {
        if Arc::ptr_eq(child.borrow().schema(), target) {
            return Some(child.clone());
        }
        if matches!(&*child.borrow(), DataNode::Container(_)) {
            if let Some(found) = find_in_entry(child, target) {
                return Some(found);
            }
        }
    }
    None
}

/// True if the subtree holds anything explicitly set or any list entry
pub(crate) fn has_content(node: &DataNode) -> bool {
    match node {
        DataNode::Container(c) => c.children.iter().any(|child| has_content(&child.borrow())),
        DataNode::List(l) => !l.entries.is_empty(),
        DataNode::Leaf(l) => l.explicitly_set,
        DataNode::LeafList(l) => l.explicitly_set,
    }
}
