//! Data Tree
//!
//! A mutable instance of a compiled [`Schema`]. Every container, leaf and
//! leaf-list named by the schema exists as soon as its parent does; list
//! entries come and go through [`List::add`] and [`List::remove`].
//!
//! Trees are single-threaded. Handles ([`Container`], [`List`], [`Leaf`],
//! [`LeafList`]) are cheap clones of a shared node plus the tree context.

mod container;
mod leaf;
mod list;
mod node;

pub use container::Container;
pub use leaf::{Leaf, LeafList};
pub use list::List;
pub use node::{ContainerData, DataNode, LeafData, LeafListData, ListData, NodeRef};

pub(crate) use node::has_content;

use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Result, Violation, YangError};
use crate::identity::Resolution;
use crate::path_index::SharedPathIndex;
use crate::restriction::{LeafRefResolver, LeafValue, ValidationContext};
use crate::schema::{Children, NodeSchema, Schema, SchemaKind};

// =============================================================================
// Tree Context
// =============================================================================

/// Shared by every handle of one tree
#[derive(Clone)]
pub(crate) struct TreeContext {
    pub(crate) schema: Arc<Schema>,
    pub(crate) index: Option<SharedPathIndex>,
}

impl TreeContext {
    /// Validate `raw` for the leaf or leaf-list described by `leaf`
    pub(crate) fn validate(
        &self,
        leaf: &NodeSchema,
        raw: &Value,
        resolution: Resolution,
        check_instance: bool,
    ) -> std::result::Result<LeafValue, Violation> {
        let ty = leaf
            .leaf_type()
            .ok_or_else(|| Violation::Other(format!("{} is not a leaf", leaf.schema_path)))?;
        let resolver = TargetResolver {
            ctx: self,
            leaf,
            check_instance,
        };
        let vctx = ValidationContext {
            identities: &self.schema.identities,
            module: &leaf.module,
            resolution,
            leafref: Some(&resolver),
        };
        ty.validate(raw, &vctx)
    }
}

/// Resolves leafrefs against the schema target and the path index
struct TargetResolver<'a> {
    ctx: &'a TreeContext,
    leaf: &'a NodeSchema,
    check_instance: bool,
}

impl LeafRefResolver for TargetResolver<'_> {
    fn resolve(
        &self,
        raw: &Value,
        require_instance: bool,
        outer: &ValidationContext<'_>,
    ) -> std::result::Result<LeafValue, Violation> {
        let target = self
            .ctx
            .schema
            .leafref_target(&self.leaf.schema_path)
            .ok_or_else(|| Violation::Other(format!("no leafref target for {}", self.leaf.schema_path)))?;
        let ty = target
            .leaf_type()
            .ok_or_else(|| Violation::Other(format!("{} is not a leaf", target.schema_path)))?;

        let nested = TargetResolver {
            ctx: self.ctx,
            leaf: target,
            check_instance: false,
        };
        let vctx = ValidationContext {
            identities: outer.identities,
            module: &target.module,
            resolution: outer.resolution,
            leafref: Some(&nested),
        };
        let value = ty.validate(raw, &vctx)?;

        if require_instance && self.check_instance {
            if let Some(index) = &self.ctx.index {
                if !index.borrow().has_value(&target.schema_path, &value) {
                    return Err(Violation::MissingInstance {
                        target: target.schema_path.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }

        Ok(value)
    }
}

// =============================================================================
// Node Handles
// =============================================================================

/// Any node of a tree
#[derive(Clone)]
pub enum Node {
    Container(Container),
    List(List),
    Leaf(Leaf),
    LeafList(LeafList),
}

impl Node {
    pub(crate) fn wrap(node: NodeRef, ctx: TreeContext) -> Self {
        if matches!(&*node.borrow(), DataNode::Container(_)) {
            Node::Container(Container { node, ctx })
        } else if matches!(&*node.borrow(), DataNode::List(_)) {
            Node::List(List { node, ctx })
        } else if matches!(&*node.borrow(), DataNode::Leaf(_)) {
            Node::Leaf(Leaf { node, ctx })
        } else {
            Node::LeafList(LeafList { node, ctx })
        }
    }

    pub fn node_ref(&self) -> &NodeRef {
        match self {
            Node::Container(c) => &c.node,
            Node::List(l) => &l.node,
            Node::Leaf(l) => &l.node,
            Node::LeafList(l) => &l.node,
        }
    }

    pub fn path(&self) -> String {
        self.node_ref().borrow().path().to_string()
    }

    pub fn schema(&self) -> Arc<NodeSchema> {
        self.node_ref().borrow().schema().clone()
    }

    pub(crate) fn wrong_kind(&self, expected: &str) -> YangError {
        YangError::validation(
            self.path(),
            Violation::Type {
                expected: expected.to_string(),
                found: self.schema().kind_name().to_string(),
            },
        )
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.schema().kind_name(), self.path())
    }
}

// =============================================================================
// Data Tree
// =============================================================================

pub struct DataTree {
    root: Container,
}

impl DataTree {
    /// Instantiate every top-level node of `schema`
    pub fn new(schema: Arc<Schema>, index: Option<SharedPathIndex>) -> Result<Self> {
        let root_schema = schema.root.clone();
        Self::build(schema, index, root_schema)
    }

    /// Instantiate only the named top-level nodes (`module:name` or a unique bare name)
    pub fn partial(schema: Arc<Schema>, index: Option<SharedPathIndex>, names: &[&str]) -> Result<Self> {
        let top = schema
            .root
            .children()
            .ok_or_else(|| YangError::schema("schema root has no children"))?;

        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let idx = top
                .find(name, "", &schema.modules)
                .map_err(|v| YangError::validation(format!("/{}", name), v))?;
            if let Some(child) = top.get(idx) {
                if !selected.iter().any(|s| Arc::ptr_eq(s, child)) {
                    selected.push(child.clone());
                }
            }
        }

        let root_schema = Arc::new(NodeSchema {
            name: String::new(),
            module: String::new(),
            schema_path: String::new(),
            augmentation: false,
            kind: SchemaKind::Container {
                children: Children::new(selected)?,
            },
        });
        Self::build(schema, index, root_schema)
    }

    fn build(schema: Arc<Schema>, index: Option<SharedPathIndex>, root_schema: Arc<NodeSchema>) -> Result<Self> {
        let mut children = Vec::new();
        if let Some(top) = root_schema.children() {
            for child in top.iter() {
                match node::instantiate(child, node::child_path("", "", child), index.as_ref()) {
                    Ok(node) => children.push(node),
                    Err(e) => {
                        if let Some(index) = &index {
                            for node in &children {
                                node::release(node, index);
                            }
                        }
                        return Err(e);
                    }
                }
            }
        }

        let node = Rc::new(RefCell::new(DataNode::Container(ContainerData {
            schema: root_schema,
            path: String::new(),
            children,
        })));
        Ok(Self {
            root: Container {
                node,
                ctx: TreeContext { schema, index },
            },
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.root.ctx.schema
    }

    pub fn index(&self) -> Option<&SharedPathIndex> {
        self.root.ctx.index.as_ref()
    }

    /// The synthetic root; its children are the top-level nodes
    pub fn root(&self) -> &Container {
        &self.root
    }

    pub fn child(&self, name: &str) -> Result<Node> {
        self.root.child(name)
    }

    pub fn container(&self, name: &str) -> Result<Container> {
        self.root.container(name)
    }

    pub fn list(&self, name: &str) -> Result<List> {
        self.root.list(name)
    }

    /// Node at an instance path, via the path index
    pub fn node_at(&self, path: &str) -> Result<Node> {
        let index = self.index().ok_or_else(|| YangError::PathNotFound {
            path: path.to_string(),
        })?;
        let node = index.borrow().lookup(path)?;
        Ok(Node::wrap(node, self.root.ctx.clone()))
    }

    /// True if anything in the tree was explicitly set
    pub fn has_content(&self) -> bool {
        has_content(&self.root.node.borrow())
    }
}

impl Drop for DataTree {
    fn drop(&mut self) {
        if let Some(index) = &self.root.ctx.index {
            node::release(&self.root.node, index);
        }
    }
}

impl PartialEq for DataTree {
    fn eq(&self, other: &Self) -> bool {
        if !Arc::ptr_eq(self.schema(), other.schema()) {
            return false;
        }
        match (&*self.root.node.borrow(), &*other.root.node.borrow()) {
            (DataNode::Container(a), DataNode::Container(b)) => a.children == b.children,
            _ => false,
        }
    }
}

impl fmt::Debug for DataTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let top: Vec<String> = self.root.children().iter().map(|n| n.path()).collect();
        f.debug_struct("DataTree")
            .field("top_level", &top)
            .field("indexed", &self.index().is_some())
            .finish()
    }
}
