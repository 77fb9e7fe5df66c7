use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::node::{has_content, DataNode, NodeRef};
use super::{Leaf, LeafList, List, Node, TreeContext};
use crate::error::{Result, Violation, YangError};
use crate::restriction::LeafValue;
use crate::schema::{NodeSchema, QName};

/// Handle to a container, a list entry or the tree root
#[derive(Clone)]
pub struct Container {
    pub(crate) node: NodeRef,
    pub(crate) ctx: TreeContext,
}

impl Container {
    pub fn path(&self) -> String {
        self.node.borrow().path().to_string()
    }

    pub fn schema(&self) -> Arc<NodeSchema> {
        self.node.borrow().schema().clone()
    }

    /// Owning module; empty for the tree root
    pub fn module(&self) -> String {
        self.node.borrow().schema().module.clone()
    }

    pub fn is_root(&self) -> bool {
        self.node.borrow().schema().is_root()
    }

    /// Child by local name or `module:name`
    pub fn child(&self, name: &str) -> Result<Node> {
        let child = {
            let data = self.node.borrow();
            let DataNode::Container(container) = &*data else {
                return Err(YangError::validation(data.path(), Violation::Other("not a container".to_string())));
            };
            let children = container.schema.children().ok_or_else(|| {
                YangError::validation(&container.path, Violation::Other("node has no children".to_string()))
            })?;
            let idx = children
                .find(name, &container.schema.module, &self.ctx.schema.modules)
                .map_err(|v| YangError::validation(format!("{}/{}", container.path, name), v))?;
            container.children.get(idx).cloned().ok_or_else(|| YangError::PathNotFound {
                path: format!("{}/{}", container.path, name),
            })?
        };
        Ok(Node::wrap(child, self.ctx.clone()))
    }

    /// Child by exact qualified name, used by the decoder
    pub(crate) fn child_by_qname(&self, qname: &QName) -> Option<Node> {
        let child = {
            let data = self.node.borrow();
            let DataNode::Container(container) = &*data else {
                return None;
            };
            let idx = container.schema.children()?.position(qname)?;
            container.children.get(idx)?.clone()
        };
        Some(Node::wrap(child, self.ctx.clone()))
    }

    /// "Did you mean" hint for an unknown member name
    pub(crate) fn unknown_member(&self, name: &str) -> Violation {
        match self.schema().children() {
            Some(children) => children.unknown(name),
            None => Violation::UnknownMember {
                name: name.to_string(),
                suggestion: None,
            },
        }
    }

    pub fn container(&self, name: &str) -> Result<Container> {
        match self.child(name)? {
            Node::Container(c) => Ok(c),
            other => Err(other.wrong_kind("container")),
        }
    }

    pub fn list(&self, name: &str) -> Result<List> {
        match self.child(name)? {
            Node::List(l) => Ok(l),
            other => Err(other.wrong_kind("list")),
        }
    }

    pub fn leaf(&self, name: &str) -> Result<Leaf> {
        match self.child(name)? {
            Node::Leaf(l) => Ok(l),
            other => Err(other.wrong_kind("leaf")),
        }
    }

    pub fn leaf_list(&self, name: &str) -> Result<LeafList> {
        match self.child(name)? {
            Node::LeafList(l) => Ok(l),
            other => Err(other.wrong_kind("leaf-list")),
        }
    }

    /// Shorthand for `self.leaf(name)?.set(value)`
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.leaf(name)?.set(value)
    }

    /// Shorthand for `self.leaf(name)?.value()`
    pub fn get(&self, name: &str) -> Result<Option<LeafValue>> {
        Ok(self.leaf(name)?.value())
    }

    pub fn children(&self) -> Vec<Node> {
        let children: Vec<NodeRef> = match &*self.node.borrow() {
            DataNode::Container(c) => c.children.clone(),
            _ => Vec::new(),
        };
        children
            .into_iter()
            .map(|child| Node::wrap(child, self.ctx.clone()))
            .collect()
    }

    /// True if anything below was explicitly set
    pub fn has_content(&self) -> bool {
        has_content(&self.node.borrow())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Container({})", self.path())
    }
}
