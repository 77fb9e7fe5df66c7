use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use super::node::{DataNode, LeafData, LeafListData, NodeRef};
use super::TreeContext;
use crate::error::{Result, Violation, YangError};
use crate::identity::Resolution;
use crate::restriction::{LeafValue, RestrictionSet};
use crate::schema::NodeSchema;

/// Handle to a leaf
#[derive(Clone)]
pub struct Leaf {
    pub(crate) node: NodeRef,
    pub(crate) ctx: TreeContext,
}

impl Leaf {
    pub fn path(&self) -> String {
        self.node.borrow().path().to_string()
    }

    pub fn schema(&self) -> Arc<NodeSchema> {
        self.node.borrow().schema().clone()
    }

    /// Current value: the assigned value, else the schema default
    pub fn value(&self) -> Option<LeafValue> {
        self.read(|l| l.value.clone())
    }

    /// True once assigned, false again after `reset`
    pub fn is_set(&self) -> bool {
        self.read(|l| l.explicitly_set)
    }

    pub fn is_key(&self) -> bool {
        self.read(|l| l.is_key)
    }

    pub fn default_value(&self) -> Option<LeafValue> {
        self.schema().default_value().cloned()
    }

    /// The compiled type of this leaf
    pub fn restriction(&self) -> Option<Arc<RestrictionSet>> {
        self.schema().leaf_type().cloned()
    }

    /// Validate and assign; on failure the previous value is kept
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.assign(&value.into(), Resolution::Lenient)
    }

    pub(crate) fn assign(&self, raw: &Value, resolution: Resolution) -> Result<()> {
        let (schema, path, pinned) = self.guard_key()?;
        let value = self
            .ctx
            .validate(&schema, raw, resolution, true)
            .map_err(|v| YangError::validation(&path, v))?;

        // A key mirror accepts only the value it already holds
        if let Some(current) = pinned {
            if current != value {
                return Err(YangError::validation(&path, Violation::ImmutableKey(schema.name.clone())));
            }
        }

        if let DataNode::Leaf(leaf) = &mut *self.node.borrow_mut() {
            leaf.value = Some(value);
            leaf.explicitly_set = true;
        }
        trace!(path = %path, "set leaf");
        Ok(())
    }

    /// Back to the schema default, no longer explicitly set
    pub fn reset(&self) -> Result<()> {
        let (schema, path, pinned) = self.guard_key()?;
        if pinned.is_some() {
            return Err(YangError::validation(path, Violation::ImmutableKey(schema.name.clone())));
        }
        if let DataNode::Leaf(leaf) = &mut *self.node.borrow_mut() {
            leaf.value = schema.default_value().cloned();
            leaf.explicitly_set = false;
        }
        Ok(())
    }

    /// Re-run validation of `raw` including the leafref instance check
    pub(crate) fn check_instance(&self, raw: &Value, resolution: Resolution) -> Result<()> {
        let schema = self.schema();
        self.ctx
            .validate(&schema, raw, resolution, true)
            .map(|_| ())
            .map_err(|v| YangError::validation(self.path(), v))
    }

    /// Schema and path of an assignable leaf, plus the pinned value of a key mirror
    fn guard_key(&self) -> Result<(Arc<NodeSchema>, String, Option<LeafValue>)> {
        let data = self.node.borrow();
        match &*data {
            DataNode::Leaf(leaf) if leaf.is_key => Err(YangError::validation(
                &leaf.path,
                Violation::ImmutableKey(leaf.schema.name.clone()),
            )),
            DataNode::Leaf(leaf) => {
                let pinned = if leaf.key_mirror { leaf.value.clone() } else { None };
                Ok((leaf.schema.clone(), leaf.path.clone(), pinned))
            }
            other => Err(YangError::validation(other.path(), Violation::Other("not a leaf".to_string()))),
        }
    }

    fn read<R: Default>(&self, f: impl FnOnce(&LeafData) -> R) -> R {
        match &*self.node.borrow() {
            DataNode::Leaf(leaf) => f(leaf),
            _ => R::default(),
        }
    }
}

impl fmt::Debug for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Leaf({} = {:?})", self.path(), self.value())
    }
}

/// Handle to a leaf-list
#[derive(Clone)]
pub struct LeafList {
    pub(crate) node: NodeRef,
    pub(crate) ctx: TreeContext,
}

impl LeafList {
    pub fn path(&self) -> String {
        self.node.borrow().path().to_string()
    }

    pub fn schema(&self) -> Arc<NodeSchema> {
        self.node.borrow().schema().clone()
    }

    pub fn values(&self) -> Vec<LeafValue> {
        self.read(|l| l.values.clone())
    }

    pub fn len(&self) -> usize {
        self.read(|l| l.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_set(&self) -> bool {
        self.read(|l| l.explicitly_set)
    }

    /// Replace all values; nothing changes unless every value validates
    pub fn set<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<()> {
        let raws: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.assign_all(&raws, Resolution::Lenient)
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let schema = self.schema();
        let path = self.path();
        let value = self
            .ctx
            .validate(&schema, &value.into(), Resolution::Lenient, true)
            .map_err(|v| YangError::validation(&path, v))?;

        if let DataNode::LeafList(list) = &mut *self.node.borrow_mut() {
            list.values.push(value);
            list.explicitly_set = true;
        }
        Ok(())
    }

    pub fn clear(&self) {
        if let DataNode::LeafList(list) = &mut *self.node.borrow_mut() {
            list.values.clear();
            list.explicitly_set = false;
        }
    }

    pub(crate) fn assign_all(&self, raws: &[Value], resolution: Resolution) -> Result<()> {
        let schema = self.schema();
        let path = self.path();
        let values = raws
            .iter()
            .map(|raw| self.ctx.validate(&schema, raw, resolution, true))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|v| YangError::validation(&path, v))?;

        if let DataNode::LeafList(list) = &mut *self.node.borrow_mut() {
            list.values = values;
            list.explicitly_set = true;
        }
        trace!(path = %path, "set leaf-list");
        Ok(())
    }

    fn read<R: Default>(&self, f: impl FnOnce(&LeafListData) -> R) -> R {
        match &*self.node.borrow() {
            DataNode::LeafList(list) => f(list),
            _ => R::default(),
        }
    }
}

impl fmt::Debug for LeafList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LeafList({} = {:?})", self.path(), self.values())
    }
}
