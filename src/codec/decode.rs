use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{CodecConfig, UnknownMembers};
use crate::error::{Result, Violation, YangError};
use crate::identity::Resolution;
use crate::path_index::{PathIndex, SharedPathIndex};
use crate::restriction::json_kind;
use crate::schema::{QName, Schema};
use crate::tree::{Container, DataTree, Leaf, LeafList, Node};

/// Builds data trees from RFC 7951 JSON
pub struct Decoder {
    schema: Arc<Schema>,
    unknown_members: UnknownMembers,
    index: Option<SharedPathIndex>,
    fresh_index: bool,
}

/// Leafref assignments held back until the structure exists
enum Deferred {
    Leaf(Leaf, Value),
    LeafList(LeafList, Vec<Value>),
    /// A key already in place whose target is only checked at the end
    Key(Leaf, Value),
}

impl Decoder {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            unknown_members: UnknownMembers::default(),
            index: None,
            fresh_index: true,
        }
    }

    pub fn from_config(schema: Arc<Schema>, config: &CodecConfig) -> Self {
        Self {
            schema,
            unknown_members: config.decode.unknown_members,
            index: None,
            fresh_index: config.tree.path_index,
        }
    }

    /// Decode into trees registered in a shared index.
    ///
    /// Only the top-level nodes present in a document are instantiated, so
    /// several documents can be decoded against the same index.
    pub fn with_index(mut self, index: SharedPathIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn unknown_members(mut self, policy: UnknownMembers) -> Self {
        self.unknown_members = policy;
        self
    }

    pub fn decode_str(&self, text: &str, module: &str) -> Result<DataTree> {
        let doc: Value = serde_json::from_str(text)?;
        self.decode(&doc, module)
    }

    /// Decode a whole document; bare top-level names belong to `module`.
    ///
    /// Either the complete tree is returned or nothing is: on error the
    /// partially built tree is dropped and its paths leave the index.
    pub fn decode(&self, doc: &Value, module: &str) -> Result<DataTree> {
        if !self.schema.modules.contains(module) {
            return Err(YangError::validation("/", Violation::UnknownModule(module.to_string())));
        }
        let obj = doc.as_object().ok_or_else(|| YangError::validation("/", wrong_json("object", doc)))?;

        let tree = match &self.index {
            Some(index) => {
                let names = self.top_level_names(obj, module);
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                DataTree::partial(self.schema.clone(), Some(index.clone()), &names)?
            }
            None => {
                let index = self.fresh_index.then(PathIndex::shared);
                DataTree::new(self.schema.clone(), index)?
            }
        };

        let mut deferred = Vec::new();
        self.members(tree.root(), obj, module, &mut deferred)?;

        let leafrefs = deferred.len();
        for pending in deferred {
            match pending {
                Deferred::Leaf(leaf, raw) => leaf.assign(&raw, Resolution::Strict)?,
                Deferred::LeafList(list, raws) => list.assign_all(&raws, Resolution::Strict)?,
                Deferred::Key(leaf, raw) => leaf.check_instance(&raw, Resolution::Strict)?,
            }
        }

        debug!(module = %module, leafrefs, "decoded document");
        Ok(tree)
    }

    /// `module:name` of every known top-level member of `obj`
    fn top_level_names(&self, obj: &Map<String, Value>, default_module: &str) -> Vec<String> {
        obj.keys()
            .filter_map(|key| {
                let (qualifier, local) = QName::split(key);
                let module = qualifier.unwrap_or(default_module);
                let qname = QName::new(module, local);
                self.schema.root.children()?.position(&qname)?;
                Some(qname.to_string())
            })
            .collect()
    }

    fn members(
        &self,
        container: &Container,
        obj: &Map<String, Value>,
        scope: &str,
        deferred: &mut Vec<Deferred>,
    ) -> Result<()> {
        let base_path = container.path();

        for (key, value) in obj {
            let member_path = format!("{}/{}", base_path, key);
            let (qualifier, local) = QName::split(key);
            let module = match qualifier {
                Some(q) if self.schema.modules.contains(q) => q,
                Some(q) => {
                    return Err(YangError::validation(member_path, Violation::UnknownModule(q.to_string())));
                }
                None => scope,
            };

            let Some(child) = container.child_by_qname(&QName::new(module, local)) else {
                match self.unknown_members {
                    UnknownMembers::Reject => {
                        return Err(YangError::validation(member_path, container.unknown_member(key)));
                    }
                    UnknownMembers::Ignore => {
                        warn!(path = %member_path, "skipping unknown member");
                        continue;
                    }
                }
            };

            self.node(child, value, &member_path, deferred)?;
        }

        Ok(())
    }

    fn node(&self, child: Node, value: &Value, path: &str, deferred: &mut Vec<Deferred>) -> Result<()> {
        match child {
            Node::Container(container) => {
                let obj = value
                    .as_object()
                    .ok_or_else(|| YangError::validation(path, wrong_json("object", value)))?;
                let scope = container.module();
                self.members(&container, obj, &scope, deferred)
            }
            Node::List(list) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| YangError::validation(path, wrong_json("array", value)))?;
                let schema = list.schema();

                for item in items {
                    let obj = item
                        .as_object()
                        .ok_or_else(|| YangError::validation(path, wrong_json("object", item)))?;

                    let entry = if schema.keys().is_empty() {
                        list.append()?
                    } else {
                        let mut components = Vec::with_capacity(schema.keys().len());
                        for key in schema.keys() {
                            let raw = obj
                                .get(key.as_str())
                                .or_else(|| obj.get(&format!("{}:{}", schema.module, key)))
                                .ok_or_else(|| YangError::validation(path, Violation::MissingKey(key.clone())))?;
                            components.push(raw.clone());
                        }
                        let (entry, unchecked) =
                            list.insert_entry(&components, Resolution::Strict, false)?;
                        deferred.extend(
                            unchecked
                                .into_iter()
                                .map(|(leaf, raw)| Deferred::Key(leaf, raw)),
                        );
                        entry
                    };

                    self.members(&entry, obj, &schema.module, deferred)?;
                }
                Ok(())
            }
            Node::Leaf(leaf) => {
                if value.is_null() || leaf.is_key() {
                    return Ok(());
                }
                if involves_leafref(&leaf.schema()) {
                    deferred.push(Deferred::Leaf(leaf, value.clone()));
                    Ok(())
                } else {
                    leaf.assign(value, Resolution::Strict)
                }
            }
            Node::LeafList(list) => {
                if value.is_null() {
                    return Ok(());
                }
                let items = value
                    .as_array()
                    .ok_or_else(|| YangError::validation(path, wrong_json("array", value)))?;
                if involves_leafref(&list.schema()) {
                    deferred.push(Deferred::LeafList(list, items.clone()));
                    Ok(())
                } else {
                    list.assign_all(items, Resolution::Strict)
                }
            }
        }
    }
}

fn involves_leafref(schema: &crate::schema::NodeSchema) -> bool {
    schema.leaf_type().map(|ty| ty.involves_leafref()).unwrap_or(false)
}

fn wrong_json(expected: &str, found: &Value) -> Violation {
    Violation::Type {
        expected: expected.to_string(),
        found: json_kind(found).to_string(),
    }
}
