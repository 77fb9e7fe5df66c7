use serde_json::{Map, Value};

use super::value_to_json;
use crate::config::{CodecConfig, EncodeMode, OutputFormat};
use crate::error::Result;
use crate::schema::NodeSchema;
use crate::tree::{has_content, Container, ContainerData, DataNode, DataTree};

/// Serializes data trees to RFC 7951 JSON
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    mode: EncodeMode,
    output_format: OutputFormat,
    qualify_local_identities: bool,
}

impl Encoder {
    pub fn new(mode: EncodeMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        Self {
            mode: config.encode.mode,
            output_format: config.encode.output_format,
            qualify_local_identities: config.encode.qualify_local_identities,
        }
    }

    /// Prefix identity values even when they belong to the leaf's module
    pub fn qualify_local_identities(mut self, qualify: bool) -> Self {
        self.qualify_local_identities = qualify;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn mode(&self) -> EncodeMode {
        self.mode
    }

    pub fn encode(&self, tree: &DataTree) -> Value {
        self.encode_container(tree.root())
    }

    /// Encode the members of one container; names are relative to its module
    pub fn encode_container(&self, container: &Container) -> Value {
        match &*container.node.borrow() {
            DataNode::Container(data) => Value::Object(self.members(data)),
            _ => Value::Null,
        }
    }

    /// Encode and render as text in the configured output format
    pub fn to_string(&self, tree: &DataTree) -> Result<String> {
        let value = self.encode(tree);
        Ok(match self.output_format {
            OutputFormat::Pretty => serde_json::to_string_pretty(&value)?,
            OutputFormat::Compact => serde_json::to_string(&value)?,
        })
    }

    fn members(&self, container: &ContainerData) -> Map<String, Value> {
        let active = container.schema.module.as_str();
        let mut out = Map::new();
        for child in &container.children {
            let node = child.borrow();
            if let Some(value) = self.node(&node) {
                out.insert(member_name(node.schema(), active), value);
            }
        }
        out
    }

    fn node(&self, node: &DataNode) -> Option<Value> {
        let filtered = self.mode == EncodeMode::Filtered;

        match node {
            DataNode::Container(container) => {
                if filtered && !has_content(node) {
                    return None;
                }
                Some(Value::Object(self.members(container)))
            }
            DataNode::List(list) => {
                if filtered && list.entries.is_empty() {
                    return None;
                }
                let entries = list
                    .entries
                    .values()
                    .map(|entry| match &*entry.borrow() {
                        DataNode::Container(data) => Value::Object(self.members(data)),
                        _ => Value::Null,
                    })
                    .collect();
                Some(Value::Array(entries))
            }
            DataNode::Leaf(leaf) => {
                if filtered && !leaf.explicitly_set {
                    return None;
                }
                Some(
                    leaf.value
                        .as_ref()
                        .map(|v| value_to_json(v, &leaf.schema.module, self.qualify_local_identities))
                        .unwrap_or(Value::Null),
                )
            }
            DataNode::LeafList(list) => {
                if filtered && !list.explicitly_set {
                    return None;
                }
                Some(Value::Array(
                    list.values
                        .iter()
                        .map(|v| value_to_json(v, &list.schema.module, self.qualify_local_identities))
                        .collect(),
                ))
            }
        }
    }
}

/// `module:name` when the module changes or an augment starts here
fn member_name(schema: &NodeSchema, active_module: &str) -> String {
    if schema.augmentation || schema.module != active_module {
        format!("{}:{}", schema.module, schema.name)
    } else {
        schema.name.clone()
    }
}
