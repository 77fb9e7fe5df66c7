//! Normalized Schema Graph Input
//!
//! Serde types for the already-resolved module graph handed over by the
//! schema-compiler collaborator. Nothing here is validated; the loader turns
//! a [`SchemaModel`] into an immutable [`Schema`](super::Schema).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The whole module graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaModel {
    pub modules: Vec<ModuleDef>,
    #[serde(default)]
    pub identities: Vec<IdentityDef>,
    #[serde(default)]
    pub typedefs: Vec<TypedefDef>,
    #[serde(default)]
    pub groupings: Vec<GroupingDef>,
    #[serde(default)]
    pub data: Vec<NodeDef>,
    #[serde(default)]
    pub augments: Vec<AugmentDef>,
}

impl SchemaModel {
    /// Parse a model from a JSON string
    pub fn from_json_str(content: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse a model from an already-parsed JSON value
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// A module header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDef {
    pub name: String,
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<NaiveDate>,
    /// Import prefix -> module name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub imports: BTreeMap<String, String>,
}

/// An identity and its (possibly prefixed) base names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityDef {
    pub module: String,
    pub name: String,
    #[serde(default)]
    pub bases: Vec<String>,
}

/// A named, reusable type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedefDef {
    pub module: String,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDef,
}

/// A type reference plus the restrictions layered on at this site
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeDef {
    /// Builtin type name or (possibly prefixed) typedef name
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<String>,
    /// identityref bases
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,
    /// leafref path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_true")]
    pub require_instance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction_digits: Option<u8>,
    /// union member types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<TypeDef>,
}

impl TypeDef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            require_instance: true,
            ..Default::default()
        }
    }

    /// True when this site only names a type and adds nothing of its own
    pub fn is_bare_reference(&self) -> bool {
        self.patterns.is_empty()
            && self.length.is_none()
            && self.range.is_none()
            && self.enums.is_empty()
            && self.bases.is_empty()
            && self.path.is_none()
            && self.fraction_digits.is_none()
            && self.members.is_empty()
    }
}

fn default_true() -> bool {
    true
}

/// A grouping whose children are expanded at every `uses` site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingDef {
    pub module: String,
    pub name: String,
    #[serde(default)]
    pub children: Vec<NodeDef>,
}

/// Children contributed to a node of another module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentDef {
    pub module: String,
    /// Absolute schema node path, e.g. `/rt:routing/rt:ribs`
    pub target: String,
    #[serde(default)]
    pub children: Vec<NodeDef>,
}

/// A data node definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodeDef {
    Container {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<String>,
        #[serde(default)]
        children: Vec<NodeDef>,
    },
    List {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<String>,
        #[serde(default)]
        keys: Vec<String>,
        #[serde(default)]
        children: Vec<NodeDef>,
    },
    Leaf {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<String>,
        #[serde(rename = "type")]
        ty: TypeDef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<serde_json::Value>,
    },
    LeafList {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<String>,
        #[serde(rename = "type")]
        ty: TypeDef,
    },
    Uses {
        grouping: String,
    },
}

impl NodeDef {
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeDef::Container { name, .. }
            | NodeDef::List { name, .. }
            | NodeDef::Leaf { name, .. }
            | NodeDef::LeafList { name, .. } => Some(name),
            NodeDef::Uses { .. } => None,
        }
    }

    pub fn module(&self) -> Option<&str> {
        match self {
            NodeDef::Container { module, .. }
            | NodeDef::List { module, .. }
            | NodeDef::Leaf { module, .. }
            | NodeDef::LeafList { module, .. } => module.as_deref(),
            NodeDef::Uses { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_model() {
        let model = SchemaModel::from_value(json!({
            "modules": [{"name": "m", "prefix": "p", "revision": "2018-03-13"}],
            "data": [
                {"kind": "container", "module": "m", "name": "top", "children": [
                    {"kind": "leaf", "name": "x", "type": {"name": "string"}},
                    {"kind": "uses", "grouping": "g"}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(model.modules[0].revision, NaiveDate::from_ymd_opt(2018, 3, 13));
        match &model.data[0] {
            NodeDef::Container { children, .. } => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[0].name(), Some("x"));
                assert!(matches!(children[1], NodeDef::Uses { .. }));
            }
            other => panic!("Expected Container, got {:?}", other),
        }
    }

    #[test]
    fn test_require_instance_defaults_true() {
        let ty: TypeDef = serde_json::from_value(json!({"name": "leafref", "path": "../x"})).unwrap();
        assert!(ty.require_instance);
        assert!(!ty.is_bare_reference());
        assert!(TypeDef::named("p:t").is_bare_reference());
    }
}
