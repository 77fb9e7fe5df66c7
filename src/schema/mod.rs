//! Compiled Schema
//!
//! The immutable node-descriptor table built once from a [`SchemaModel`].
//! A [`Schema`] owns the module table, the identity registry, the shared
//! restriction sets and one [`NodeSchema`] per data node. It is `Send + Sync`
//! and meant to be shared behind an `Arc` by every data tree built from it.
//!
//! Lookups are served from `HashMap` indexes:
//! - schema path -> node
//! - leaf schema path -> leafref target
//! - `(module, name)` -> typedef restriction set

pub mod loader;
pub mod model;

pub use model::{
    AugmentDef, GroupingDef, IdentityDef, ModuleDef, NodeDef, SchemaModel, TypeDef, TypedefDef,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, Violation, YangError};
use crate::identity::IdentityRegistry;
use crate::restriction::{LeafValue, RestrictionSet};

// =============================================================================
// Qualified Names
// =============================================================================

/// A module-qualified name, displayed as `module:name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    pub module: String,
    pub name: String,
}

impl QName {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Split `qualifier:name` into its parts; bare names have no qualifier
    pub fn split(raw: &str) -> (Option<&str>, &str) {
        match raw.split_once(':') {
            Some((qualifier, name)) => (Some(qualifier), name),
            None => (None, raw),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

// =============================================================================
// Module Table
// =============================================================================

/// A loaded module header
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub prefix: String,
    pub namespace: Option<String>,
    pub revision: Option<NaiveDate>,
    /// Import prefix -> module name
    pub imports: BTreeMap<String, String>,
}

impl ModuleInfo {
    /// `name@revision`, or just the name when no revision is known
    pub fn label(&self) -> String {
        match self.revision {
            Some(rev) => format!("{}@{}", self.name, rev.format("%Y-%m-%d")),
            None => self.name.clone(),
        }
    }
}

/// All modules of a schema, with prefix resolution
#[derive(Debug, Default)]
pub struct ModuleTable {
    modules: HashMap<String, ModuleInfo>,
}

impl ModuleTable {
    pub fn from_defs(defs: &[ModuleDef]) -> Result<Self> {
        let mut table = ModuleTable::default();

        for def in defs {
            if table.modules.contains_key(&def.name) {
                return Err(YangError::schema(format!("module {} is defined twice", def.name)));
            }
            table.modules.insert(
                def.name.clone(),
                ModuleInfo {
                    name: def.name.clone(),
                    prefix: def.prefix.clone(),
                    namespace: def.namespace.clone(),
                    revision: def.revision,
                    imports: def.imports.clone(),
                },
            );
        }

        for info in table.modules.values() {
            for (prefix, imported) in &info.imports {
                if !table.modules.contains_key(imported) {
                    return Err(YangError::schema(format!(
                        "module {} imports unknown module {} as {}",
                        info.name, imported, prefix
                    )));
                }
            }
        }

        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|s| s.as_str())
    }

    /// Resolve a qualifier seen inside `context` to a module name.
    ///
    /// Tried in order: the context module's own prefix, its import prefixes,
    /// then a module name. Prefixes of modules that `context` does not
    /// import are out of scope.
    pub fn resolve_qualifier(&self, qualifier: &str, context: &str) -> Option<&str> {
        if let Some(ctx) = self.modules.get(context) {
            if ctx.prefix == qualifier {
                return Some(ctx.name.as_str());
            }
            if let Some(imported) = ctx.imports.get(qualifier) {
                return self.modules.get(imported).map(|m| m.name.as_str());
            }
        }

        self.modules.get(qualifier).map(|m| m.name.as_str())
    }

    /// True if some module is named or prefixed `qualifier`
    pub fn declares(&self, qualifier: &str) -> bool {
        self.modules.values().any(|m| m.name == qualifier || m.prefix == qualifier)
    }

    /// True if `qualifier` is the module name or own prefix of `module`
    pub fn names_module(&self, qualifier: &str, module: &str) -> bool {
        self.modules
            .get(module)
            .map(|m| m.name == qualifier || m.prefix == qualifier)
            .unwrap_or(false)
    }
}

// =============================================================================
// Node Descriptors
// =============================================================================

/// Descriptor for one schema data node
#[derive(Debug)]
pub struct NodeSchema {
    pub name: String,
    /// Owning module (for augmentation roots, the augmenting module)
    pub module: String,
    /// Canonical schema path, e.g. `/ietf-routing:routing/ribs/rib`
    pub schema_path: String,
    /// Root of a subtree contributed by an augment
    pub augmentation: bool,
    pub kind: SchemaKind,
}

#[derive(Debug)]
pub enum SchemaKind {
    Container {
        children: Children,
    },
    List {
        keys: Vec<String>,
        children: Children,
    },
    Leaf {
        ty: Arc<RestrictionSet>,
        default: Option<LeafValue>,
    },
    LeafList {
        ty: Arc<RestrictionSet>,
    },
}

impl NodeSchema {
    pub fn qname(&self) -> QName {
        QName::new(self.module.clone(), self.name.clone())
    }

    pub fn children(&self) -> Option<&Children> {
        match &self.kind {
            SchemaKind::Container { children } | SchemaKind::List { children, .. } => Some(children),
            _ => None,
        }
    }

    /// Restriction set of a leaf or leaf-list
    pub fn leaf_type(&self) -> Option<&Arc<RestrictionSet>> {
        match &self.kind {
            SchemaKind::Leaf { ty, .. } | SchemaKind::LeafList { ty } => Some(ty),
            _ => None,
        }
    }

    pub fn default_value(&self) -> Option<&LeafValue> {
        match &self.kind {
            SchemaKind::Leaf { default, .. } => default.as_ref(),
            _ => None,
        }
    }

    /// Key leaf names in declaration order (empty for non-lists and keyless lists)
    pub fn keys(&self) -> &[String] {
        match &self.kind {
            SchemaKind::List { keys, .. } => keys,
            _ => &[],
        }
    }

    pub fn is_root(&self) -> bool {
        self.schema_path.is_empty()
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            SchemaKind::Container { .. } => "container",
            SchemaKind::List { .. } => "list",
            SchemaKind::Leaf { .. } => "leaf",
            SchemaKind::LeafList { .. } => "leaf-list",
        }
    }
}

/// Ordered children of a container or list with O(1) name lookup
#[derive(Debug, Default)]
pub struct Children {
    nodes: Vec<Arc<NodeSchema>>,
    by_qname: HashMap<QName, usize>,
    by_local: HashMap<String, Vec<usize>>,
}

impl Children {
    pub(crate) fn new(nodes: Vec<Arc<NodeSchema>>) -> Result<Self> {
        let mut by_qname = HashMap::with_capacity(nodes.len());
        let mut by_local: HashMap<String, Vec<usize>> = HashMap::with_capacity(nodes.len());

        for (idx, node) in nodes.iter().enumerate() {
            if by_qname.insert(node.qname(), idx).is_some() {
                return Err(YangError::schema(format!(
                    "duplicate sibling {} at {}",
                    node.qname(),
                    node.schema_path
                )));
            }
            by_local.entry(node.name.clone()).or_default().push(idx);
        }

        Ok(Self {
            nodes,
            by_qname,
            by_local,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<NodeSchema>> {
        self.nodes.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&Arc<NodeSchema>> {
        self.nodes.get(idx)
    }

    pub fn position(&self, qname: &QName) -> Option<usize> {
        self.by_qname.get(qname).copied()
    }

    /// Find a child by `name` or `qualifier:name`.
    ///
    /// A qualifier is resolved in the scope of `preferred_module`, or else
    /// matched against the module name or prefix of the children themselves.
    /// A bare name matching children of several modules resolves to the one
    /// owned by `preferred_module`, otherwise it is ambiguous.
    pub fn find(
        &self,
        name: &str,
        preferred_module: &str,
        modules: &ModuleTable,
    ) -> std::result::Result<usize, Violation> {
        let (qualifier, local) = QName::split(name);

        if let Some(qualifier) = qualifier {
            if let Some(module) = modules.resolve_qualifier(qualifier, preferred_module) {
                return self
                    .position(&QName::new(module, local))
                    .ok_or_else(|| self.unknown(name));
            }
            let candidates: Vec<usize> = self
                .by_local
                .get(local)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&idx| modules.names_module(qualifier, &self.nodes[idx].module))
                .collect();
            return match candidates.as_slice() {
                [only] => Ok(*only),
                [] if modules.declares(qualifier) => Err(self.unknown(name)),
                [] => Err(Violation::UnknownModule(qualifier.to_string())),
                _ => Err(Violation::Ambiguous(name.to_string())),
            };
        }

        match self.by_local.get(local).map(|v| v.as_slice()) {
            Some([only]) => Ok(*only),
            Some(candidates) if !candidates.is_empty() => candidates
                .iter()
                .copied()
                .find(|&idx| self.nodes[idx].module == preferred_module)
                .ok_or_else(|| Violation::Ambiguous(name.to_string())),
            _ => Err(self.unknown(name)),
        }
    }

    pub(crate) fn unknown(&self, name: &str) -> Violation {
        Violation::UnknownMember {
            name: name.to_string(),
            suggestion: closest_name(name, self.nodes.iter().map(|n| n.name.as_str())),
        }
    }
}

/// Best fuzzy match among candidate names, for "did you mean" hints
pub(crate) fn closest_name<'a>(query: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    use fuzzy_matcher::skim::SkimMatcherV2;
    use fuzzy_matcher::FuzzyMatcher;

    let (_, local) = QName::split(query);
    let matcher = SkimMatcherV2::default();

    let mut best: Option<(i64, &str)> = None;
    for candidate in candidates {
        let score = matcher
            .fuzzy_match(candidate, local)
            .or_else(|| matcher.fuzzy_match(local, candidate));
        if let Some(score) = score {
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, candidate));
            }
        }
    }

    best.map(|(_, name)| name.to_string())
}

// =============================================================================
// Schema
// =============================================================================

/// The compiled, immutable schema
pub struct Schema {
    pub(crate) modules: Arc<ModuleTable>,
    pub(crate) identities: IdentityRegistry,
    pub(crate) typedefs: HashMap<QName, Arc<RestrictionSet>>,
    pub(crate) root: Arc<NodeSchema>,
    pub(crate) by_path: HashMap<String, Arc<NodeSchema>>,
    pub(crate) leafref_targets: HashMap<String, Arc<NodeSchema>>,

    /// SHA-256 of the canonical model JSON, for caching/determinism
    pub bundle_hash: String,
}

impl Schema {
    /// Compile a schema model
    pub fn from_model(model: &SchemaModel) -> Result<Arc<Self>> {
        loader::compile(model).map(Arc::new)
    }

    /// Parse and compile a schema model from JSON text
    pub fn from_json_str(content: &str) -> Result<Arc<Self>> {
        Self::from_model(&SchemaModel::from_json_str(content)?)
    }

    pub fn modules(&self) -> &ModuleTable {
        &self.modules
    }

    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    /// Synthetic root holding every top-level node
    pub fn root(&self) -> &Arc<NodeSchema> {
        &self.root
    }

    pub fn top_level(&self) -> impl Iterator<Item = &Arc<NodeSchema>> {
        self.root.children().into_iter().flat_map(|c| c.iter())
    }

    /// Node by canonical schema path
    pub fn node(&self, schema_path: &str) -> Option<&Arc<NodeSchema>> {
        self.by_path.get(schema_path)
    }

    pub fn node_count(&self) -> usize {
        self.by_path.len()
    }

    pub fn typedef(&self, qname: &QName) -> Option<&Arc<RestrictionSet>> {
        self.typedefs.get(qname)
    }

    /// Target leaf of the leafref declared on the leaf at `leaf_path`
    pub fn leafref_target(&self, leaf_path: &str) -> Option<&Arc<NodeSchema>> {
        self.leafref_targets.get(leaf_path)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("modules", &self.modules.len())
            .field("identities", &self.identities.len())
            .field("typedefs", &self.typedefs.len())
            .field("nodes", &self.by_path.len())
            .field("bundle_hash", &self.bundle_hash)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_schema_is_shareable_across_threads() {
        assert_send_sync::<Schema>();
        assert_send_sync::<IdentityRegistry>();
        assert_send_sync::<RestrictionSet>();
    }

    fn table() -> ModuleTable {
        let mut imports = BTreeMap::new();
        imports.insert("remote".to_string(), "remote-two".to_string());
        ModuleTable::from_defs(&[
            ModuleDef {
                name: "identityref".to_string(),
                prefix: "foo".to_string(),
                namespace: None,
                revision: None,
                imports,
            },
            ModuleDef {
                name: "remote-two".to_string(),
                prefix: "rtwo".to_string(),
                namespace: None,
                revision: NaiveDate::from_ymd_opt(2015, 1, 1),
                imports: BTreeMap::new(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_qualifier() {
        let modules = table();
        assert_eq!(modules.resolve_qualifier("foo", "identityref"), Some("identityref"));
        assert_eq!(modules.resolve_qualifier("remote", "identityref"), Some("remote-two"));
        assert_eq!(modules.resolve_qualifier("remote-two", "identityref"), Some("remote-two"));
        assert_eq!(modules.resolve_qualifier("rtwo", "remote-two"), Some("remote-two"));
        assert_eq!(modules.resolve_qualifier("fordprefect", "identityref"), None);
        // a prefix declared elsewhere but never imported
        assert_eq!(modules.resolve_qualifier("rtwo", "identityref"), None);
        // import prefixes are local to the importing module
        assert_eq!(modules.resolve_qualifier("remote", "remote-two"), None);
    }

    #[test]
    fn test_module_label() {
        let modules = table();
        assert_eq!(modules.get("remote-two").unwrap().label(), "remote-two@2015-01-01");
        assert_eq!(modules.get("identityref").unwrap().label(), "identityref");
    }

    #[test]
    fn test_import_of_unknown_module() {
        let mut imports = BTreeMap::new();
        imports.insert("x".to_string(), "missing".to_string());
        let result = ModuleTable::from_defs(&[ModuleDef {
            name: "m".to_string(),
            prefix: "m".to_string(),
            namespace: None,
            revision: None,
            imports,
        }]);
        assert!(matches!(result, Err(YangError::Schema(_))));
    }

    #[test]
    fn test_closest_name() {
        let names = ["router-id", "ribs", "interfaces"];
        assert_eq!(closest_name("routr-id", names.iter().copied()), Some("router-id".to_string()));
        assert_eq!(closest_name("zzzz", names.iter().copied()), None);
    }

    #[test]
    fn test_qname_split() {
        assert_eq!(QName::split("foo:father"), (Some("foo"), "father"));
        assert_eq!(QName::split("father"), (None, "father"));
        assert_eq!(QName::new("m", "n").to_string(), "m:n");
    }
}
