//! Schema Compilation
//!
//! Compiles a [`SchemaModel`] into an immutable [`Schema`]:
//!
//! 1. module table and identity registry
//! 2. typedefs (each compiled once, shared by `Arc`)
//! 3. data nodes, expanding `uses` in place
//! 4. augments, retried until every target exists
//! 5. freeze into `NodeSchema` descriptors with canonical schema paths
//! 6. leafref targets resolved and checked

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

use super::{
    AugmentDef, Children, GroupingDef, ModuleTable, NodeDef, NodeSchema, QName, Schema, SchemaKind,
    SchemaModel, TypeDef, TypedefDef,
};
use crate::error::{Result, YangError};
use crate::identity::{IdentityRegistry, Resolution};
use crate::path_index::strip_predicates;
use crate::restriction::value::parse_decimal;
use crate::restriction::{
    BaseType, IntKind, Intervals, PatternGroup, Predicate, RestrictionSet, ValidationContext,
};

const BUILTIN_TYPES: &[&str] = &[
    "string",
    "boolean",
    "empty",
    "enumeration",
    "identityref",
    "decimal64",
    "leafref",
    "union",
    "int8",
    "int16",
    "int32",
    "int64",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    // carried as plain text
    "binary",
    "bits",
    "instance-identifier",
];

/// Compile a schema model
pub fn compile(model: &SchemaModel) -> Result<Schema> {
    let bundle_hash = bundle_hash(model)?;
    let modules = Arc::new(ModuleTable::from_defs(&model.modules)?);
    let identities = IdentityRegistry::build(modules.clone(), &model.identities)?;

    let mut compiler = Compiler::new(model, &modules, &identities)?;
    for def in &model.typedefs {
        compiler.compile_typedef(&QName::new(def.module.clone(), def.name.clone()))?;
    }

    let mut top = Vec::with_capacity(model.data.len());
    for def in &model.data {
        let module = def.module().ok_or_else(|| {
            YangError::schema(format!(
                "top-level node {} has no module",
                def.name().unwrap_or("<uses>")
            ))
        })?;
        compiler.build_node(def, module, module, None, &mut top)?;
    }
    compiler.apply_augments(&mut top)?;
    let typedefs = compiler.typedefs;

    let mut by_path = HashMap::new();
    let children = top
        .into_iter()
        .map(|b| freeze(b, "", "", &mut by_path, &identities))
        .collect::<Result<Vec<_>>>()?;
    let root = Arc::new(NodeSchema {
        name: String::new(),
        module: String::new(),
        schema_path: String::new(),
        augmentation: false,
        kind: SchemaKind::Container {
            children: Children::new(children)?,
        },
    });

    let leafref_targets = resolve_leafrefs(&root, &modules)?;

    debug!(
        modules = modules.len(),
        identities = identities.len(),
        typedefs = typedefs.len(),
        nodes = by_path.len(),
        leafrefs = leafref_targets.len(),
        "compiled schema"
    );

    Ok(Schema {
        modules,
        identities,
        typedefs,
        root,
        by_path,
        leafref_targets,
        bundle_hash,
    })
}

fn bundle_hash(model: &SchemaModel) -> Result<String> {
    let canonical = serde_json::to_vec(model)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

// =============================================================================
// Node Builders
// =============================================================================

/// Mutable node used until augments are applied
#[derive(Debug)]
struct NodeBuilder {
    name: String,
    module: String,
    augmentation: bool,
    kind: BuilderKind,
}

#[derive(Debug)]
enum BuilderKind {
    Container(Vec<NodeBuilder>),
    List {
        keys: Vec<String>,
        children: Vec<NodeBuilder>,
    },
    Leaf {
        ty: Arc<RestrictionSet>,
        default: Option<Value>,
    },
    LeafList {
        ty: Arc<RestrictionSet>,
    },
}

impl NodeBuilder {
    fn children_mut(&mut self) -> Option<&mut Vec<NodeBuilder>> {
        match &mut self.kind {
            BuilderKind::Container(children) | BuilderKind::List { children, .. } => Some(children),
            _ => None,
        }
    }
}

struct Compiler<'m> {
    modules: &'m ModuleTable,
    identities: &'m IdentityRegistry,
    typedef_defs: HashMap<QName, &'m TypedefDef>,
    groupings: HashMap<QName, &'m GroupingDef>,
    augments: &'m [AugmentDef],

    typedefs: HashMap<QName, Arc<RestrictionSet>>,
    /// Inline types declared inside groupings, keyed by grouping + relative path
    grouping_types: HashMap<String, Arc<RestrictionSet>>,
    /// Unrestricted builtins shared by every plain use site
    builtins: HashMap<String, Arc<RestrictionSet>>,
    typedefs_in_progress: HashSet<QName>,
    groupings_in_progress: Vec<QName>,
}

impl<'m> Compiler<'m> {
    fn new(model: &'m SchemaModel, modules: &'m ModuleTable, identities: &'m IdentityRegistry) -> Result<Self> {
        let mut typedef_defs = HashMap::with_capacity(model.typedefs.len());
        for def in &model.typedefs {
            let qname = QName::new(def.module.clone(), def.name.clone());
            if typedef_defs.insert(qname.clone(), def).is_some() {
                return Err(YangError::schema(format!("duplicate typedef {}", qname)));
            }
        }

        let mut groupings = HashMap::with_capacity(model.groupings.len());
        for def in &model.groupings {
            let qname = QName::new(def.module.clone(), def.name.clone());
            if groupings.insert(qname.clone(), def).is_some() {
                return Err(YangError::schema(format!("duplicate grouping {}", qname)));
            }
        }

        Ok(Self {
            modules,
            identities,
            typedef_defs,
            groupings,
            augments: &model.augments,
            typedefs: HashMap::new(),
            grouping_types: HashMap::new(),
            builtins: HashMap::new(),
            typedefs_in_progress: HashSet::new(),
            groupings_in_progress: Vec::new(),
        })
    }

    /// Resolve a possibly prefixed reference written in module `context`
    fn resolve_ref(&self, raw: &str, context: &str) -> Result<QName> {
        match QName::split(raw) {
            (Some(qualifier), name) => self
                .modules
                .resolve_qualifier(qualifier, context)
                .map(|module| QName::new(module, name))
                .ok_or_else(|| {
                    YangError::schema(format!("unknown prefix {} in {} (module {})", qualifier, raw, context))
                }),
            (None, name) => Ok(QName::new(context, name)),
        }
    }

    // ===== Data nodes =====

    /// Build `def` into `out`.
    ///
    /// `owner` is the module new nodes belong to; `lex` is the module whose
    /// prefixes names are written in; `origin` identifies the position
    /// inside a grouping, if any.
    fn build_node(
        &mut self,
        def: &'m NodeDef,
        owner: &str,
        lex: &str,
        origin: Option<&str>,
        out: &mut Vec<NodeBuilder>,
    ) -> Result<()> {
        let name = match def {
            NodeDef::Uses { grouping } => return self.expand_uses(grouping, owner, lex, out),
            NodeDef::Container { name, .. }
            | NodeDef::List { name, .. }
            | NodeDef::Leaf { name, .. }
            | NodeDef::LeafList { name, .. } => name,
        };

        let module = def.module().unwrap_or(owner).to_string();
        if !self.modules.contains(&module) {
            return Err(YangError::schema(format!("node {} belongs to unknown module {}", name, module)));
        }
        let lex = def.module().unwrap_or(lex);
        let origin = origin.map(|o| format!("{}/{}", o, name));

        let kind = match def {
            NodeDef::Container { children, .. } => {
                let mut built = Vec::with_capacity(children.len());
                for child in children {
                    self.build_node(child, &module, lex, origin.as_deref(), &mut built)?;
                }
                BuilderKind::Container(built)
            }
            NodeDef::List { keys, children, .. } => {
                let mut built = Vec::with_capacity(children.len());
                for child in children {
                    self.build_node(child, &module, lex, origin.as_deref(), &mut built)?;
                }
                for key in keys {
                    let is_leaf = built.iter().any(|b| {
                        b.name == *key && b.module == module && matches!(b.kind, BuilderKind::Leaf { .. })
                    });
                    if !is_leaf {
                        return Err(YangError::schema(format!(
                            "list {} declares key {} which is not a child leaf",
                            name, key
                        )));
                    }
                }
                BuilderKind::List {
                    keys: keys.clone(),
                    children: built,
                }
            }
            NodeDef::Leaf { ty, default, .. } => BuilderKind::Leaf {
                ty: self.site_type(ty, lex, origin.as_deref())?,
                default: default.clone(),
            },
            NodeDef::LeafList { ty, .. } => BuilderKind::LeafList {
                ty: self.site_type(ty, lex, origin.as_deref())?,
            },
            NodeDef::Uses { .. } => return Ok(()),
        };

        trace!(module = %module, name = %name, "built node");
        out.push(NodeBuilder {
            name: name.clone(),
            module,
            augmentation: false,
            kind,
        });
        Ok(())
    }

    fn expand_uses(&mut self, grouping: &str, owner: &str, lex: &str, out: &mut Vec<NodeBuilder>) -> Result<()> {
        let qname = self.resolve_ref(grouping, lex)?;
        let def = *self
            .groupings
            .get(&qname)
            .ok_or_else(|| YangError::schema(format!("unknown grouping {}", qname)))?;

        if self.groupings_in_progress.contains(&qname) {
            return Err(YangError::schema(format!("grouping {} uses itself", qname)));
        }
        self.groupings_in_progress.push(qname.clone());

        let origin = qname.to_string();
        for child in &def.children {
            self.build_node(child, owner, &def.module, Some(&origin), out)?;
        }

        self.groupings_in_progress.pop();
        trace!(grouping = %qname, owner = %owner, "expanded uses");
        Ok(())
    }

    fn apply_augments(&mut self, top: &mut [NodeBuilder]) -> Result<()> {
        let mut pending: Vec<&'m AugmentDef> = self.augments.iter().collect();

        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();

            for aug in pending {
                let path = self.augment_path(aug)?;
                if find_target(top, &path).is_none() {
                    deferred.push(aug);
                    continue;
                }

                let mut built = Vec::with_capacity(aug.children.len());
                for child in &aug.children {
                    self.build_node(child, &aug.module, &aug.module, None, &mut built)?;
                }
                for node in &mut built {
                    node.augmentation = true;
                }

                let target = find_target(top, &path)
                    .ok_or_else(|| YangError::schema(format!("augment target not found: {}", aug.target)))?;
                let children = target.children_mut().ok_or_else(|| {
                    YangError::schema(format!("augment target {} is not a container or list", aug.target))
                })?;
                children.extend(built);
                debug!(module = %aug.module, target = %aug.target, "applied augment");
            }

            if deferred.len() == before {
                let targets: Vec<&str> = deferred.iter().map(|a| a.target.as_str()).collect();
                return Err(YangError::schema(format!("augment target not found: {}", targets.join(", "))));
            }
            pending = deferred;
        }

        Ok(())
    }

    fn augment_path(&self, aug: &AugmentDef) -> Result<Vec<QName>> {
        aug.target
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|segment| self.resolve_ref(segment, &aug.module))
            .collect()
    }

    // ===== Types =====

    /// Type of a leaf or leaf-list at one use site
    fn site_type(&mut self, ty: &TypeDef, lex: &str, origin: Option<&str>) -> Result<Arc<RestrictionSet>> {
        match origin {
            Some(key) => {
                if let Some(set) = self.grouping_types.get(key) {
                    return Ok(set.clone());
                }
                let set = self.compile_type(ty, lex, None)?;
                self.grouping_types.insert(key.to_string(), set.clone());
                Ok(set)
            }
            None => self.compile_type(ty, lex, None),
        }
    }

    fn compile_typedef(&mut self, qname: &QName) -> Result<Arc<RestrictionSet>> {
        if let Some(set) = self.typedefs.get(qname) {
            return Ok(set.clone());
        }
        let def = *self
            .typedef_defs
            .get(qname)
            .ok_or_else(|| YangError::schema(format!("unknown typedef {}", qname)))?;

        if !self.typedefs_in_progress.insert(qname.clone()) {
            return Err(YangError::schema(format!("typedef {} refers to itself", qname)));
        }
        let set = self.compile_type(&def.ty, &def.module, Some(qname.clone()))?;
        self.typedefs_in_progress.remove(qname);

        self.typedefs.insert(qname.clone(), set.clone());
        Ok(set)
    }

    fn compile_type(&mut self, ty: &TypeDef, lex: &str, origin: Option<QName>) -> Result<Arc<RestrictionSet>> {
        let (qualifier, local) = QName::split(&ty.name);
        if qualifier.is_none() && BUILTIN_TYPES.contains(&local) {
            return self.compile_builtin(ty, lex, origin);
        }

        if ty.path.is_some() || ty.fraction_digits.is_some() || !ty.members.is_empty() {
            return Err(YangError::schema(format!(
                "type {} is derived; path, fraction-digits and members belong to builtins",
                ty.name
            )));
        }

        let typedef = self.resolve_ref(&ty.name, lex)?;
        let parent = self.compile_typedef(&typedef)?;
        if ty.is_bare_reference() && origin.is_none() {
            return Ok(parent);
        }

        let predicates = self.predicates(parent.base(), ty, lex)?;
        Ok(Arc::new(RestrictionSet::derive(parent, predicates, origin)))
    }

    fn compile_builtin(&mut self, ty: &TypeDef, lex: &str, origin: Option<QName>) -> Result<Arc<RestrictionSet>> {
        let missing = |what: &str| YangError::schema(format!("type {} requires {}", ty.name, what));

        let base = match ty.name.as_str() {
            "string" | "binary" | "bits" | "instance-identifier" => BaseType::String,
            "boolean" => BaseType::Boolean,
            "empty" => BaseType::Empty,
            "enumeration" if ty.enums.is_empty() => return Err(missing("enums")),
            "enumeration" => BaseType::Enumeration,
            "identityref" if ty.bases.is_empty() => return Err(missing("bases")),
            "identityref" => BaseType::IdentityRef,
            "decimal64" => BaseType::Decimal64 {
                fraction_digits: ty
                    .fraction_digits
                    .filter(|d| (1..=18).contains(d))
                    .ok_or_else(|| missing("fraction_digits in 1..18"))?,
            },
            "leafref" => BaseType::LeafRef {
                path: ty.path.clone().ok_or_else(|| missing("path"))?,
                require_instance: ty.require_instance,
                context_module: lex.to_string(),
            },
            "union" if ty.members.is_empty() => return Err(missing("members")),
            "union" => BaseType::Union(
                ty.members
                    .iter()
                    .map(|member| self.compile_type(member, lex, None))
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => BaseType::Integer(IntKind::from_name(other).ok_or_else(|| missing("a known builtin name"))?),
        };

        let shareable = origin.is_none()
            && ty.is_bare_reference()
            && matches!(
                base,
                BaseType::String | BaseType::Boolean | BaseType::Empty | BaseType::Integer(_)
            );
        if shareable {
            if let Some(set) = self.builtins.get(&ty.name) {
                return Ok(set.clone());
            }
        }

        let predicates = self.predicates(&base, ty, lex)?;
        let set = Arc::new(RestrictionSet::builtin(base, predicates, origin));
        if shareable {
            self.builtins.insert(ty.name.clone(), set.clone());
        }
        Ok(set)
    }

    /// Predicates this site adds on top of `base`
    fn predicates(&self, base: &BaseType, ty: &TypeDef, lex: &str) -> Result<Vec<Predicate>> {
        let invalid = |what: &str| {
            YangError::schema(format!("{} is not valid on {} (type {})", what, base.name(), ty.name))
        };
        let mut out = Vec::new();

        if !ty.patterns.is_empty() {
            if !matches!(base, BaseType::String) {
                return Err(invalid("pattern"));
            }
            out.push(Predicate::Pattern(
                PatternGroup::new(&ty.patterns).map_err(|e| YangError::schema(e))?,
            ));
        }

        if let Some(expr) = &ty.length {
            if !matches!(base, BaseType::String) {
                return Err(invalid("length"));
            }
            let parsed = Intervals::parse(expr, 0, u64::MAX as i128, |s| s.parse::<u64>().ok().map(i128::from))
                .map_err(|e| YangError::schema(e))?;
            out.push(Predicate::Length(parsed));
        }

        if let Some(expr) = &ty.range {
            let parsed = match base {
                BaseType::Integer(kind) => Intervals::parse(expr, kind.min(), kind.max(), |s| s.parse::<i128>().ok()),
                BaseType::Decimal64 { fraction_digits } => {
                    let fd = *fraction_digits;
                    Intervals::parse(expr, i64::MIN as i128, i64::MAX as i128, move |s| parse_decimal(s, fd))
                }
                _ => return Err(invalid("range")),
            };
            out.push(Predicate::Range(parsed.map_err(|e| YangError::schema(e))?));
        }

        if !ty.enums.is_empty() {
            if !matches!(base, BaseType::Enumeration) {
                return Err(invalid("enum"));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = ty.enums.iter().find(|e| !seen.insert(e.as_str())) {
                return Err(YangError::schema(format!("duplicate enum {} in type {}", dup, ty.name)));
            }
            out.push(Predicate::Enumeration(ty.enums.clone()));
        }

        if !ty.bases.is_empty() {
            if !matches!(base, BaseType::IdentityRef) {
                return Err(invalid("base"));
            }
            let mut bases = Vec::with_capacity(ty.bases.len());
            for raw in &ty.bases {
                let qname = self.resolve_ref(raw, lex)?;
                if !self.identities.contains(&qname) {
                    return Err(YangError::schema(format!("unknown identity base {}", qname)));
                }
                bases.push(qname);
            }
            out.push(Predicate::IdentityBase(bases));
        }

        Ok(out)
    }
}

fn find_target<'a>(nodes: &'a mut [NodeBuilder], path: &[QName]) -> Option<&'a mut NodeBuilder> {
    let (first, rest) = path.split_first()?;
    let node = nodes
        .iter_mut()
        .find(|n| n.name == first.name && n.module == first.module)?;
    if rest.is_empty() {
        return Some(node);
    }
    find_target(node.children_mut()?, rest)
}

// =============================================================================
// Freezing
// =============================================================================

fn freeze(
    builder: NodeBuilder,
    parent_path: &str,
    parent_module: &str,
    by_path: &mut HashMap<String, Arc<NodeSchema>>,
    identities: &IdentityRegistry,
) -> Result<Arc<NodeSchema>> {
    let segment = if builder.module == parent_module {
        builder.name.clone()
    } else {
        format!("{}:{}", builder.module, builder.name)
    };
    let schema_path = format!("{}/{}", parent_path, segment);

    let freeze_all = |children: Vec<NodeBuilder>, by_path: &mut HashMap<String, Arc<NodeSchema>>| {
        children
            .into_iter()
            .map(|c| freeze(c, &schema_path, &builder.module, by_path, identities))
            .collect::<Result<Vec<_>>>()
            .and_then(Children::new)
    };

    let kind = match builder.kind {
        BuilderKind::Container(children) => SchemaKind::Container {
            children: freeze_all(children, by_path)?,
        },
        BuilderKind::List { keys, children } => SchemaKind::List {
            keys,
            children: freeze_all(children, by_path)?,
        },
        BuilderKind::Leaf { ty, default } => {
            let default = match default {
                Some(raw) => {
                    let ctx = ValidationContext {
                        identities,
                        module: &builder.module,
                        resolution: Resolution::Lenient,
                        leafref: None,
                    };
                    Some(ty.validate(&raw, &ctx).map_err(|v| {
                        YangError::schema(format!("invalid default for {}: {}", schema_path, v))
                    })?)
                }
                None => None,
            };
            SchemaKind::Leaf { ty, default }
        }
        BuilderKind::LeafList { ty } => SchemaKind::LeafList { ty },
    };

    let node = Arc::new(NodeSchema {
        name: builder.name,
        module: builder.module,
        schema_path: schema_path.clone(),
        augmentation: builder.augmentation,
        kind,
    });
    by_path.insert(schema_path, node.clone());
    Ok(node)
}

// =============================================================================
// Leafref Resolution
// =============================================================================

fn resolve_leafrefs(root: &Arc<NodeSchema>, modules: &ModuleTable) -> Result<HashMap<String, Arc<NodeSchema>>> {
    let mut targets = HashMap::new();
    let mut ancestors = vec![root.clone()];
    walk_leafrefs(root, &mut ancestors, root, modules, &mut targets)?;
    Ok(targets)
}

fn walk_leafrefs(
    node: &Arc<NodeSchema>,
    ancestors: &mut Vec<Arc<NodeSchema>>,
    root: &Arc<NodeSchema>,
    modules: &ModuleTable,
    targets: &mut HashMap<String, Arc<NodeSchema>>,
) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.iter() {
        ancestors.push(child.clone());
        if let Some((path, context_module)) = child.leaf_type().and_then(|ty| leafref_path(ty)) {
            let target = resolve_leafref_path(path, context_module, ancestors, root, modules).map_err(|e| {
                YangError::schema(format!("leafref {} at {}: {}", path, child.schema_path, e))
            })?;
            trace!(leaf = %child.schema_path, target = %target.schema_path, "resolved leafref");
            targets.insert(child.schema_path.clone(), target);
        }
        walk_leafrefs(child, ancestors, root, modules, targets)?;
        ancestors.pop();
    }

    Ok(())
}

fn leafref_path(ty: &RestrictionSet) -> Option<(&str, &str)> {
    match ty.base() {
        BaseType::LeafRef {
            path, context_module, ..
        } => Some((path.as_str(), context_module.as_str())),
        BaseType::Union(members) => members.iter().find_map(|m| leafref_path(m)),
        _ => None,
    }
}

fn resolve_leafref_path(
    path: &str,
    context_module: &str,
    ancestors: &[Arc<NodeSchema>],
    root: &Arc<NodeSchema>,
    modules: &ModuleTable,
) -> std::result::Result<Arc<NodeSchema>, String> {
    let cleaned = strip_predicates(path);
    let mut current: Vec<Arc<NodeSchema>> = if cleaned.starts_with('/') {
        vec![root.clone()]
    } else {
        ancestors.to_vec()
    };

    for step in cleaned.split('/').map(str::trim).filter(|s| !s.is_empty()) {
        match step {
            "." => {}
            ".." => {
                current.pop();
                if current.is_empty() {
                    return Err("path climbs above the root".to_string());
                }
            }
            step => {
                let parent = current.last().ok_or("path climbs above the root")?;
                let children = parent
                    .children()
                    .ok_or_else(|| format!("{} has no children", parent.schema_path))?;

                let (qualifier, local) = QName::split(step);
                let idx = match qualifier {
                    Some(q) => {
                        let module = modules
                            .resolve_qualifier(q, context_module)
                            .ok_or_else(|| format!("unknown prefix {}", q))?;
                        children.position(&QName::new(module, local))
                    }
                    None => children
                        .position(&QName::new(context_module, local))
                        .or_else(|| children.find(local, &parent.module, modules).ok()),
                };
                let child = idx
                    .and_then(|i| children.get(i))
                    .ok_or_else(|| format!("no node {} under {}", step, parent.schema_path))?;
                current.push(child.clone());
            }
        }
    }

    let target = current.pop().ok_or("empty path")?;
    if target.leaf_type().is_none() {
        return Err(format!("target {} is not a leaf", target.schema_path));
    }
    Ok(target)
}
