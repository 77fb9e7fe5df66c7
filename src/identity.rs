//! Identity Registry
//!
//! Every identity of every loaded module, stored in a petgraph `DiGraph`
//! with an edge from each derived identity to each of its bases. Ancestor
//! sets are computed once when the registry is built, so derivation checks
//! during validation are a single hash lookup.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, Violation, YangError};
use crate::schema::{IdentityDef, ModuleTable, QName};

/// How bare (unqualified) identity names are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A bare name belongs to the leaf's own module. Used when decoding.
    Strict,
    /// Like `Strict`, falling back to a unique same-named identity derived
    /// from the leaf's bases. Used for direct assignment.
    Lenient,
}

/// A registered identity
#[derive(Debug, Clone)]
pub struct Identity {
    pub qname: QName,
    pub bases: Vec<QName>,
}

pub struct IdentityRegistry {
    modules: Arc<ModuleTable>,
    graph: DiGraph<QName, ()>,
    node_indices: HashMap<QName, NodeIndex>,
    identities: HashMap<QName, Identity>,
    /// Reflexive-transitive base closure per identity
    ancestors: HashMap<NodeIndex, HashSet<NodeIndex>>,
}

impl IdentityRegistry {
    pub fn build(modules: Arc<ModuleTable>, defs: &[IdentityDef]) -> Result<Self> {
        let mut graph = DiGraph::with_capacity(defs.len(), defs.len());
        let mut node_indices = HashMap::with_capacity(defs.len());

        for def in defs {
            if !modules.contains(&def.module) {
                return Err(YangError::schema(format!(
                    "identity {} belongs to unknown module {}",
                    def.name, def.module
                )));
            }
            let qname = QName::new(def.module.clone(), def.name.clone());
            if node_indices.contains_key(&qname) {
                return Err(YangError::schema(format!("duplicate identity {}", qname)));
            }
            let idx = graph.add_node(qname.clone());
            node_indices.insert(qname, idx);
        }

        let mut identities = HashMap::with_capacity(defs.len());
        for def in defs {
            let qname = QName::new(def.module.clone(), def.name.clone());
            let mut bases = Vec::with_capacity(def.bases.len());

            for raw in &def.bases {
                let base = resolve_base(&modules, raw, &def.module).ok_or_else(|| {
                    YangError::schema(format!("identity {} has unknown base {}", qname, raw))
                })?;
                let base_idx = *node_indices.get(&base).ok_or_else(|| {
                    YangError::schema(format!("identity {} has unknown base {}", qname, raw))
                })?;
                graph.add_edge(node_indices[&qname], base_idx, ());
                bases.push(base);
            }

            identities.insert(qname.clone(), Identity { qname, bases });
        }

        // A derivation cycle shows up as a non-trivial SCC or a self-loop
        for scc in kosaraju_scc(&graph) {
            let self_loop = scc.len() == 1 && graph.contains_edge(scc[0], scc[0]);
            if scc.len() > 1 || self_loop {
                let mut names: Vec<String> = scc.iter().map(|i| graph[*i].to_string()).collect();
                names.sort();
                return Err(YangError::schema(format!(
                    "identity derivation cycle: {}",
                    names.join(", ")
                )));
            }
        }

        let ancestors = graph
            .node_indices()
            .map(|idx| (idx, closure(&graph, idx, Direction::Outgoing)))
            .collect();

        debug!(identities = identities.len(), "built identity registry");

        Ok(Self {
            modules,
            graph,
            node_indices,
            identities,
            ancestors,
        })
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn contains(&self, qname: &QName) -> bool {
        self.identities.contains_key(qname)
    }

    pub fn identity(&self, qname: &QName) -> Option<&Identity> {
        self.identities.get(qname)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    /// True if `candidate` equals `base` or transitively derives from it
    pub fn derived_from(&self, candidate: &QName, base: &QName) -> bool {
        match (self.node_indices.get(candidate), self.node_indices.get(base)) {
            (Some(c), Some(b)) => self.ancestors.get(c).map(|set| set.contains(b)).unwrap_or(false),
            _ => false,
        }
    }

    /// Every identity transitively derived from `base`, excluding `base`
    pub fn derived_identities(&self, base: &QName) -> Vec<&QName> {
        let Some(&idx) = self.node_indices.get(base) else {
            return Vec::new();
        };
        let mut derived: Vec<&QName> = closure(&self.graph, idx, Direction::Incoming)
            .into_iter()
            .filter(|&i| i != idx)
            .map(|i| &self.graph[i])
            .collect();
        derived.sort();
        derived
    }

    /// Resolve a raw identity name seen on a leaf of `context_module`.
    ///
    /// Strict qualifiers must be module names. Lenient qualifiers may also be
    /// the context module's own prefix or one of its import prefixes.
    /// `bases` drive the lenient fallback for bare names: the bases and
    /// everything derived from them.
    pub fn resolve_name(
        &self,
        raw: &str,
        context_module: &str,
        resolution: Resolution,
        bases: &[&QName],
    ) -> std::result::Result<QName, Violation> {
        let (qualifier, name) = QName::split(raw);

        if let Some(qualifier) = qualifier {
            let module = match resolution {
                Resolution::Strict => self.modules.get(qualifier).map(|m| m.name.as_str()),
                Resolution::Lenient => self.modules.resolve_qualifier(qualifier, context_module),
            }
            .ok_or_else(|| Violation::UnknownModule(qualifier.to_string()))?;
            let qname = QName::new(module, name);
            return if self.contains(&qname) {
                Ok(qname)
            } else {
                Err(Violation::UnknownIdentity(raw.to_string()))
            };
        }

        let local = QName::new(context_module, name);
        if self.contains(&local) {
            return Ok(local);
        }

        if resolution == Resolution::Lenient {
            let mut matches: Vec<&QName> = if bases.is_empty() {
                self.identities.keys().filter(|q| q.name == name).collect()
            } else {
                bases
                    .iter()
                    .flat_map(|base| {
                        let mut family = self.derived_identities(base);
                        family.extend(self.identity(base).map(|i| &i.qname));
                        family
                    })
                    .filter(|q| q.name == name)
                    .collect()
            };
            matches.sort();
            matches.dedup();
            if let [only] = matches.as_slice() {
                return Ok((*only).clone());
            }
        }

        Err(Violation::UnknownIdentity(raw.to_string()))
    }

    /// Check whether `candidate` (bare or qualified) names an identity
    /// derived from `base`.
    ///
    /// A name that matches no identity at all is an error, which is distinct
    /// from a known identity that is simply not derived from `base`.
    pub fn resolves(
        &self,
        base: &QName,
        candidate: &str,
        context_module: &str,
    ) -> std::result::Result<bool, Violation> {
        let qname = self.resolve_name(candidate, context_module, Resolution::Lenient, &[base])?;
        Ok(self.derived_from(&qname, base))
    }
}

impl std::fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("identities", &self.identities.len())
            .finish()
    }
}

fn resolve_base(modules: &ModuleTable, raw: &str, context: &str) -> Option<QName> {
    match QName::split(raw) {
        (Some(qualifier), name) => modules
            .resolve_qualifier(qualifier, context)
            .map(|module| QName::new(module, name)),
        (None, name) => Some(QName::new(context, name)),
    }
}

/// Nodes reachable from `start` (inclusive) following edges in `direction`
fn closure(graph: &DiGraph<QName, ()>, start: NodeIndex, direction: Direction) -> HashSet<NodeIndex> {
    let mut visited = HashSet::new();
    let mut stack = vec![start];

    while let Some(idx) = stack.pop() {
        if !visited.insert(idx) {
            continue;
        }
        for edge in graph.edges_directed(idx, direction) {
            let next = match direction {
                Direction::Outgoing => edge.target(),
                Direction::Incoming => edge.source(),
            };
            stack.push(next);
        }
    }

    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModuleDef;
    use std::collections::BTreeMap;

    fn module(name: &str, prefix: &str, imports: &[(&str, &str)]) -> ModuleDef {
        ModuleDef {
            name: name.to_string(),
            prefix: prefix.to_string(),
            namespace: None,
            revision: None,
            imports: imports
                .iter()
                .map(|(p, m)| (p.to_string(), m.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn ident(module: &str, name: &str, bases: &[&str]) -> IdentityDef {
        IdentityDef {
            module: module.to_string(),
            name: name.to_string(),
            bases: bases.iter().map(|b| b.to_string()).collect(),
        }
    }

    fn registry() -> IdentityRegistry {
        let modules = Arc::new(
            ModuleTable::from_defs(&[
                module("family", "fam", &[]),
                module("remote", "rem", &[("fam", "family")]),
            ])
            .unwrap(),
        );
        IdentityRegistry::build(
            modules,
            &[
                ident("family", "grandmother", &[]),
                ident("family", "mother", &["grandmother"]),
                ident("family", "son", &["mother"]),
                ident("family", "cousin", &[]),
                ident("remote", "nephew", &["fam:mother"]),
            ],
        )
        .unwrap()
    }

    fn q(module: &str, name: &str) -> QName {
        QName::new(module, name)
    }

    #[test]
    fn test_transitive_derivation() {
        let reg = registry();
        assert!(reg.derived_from(&q("family", "son"), &q("family", "grandmother")));
        assert!(reg.derived_from(&q("family", "mother"), &q("family", "mother")));
        assert!(reg.derived_from(&q("remote", "nephew"), &q("family", "grandmother")));
        assert!(!reg.derived_from(&q("family", "cousin"), &q("family", "grandmother")));
        assert!(!reg.derived_from(&q("family", "grandmother"), &q("family", "son")));
    }

    #[test]
    fn test_derived_identities() {
        let reg = registry();
        let derived = reg.derived_identities(&q("family", "mother"));
        assert_eq!(derived, vec![&q("family", "son"), &q("remote", "nephew")]);
    }

    #[test]
    fn test_resolves_unknown_is_error_not_false() {
        let reg = registry();
        let base = q("family", "grandmother");
        assert_eq!(reg.resolves(&base, "son", "family"), Ok(true));
        assert_eq!(reg.resolves(&base, "cousin", "family"), Ok(false));
        assert_eq!(
            reg.resolves(&base, "elephant", "family"),
            Err(Violation::UnknownIdentity("elephant".to_string()))
        );
        assert_eq!(
            reg.resolves(&base, "nope:son", "family"),
            Err(Violation::UnknownModule("nope".to_string()))
        );
    }

    #[test]
    fn test_strict_vs_lenient_bare_names() {
        let reg = registry();
        let base = q("family", "mother");
        assert!(reg.resolve_name("nephew", "family", Resolution::Strict, &[&base]).is_err());
        assert_eq!(
            reg.resolve_name("nephew", "family", Resolution::Lenient, &[&base]),
            Ok(q("remote", "nephew"))
        );
        assert_eq!(
            reg.resolve_name("remote:nephew", "family", Resolution::Strict, &[&base]),
            Ok(q("remote", "nephew"))
        );
    }

    #[test]
    fn test_strict_qualifier_must_be_module_name() {
        let reg = registry();
        let base = q("family", "mother");
        // "fam" is family's own prefix and remote's import prefix
        assert_eq!(
            reg.resolve_name("fam:son", "family", Resolution::Lenient, &[&base]),
            Ok(q("family", "son"))
        );
        assert_eq!(
            reg.resolve_name("fam:son", "remote", Resolution::Lenient, &[&base]),
            Ok(q("family", "son"))
        );
        assert_eq!(
            reg.resolve_name("fam:son", "family", Resolution::Strict, &[&base]),
            Err(Violation::UnknownModule("fam".to_string()))
        );
        assert_eq!(
            reg.resolve_name("family:son", "remote", Resolution::Strict, &[&base]),
            Ok(q("family", "son"))
        );
        // "rem" is never imported by family
        assert_eq!(
            reg.resolve_name("rem:nephew", "family", Resolution::Lenient, &[&base]),
            Err(Violation::UnknownModule("rem".to_string()))
        );
    }

    #[test]
    fn test_cycle_is_schema_error() {
        let modules = Arc::new(ModuleTable::from_defs(&[module("m", "m", &[])]).unwrap());
        let result = IdentityRegistry::build(
            modules,
            &[ident("m", "a", &["b"]), ident("m", "b", &["a"])],
        );
        match result {
            Err(YangError::Schema(msg)) => assert!(msg.contains("m:a, m:b")),
            other => panic!("Expected Schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_base_is_schema_error() {
        let modules = Arc::new(ModuleTable::from_defs(&[module("m", "m", &[])]).unwrap());
        let result = IdentityRegistry::build(modules, &[ident("m", "a", &["ghost"])]);
        assert!(matches!(result, Err(YangError::Schema(_))));
    }
}
