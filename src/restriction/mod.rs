//! Restriction Engine
//!
//! A [`RestrictionSet`] is a compiled type: a builtin base type plus the
//! predicates layered on by typedefs and use sites. Layers are chained via
//! `parent` so a typedef used by many leaves is compiled (and its regexes
//! built) exactly once and shared through an `Arc`.
//!
//! Validation turns a raw JSON value into a normalized [`LeafValue`] or a
//! [`Violation`]. Leafrefs are delegated to a [`LeafRefResolver`] supplied
//! by the data tree, since only the tree knows the referenced instances.

pub mod bounds;
pub mod value;

pub use bounds::{Interval, Intervals};
pub use value::{IntKind, LeafValue};

use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Violation;
use crate::identity::{IdentityRegistry, Resolution};
use crate::schema::QName;

// =============================================================================
// Types
// =============================================================================

/// The builtin type at the bottom of a restriction chain
#[derive(Debug, Clone)]
pub enum BaseType {
    String,
    Boolean,
    Empty,
    Integer(IntKind),
    Decimal64 {
        fraction_digits: u8,
    },
    Enumeration,
    IdentityRef,
    LeafRef {
        path: String,
        require_instance: bool,
        /// Module whose prefixes the path is written in
        context_module: String,
    },
    Union(Vec<Arc<RestrictionSet>>),
}

impl BaseType {
    pub fn name(&self) -> &'static str {
        match self {
            BaseType::String => "string",
            BaseType::Boolean => "boolean",
            BaseType::Empty => "empty",
            BaseType::Integer(kind) => kind.name(),
            BaseType::Decimal64 { .. } => "decimal64",
            BaseType::Enumeration => "enumeration",
            BaseType::IdentityRef => "identityref",
            BaseType::LeafRef { .. } => "leafref",
            BaseType::Union(_) => "union",
        }
    }
}

/// Any of `sources` must match the whole value
#[derive(Debug)]
pub struct PatternGroup {
    sources: Vec<String>,
    compiled: Vec<Regex>,
}

impl PatternGroup {
    pub(crate) fn new(sources: &[String]) -> Result<Self, String> {
        let compiled = sources
            .iter()
            .map(|src| {
                Regex::new(&format!("^(?:{})$", src))
                    .map_err(|e| format!("invalid pattern {:?}: {}", src, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            sources: sources.to_vec(),
            compiled,
        })
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(text))
    }
}

#[derive(Debug)]
pub enum Predicate {
    Pattern(PatternGroup),
    Length(Intervals),
    /// Bounds are in the scaled domain for decimal64
    Range(Intervals),
    Enumeration(Vec<String>),
    IdentityBase(Vec<QName>),
}

/// What a validator may consult besides the raw value
pub struct ValidationContext<'a> {
    pub identities: &'a IdentityRegistry,
    /// Module of the leaf being validated
    pub module: &'a str,
    pub resolution: Resolution,
    pub leafref: Option<&'a dyn LeafRefResolver>,
}

/// Validates a value against the target of a leafref
pub trait LeafRefResolver {
    fn resolve(
        &self,
        raw: &Value,
        require_instance: bool,
        ctx: &ValidationContext<'_>,
    ) -> Result<LeafValue, Violation>;
}

/// A compiled type with its inherited restriction layers
#[derive(Debug)]
pub struct RestrictionSet {
    base: BaseType,
    predicates: Vec<Predicate>,
    parent: Option<Arc<RestrictionSet>>,
    origin: Option<QName>,
}

impl RestrictionSet {
    pub(crate) fn builtin(base: BaseType, predicates: Vec<Predicate>, origin: Option<QName>) -> Self {
        Self {
            base,
            predicates,
            parent: None,
            origin,
        }
    }

    /// A new layer on top of `parent`, inheriting its base type
    pub(crate) fn derive(parent: Arc<RestrictionSet>, predicates: Vec<Predicate>, origin: Option<QName>) -> Self {
        Self {
            base: parent.base.clone(),
            predicates,
            parent: Some(parent),
            origin,
        }
    }

    pub fn base(&self) -> &BaseType {
        &self.base
    }

    pub fn parent(&self) -> Option<&Arc<RestrictionSet>> {
        self.parent.as_ref()
    }

    /// The typedef this layer was compiled for, if any
    pub fn origin(&self) -> Option<&QName> {
        self.origin.as_ref()
    }

    /// Predicates of this layer only
    pub fn own_predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Number of predicates including inherited layers
    pub fn cardinality(&self) -> usize {
        self.predicates.len() + self.parent.as_ref().map(|p| p.cardinality()).unwrap_or(0)
    }

    /// All predicates, outermost typedef first
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut layers = Vec::new();
        let mut current = Some(self);
        while let Some(set) = current {
            layers.push(set);
            current = set.parent.as_deref();
        }
        layers
            .into_iter()
            .rev()
            .flat_map(|set| set.predicates.iter())
            .collect()
    }

    /// Enumerated names still allowed (intersection of all layers)
    pub fn enum_values(&self) -> Vec<&str> {
        let mut allowed: Option<Vec<&str>> = None;
        for predicate in self.predicates() {
            if let Predicate::Enumeration(names) = predicate {
                allowed = Some(match allowed {
                    None => names.iter().map(|s| s.as_str()).collect(),
                    Some(prev) => prev
                        .into_iter()
                        .filter(|n| names.iter().any(|m| m.as_str() == *n))
                        .collect(),
                });
            }
        }
        allowed.unwrap_or_default()
    }

    pub fn identity_bases(&self) -> Vec<&QName> {
        self.predicates()
            .into_iter()
            .filter_map(|p| match p {
                Predicate::IdentityBase(bases) => Some(bases.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// True if a leafref appears anywhere in this type
    pub fn involves_leafref(&self) -> bool {
        match &self.base {
            BaseType::LeafRef { .. } => true,
            BaseType::Union(members) => members.iter().any(|m| m.involves_leafref()),
            _ => false,
        }
    }

    /// Validate and normalize a raw value
    pub fn validate(&self, raw: &Value, ctx: &ValidationContext<'_>) -> Result<LeafValue, Violation> {
        let value = match &self.base {
            BaseType::Union(members) => validate_union(members, raw, ctx)?,
            BaseType::LeafRef { require_instance, .. } => match ctx.leafref {
                Some(resolver) => resolver.resolve(raw, *require_instance, ctx)?,
                None => return Err(Violation::Other("leafref cannot be resolved here".to_string())),
            },
            BaseType::IdentityRef => {
                let text = expect_str(raw, "identityref")?;
                let bases = self.identity_bases();
                LeafValue::Identity(ctx.identities.resolve_name(text, ctx.module, ctx.resolution, &bases)?)
            }
            base => normalize_scalar(base, raw)?,
        };

        for predicate in self.predicates() {
            check_predicate(predicate, &value, ctx.identities)?;
        }

        Ok(value)
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_union(
    members: &[Arc<RestrictionSet>],
    raw: &Value,
    ctx: &ValidationContext<'_>,
) -> Result<LeafValue, Violation> {
    for member in members {
        if let Ok(value) = member.validate(raw, ctx) {
            return Ok(value);
        }
    }
    Err(Violation::Union { value: raw.to_string() })
}

fn normalize_scalar(base: &BaseType, raw: &Value) -> Result<LeafValue, Violation> {
    match base {
        BaseType::String => Ok(LeafValue::String(expect_str(raw, "string")?.to_string())),
        BaseType::Enumeration => Ok(LeafValue::Enumeration(expect_str(raw, "enumeration")?.to_string())),
        BaseType::Boolean => match raw {
            Value::Bool(b) => Ok(LeafValue::Boolean(*b)),
            Value::String(s) if s == "true" => Ok(LeafValue::Boolean(true)),
            Value::String(s) if s == "false" => Ok(LeafValue::Boolean(false)),
            other => Err(type_error("boolean", other)),
        },
        BaseType::Empty => match raw {
            Value::Null => Ok(LeafValue::Empty),
            Value::Array(items) if items.len() == 1 && items[0].is_null() => Ok(LeafValue::Empty),
            other => Err(type_error("empty", other)),
        },
        BaseType::Integer(kind) => {
            let value = match raw {
                Value::Number(n) => n
                    .as_i64()
                    .map(i128::from)
                    .or_else(|| n.as_u64().map(i128::from))
                    .ok_or_else(|| type_error(kind.name(), raw))?,
                Value::String(s) => s
                    .trim()
                    .parse::<i128>()
                    .map_err(|_| type_error(kind.name(), raw))?,
                other => return Err(type_error(kind.name(), other)),
            };
            if value < kind.min() || value > kind.max() {
                return Err(Violation::Range {
                    value: value.to_string(),
                    allowed: format!("{}..{}", kind.min(), kind.max()),
                });
            }
            Ok(LeafValue::Integer { value, kind: *kind })
        }
        BaseType::Decimal64 { fraction_digits } => {
            let text = match raw {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                other => return Err(type_error("decimal64", other)),
            };
            let scaled = value::parse_decimal(&text, *fraction_digits)
                .filter(|s| *s >= i64::MIN as i128 && *s <= i64::MAX as i128)
                .ok_or_else(|| type_error("decimal64", raw))?;
            Ok(LeafValue::Decimal {
                scaled,
                fraction_digits: *fraction_digits,
            })
        }
        BaseType::IdentityRef | BaseType::LeafRef { .. } | BaseType::Union(_) => {
            Err(Violation::Other(format!("{} is not a scalar type", base.name())))
        }
    }
}

fn check_predicate(
    predicate: &Predicate,
    value: &LeafValue,
    identities: &IdentityRegistry,
) -> Result<(), Violation> {
    match predicate {
        Predicate::Pattern(group) => {
            let text = value.to_string();
            if !group.is_match(&text) {
                return Err(Violation::Pattern {
                    value: text,
                    pattern: group.sources().join(" | "),
                });
            }
        }
        Predicate::Length(allowed) => {
            let length = value.to_string().chars().count() as u64;
            if !allowed.contains(length as i128) {
                return Err(Violation::Length {
                    length,
                    allowed: allowed.to_string(),
                });
            }
        }
        Predicate::Range(allowed) => {
            let point = match value {
                LeafValue::Integer { value, .. } => Some(*value),
                LeafValue::Decimal { scaled, .. } => Some(*scaled),
                _ => None,
            };
            if let Some(point) = point {
                if !allowed.contains(point) {
                    return Err(Violation::Range {
                        value: value.to_string(),
                        allowed: allowed.to_string(),
                    });
                }
            }
        }
        Predicate::Enumeration(names) => {
            let text = value.to_string();
            if !names.iter().any(|n| *n == text) {
                return Err(Violation::Enumeration { value: text });
            }
        }
        Predicate::IdentityBase(bases) => {
            if let LeafValue::Identity(identity) = value {
                for base in bases {
                    if !identities.derived_from(identity, base) {
                        return Err(Violation::NotDerived {
                            identity: identity.to_string(),
                            base: base.to_string(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

fn expect_str<'v>(raw: &'v Value, expected: &str) -> Result<&'v str, Violation> {
    raw.as_str().ok_or_else(|| type_error(expected, raw))
}

fn type_error(expected: &str, found: &Value) -> Violation {
    Violation::Type {
        expected: expected.to_string(),
        found: json_kind(found).to_string(),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IdentityDef, ModuleDef, ModuleTable};
    use serde_json::json;

    fn registry() -> IdentityRegistry {
        let modules = Arc::new(
            ModuleTable::from_defs(&[ModuleDef {
                name: "m".to_string(),
                prefix: "m".to_string(),
                namespace: None,
                revision: None,
                imports: Default::default(),
            }])
            .unwrap(),
        );
        IdentityRegistry::build(
            modules,
            &[
                IdentityDef {
                    module: "m".to_string(),
                    name: "base".to_string(),
                    bases: vec![],
                },
                IdentityDef {
                    module: "m".to_string(),
                    name: "child".to_string(),
                    bases: vec!["base".to_string()],
                },
                IdentityDef {
                    module: "m".to_string(),
                    name: "other".to_string(),
                    bases: vec![],
                },
            ],
        )
        .unwrap()
    }

    fn ctx(reg: &IdentityRegistry) -> ValidationContext<'_> {
        ValidationContext {
            identities: reg,
            module: "m",
            resolution: Resolution::Strict,
            leafref: None,
        }
    }

    fn int_range(kind: IntKind, expr: &str) -> Predicate {
        Predicate::Range(Intervals::parse(expr, kind.min(), kind.max(), |s| s.parse().ok()).unwrap())
    }

    #[test]
    fn test_layers_accumulate_cardinality() {
        let base = Arc::new(RestrictionSet::builtin(
            BaseType::Integer(IntKind::Uint8),
            vec![int_range(IntKind::Uint8, "1..100")],
            Some(QName::new("m", "percent")),
        ));
        let narrowed = RestrictionSet::derive(base.clone(), vec![int_range(IntKind::Uint8, "1..50")], None);

        assert_eq!(base.cardinality(), 1);
        assert_eq!(narrowed.cardinality(), 2);
        assert!(Arc::ptr_eq(narrowed.parent().unwrap(), &base));

        let reg = registry();
        assert!(narrowed.validate(&json!(40), &ctx(&reg)).is_ok());
        match narrowed.validate(&json!(60), &ctx(&reg)) {
            Err(Violation::Range { allowed, .. }) => assert_eq!(allowed, "1..50"),
            other => panic!("Expected Range violation, got {:?}", other),
        }
        assert!(matches!(
            narrowed.validate(&json!(300), &ctx(&reg)),
            Err(Violation::Range { .. })
        ));
    }

    #[test]
    fn test_pattern_is_anchored() {
        let set = RestrictionSet::builtin(
            BaseType::String,
            vec![Predicate::Pattern(PatternGroup::new(&["[a-z]+".to_string()]).unwrap())],
            None,
        );
        let reg = registry();
        assert_eq!(
            set.validate(&json!("abc"), &ctx(&reg)),
            Ok(LeafValue::String("abc".to_string()))
        );
        assert!(matches!(
            set.validate(&json!("abc1"), &ctx(&reg)),
            Err(Violation::Pattern { .. })
        ));
    }

    #[test]
    fn test_lenient_scalar_forms() {
        let reg = registry();
        let c = ctx(&reg);
        let u64_set = RestrictionSet::builtin(BaseType::Integer(IntKind::Uint64), vec![], None);
        assert_eq!(
            u64_set.validate(&json!("18446744073709551615"), &c),
            Ok(LeafValue::Integer {
                value: u64::MAX as i128,
                kind: IntKind::Uint64
            })
        );

        let boolean = RestrictionSet::builtin(BaseType::Boolean, vec![], None);
        assert_eq!(boolean.validate(&json!("true"), &c), Ok(LeafValue::Boolean(true)));
        assert!(boolean.validate(&json!(1), &c).is_err());

        let empty = RestrictionSet::builtin(BaseType::Empty, vec![], None);
        assert_eq!(empty.validate(&json!([null]), &c), Ok(LeafValue::Empty));

        let dec = RestrictionSet::builtin(BaseType::Decimal64 { fraction_digits: 2 }, vec![], None);
        assert_eq!(
            dec.validate(&json!(1.5), &c).map(|v| v.to_string()),
            Ok("1.50".to_string())
        );
    }

    #[test]
    fn test_union_takes_first_accepting_member() {
        let reg = registry();
        let union = RestrictionSet::builtin(
            BaseType::Union(vec![
                Arc::new(RestrictionSet::builtin(BaseType::Integer(IntKind::Int8), vec![], None)),
                Arc::new(RestrictionSet::builtin(BaseType::String, vec![], None)),
            ]),
            vec![],
            None,
        );
        assert!(matches!(
            union.validate(&json!(5), &ctx(&reg)),
            Ok(LeafValue::Integer { value: 5, .. })
        ));
        assert_eq!(
            union.validate(&json!("five"), &ctx(&reg)),
            Ok(LeafValue::String("five".to_string()))
        );
        assert!(matches!(
            union.validate(&json!(true), &ctx(&reg)),
            Err(Violation::Union { .. })
        ));
    }

    #[test]
    fn test_identityref_checks_derivation() {
        let reg = registry();
        let set = RestrictionSet::builtin(
            BaseType::IdentityRef,
            vec![Predicate::IdentityBase(vec![QName::new("m", "base")])],
            None,
        );
        assert_eq!(
            set.validate(&json!("child"), &ctx(&reg)),
            Ok(LeafValue::Identity(QName::new("m", "child")))
        );
        assert!(matches!(
            set.validate(&json!("other"), &ctx(&reg)),
            Err(Violation::NotDerived { .. })
        ));
        assert!(matches!(
            set.validate(&json!("elephant"), &ctx(&reg)),
            Err(Violation::UnknownIdentity(_))
        ));
    }

    #[test]
    fn test_enum_values_intersect_layers() {
        let base = Arc::new(RestrictionSet::builtin(
            BaseType::Enumeration,
            vec![Predicate::Enumeration(vec!["a".into(), "b".into(), "c".into()])],
            None,
        ));
        let narrowed = RestrictionSet::derive(base, vec![Predicate::Enumeration(vec!["b".into(), "c".into()])], None);
        assert_eq!(narrowed.enum_values(), vec!["b", "c"]);

        let reg = registry();
        assert!(matches!(
            narrowed.validate(&json!("a"), &ctx(&reg)),
            Err(Violation::Enumeration { .. })
        ));
    }
}
