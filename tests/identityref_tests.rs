//! Identityref Tests
//!
//! Identity derivation across two modules, lenient assignment versus strict
//! decoding, and namespace handling of identity values on the wire.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use yangtree::{
    DataTree, Decoder, Encoder, EncodeMode, LeafValue, PathIndex, QName, Schema, Violation, YangError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn schema() -> Arc<Schema> {
    init_tracing();
    Schema::from_json_str(include_str!("fixtures/identityref.json")).unwrap()
}

fn tree() -> DataTree {
    DataTree::new(schema(), Some(PathIndex::shared())).unwrap()
}

/// Assign each candidate to a fresh tree and compare acceptance
fn check_assignments(container: &str, leaf: &str, cases: &[(&str, bool)]) {
    for (identity, valid) in cases {
        let tree = tree();
        let result = tree.container(container).unwrap().set(leaf, *identity);
        assert_eq!(
            result.is_ok(),
            *valid,
            "{}/{} = {:?}: {:?}",
            container,
            leaf,
            identity,
            result
        );
    }
}

// =============================================================================
// Structure and Defaults
// =============================================================================

#[test]
fn test_identityref_leafs_exist_and_start_unset() {
    let tree = tree();
    let container = tree.container("test-container").unwrap();

    for name in ["id1", "idr1"] {
        let leaf = container.leaf(name).unwrap();
        assert!(!leaf.is_set());
        assert_eq!(leaf.value(), None);
    }
}

#[test]
fn test_invalid_string_is_rejected() {
    let tree = tree();
    let err = tree.container("test-container").unwrap().set("id1", "hello").unwrap_err();

    assert_eq!(err.path(), Some("/identityref:test-container/id1"));
    assert_eq!(err.violation(), Some(&Violation::UnknownIdentity("hello".to_string())));
}

// =============================================================================
// Derivation
// =============================================================================

#[test]
fn test_direct_derivations_accepted() {
    check_assignments("test-container", "id1", &[("option-one", true), ("option-two", true)]);
    check_assignments("test-container", "idr1", &[("remote-one", true), ("remote-two", true)]);
}

#[test]
fn test_base_and_descendants_accepted() {
    check_assignments(
        "test-container",
        "id2",
        &[
            ("father", true),
            ("son", true),
            ("foo:father", true),
            ("foo:son", true),
            ("elephant", false),
            ("hamster", false),
        ],
    );
}

#[test]
fn test_deep_ancestry() {
    check_assignments(
        "test-container",
        "id3",
        &[
            ("grandmother", true),
            ("mother", true),
            ("niece", false),
            ("aunt", true),
            ("cousin", true),
            ("daughter", true),
            ("son", false),
            ("father", false),
            ("grandfather", false),
        ],
    );
    check_assignments(
        "test-container",
        "id4",
        &[("daughter", true), ("cousin", false), ("aunt", false)],
    );
}

#[test]
fn test_typedef_identityref() {
    check_assignments(
        "test-container",
        "id5",
        &[
            ("daughter", true),
            ("cousin", true),
            ("mother", true),
            ("aunt", true),
            ("greatgrandmother", false),
        ],
    );
}

#[test]
fn test_identityref_inside_grouping() {
    check_assignments(
        "ak",
        "address-type",
        &[("source-dest", true), ("lcaf", true), ("unknown", false)],
    );
}

#[test]
fn test_not_derived_is_distinct_from_unknown() {
    let tree = tree();
    let container = tree.container("test-container").unwrap();

    let err = container.set("id4", "aunt").unwrap_err();
    assert!(matches!(err.violation(), Some(Violation::NotDerived { .. })));

    let err = container.set("id4", "elephant").unwrap_err();
    assert!(matches!(err.violation(), Some(Violation::UnknownIdentity(_))));
}

#[test]
fn test_failed_assignment_keeps_previous_value() {
    let tree = tree();
    let leaf = tree.container("test-container").unwrap().leaf("id2").unwrap();

    leaf.set("son").unwrap();
    assert!(leaf.set("hamster").is_err());
    assert_eq!(
        leaf.value(),
        Some(LeafValue::Identity(QName::new("identityref", "son")))
    );
}

// =============================================================================
// Imported Modules
// =============================================================================

#[test]
fn test_identity_from_imported_module() {
    check_assignments(
        "test-container",
        "idr1",
        &[
            ("remote:remote-one", true),
            ("fordprefect:remote-one", false),
            ("remote:remote-two", true),
            ("remote-two:remote-one", true),
            // own prefix of remote-two, which identityref imports as "remote"
            ("rtwo:remote-one", false),
        ],
    );
}

#[test]
fn test_unknown_prefix_reports_module() {
    let tree = tree();
    let err = tree
        .container("test-container")
        .unwrap()
        .set("idr1", "fordprefect:remote-one")
        .unwrap_err();
    assert_eq!(
        err.violation(),
        Some(&Violation::UnknownModule("fordprefect".to_string()))
    );
}

#[test]
fn test_imported_typedef_referencing_its_own_identity() {
    check_assignments(
        "ietfint",
        "ref",
        &[("remote-id", true), ("remote-two:remote-id", true), ("invalid", false)],
    );
}

// =============================================================================
// Wire Namespaces
// =============================================================================

#[test]
fn test_remote_identity_is_always_qualified() {
    for identity in ["remote-id", "remote-two:remote-id"] {
        let tree = tree();
        tree.container("ietfint").unwrap().set("ref", identity).unwrap();

        let doc = Encoder::new(EncodeMode::Filtered).encode(&tree);
        assert_eq!(doc["identityref:ietfint"]["ref"], json!("remote-two:remote-id"));
    }
}

#[test]
fn test_local_identity_qualification_is_optional() {
    let tree = tree();
    tree.container("ak").unwrap().set("address-type", "lcaf").unwrap();

    let bare = Encoder::new(EncodeMode::Filtered).encode(&tree);
    assert_eq!(bare, json!({"identityref:ak": {"address-type": "lcaf"}}));

    let qualified = Encoder::new(EncodeMode::Filtered)
        .qualify_local_identities(true)
        .encode(&tree);
    assert_eq!(qualified, json!({"identityref:ak": {"address-type": "identityref:lcaf"}}));
}

#[test]
fn test_decode_requires_qualified_remote_identity() -> anyhow::Result<()> {
    let decoder = Decoder::new(schema());

    let tree = decoder.decode(&json!({"ietfint": {"ref": "remote-two:remote-id"}}), "identityref")?;
    let value = tree.container("ietfint")?.get("ref")?;
    assert_eq!(value, Some(LeafValue::Identity(QName::new("remote-two", "remote-id"))));

    let err = decoder
        .decode(&json!({"ietfint": {"ref": "remote-id"}}), "identityref")
        .unwrap_err();
    assert!(matches!(
        err,
        YangError::Validation {
            violation: Violation::UnknownIdentity(_),
            ..
        }
    ));

    // prefixes and import aliases are not module names
    for value in ["fordprefect:remote-id", "rtwo:remote-id", "remote:remote-id"] {
        let err = decoder
            .decode(&json!({"ietfint": {"ref": value}}), "identityref")
            .unwrap_err();
        assert!(
            matches!(err.violation(), Some(Violation::UnknownModule(_))),
            "{}: {:?}",
            value,
            err
        );
    }
    Ok(())
}

#[test]
fn test_decode_rejects_own_prefix_on_local_identity() {
    let decoder = Decoder::new(schema());

    let err = decoder
        .decode(&json!({"ak": {"address-type": "foo:lcaf"}}), "identityref")
        .unwrap_err();
    assert_eq!(err.violation(), Some(&Violation::UnknownModule("foo".to_string())));
    assert!(decoder
        .decode(&json!({"ak": {"address-type": "identityref:lcaf"}}), "identityref")
        .is_ok());
}

#[test]
fn test_decode_accepts_bare_local_identity() -> anyhow::Result<()> {
    let doc = json!({"identityref:ak": {"address-type": "source-dest"}});
    let tree = Decoder::new(schema()).decode(&doc, "identityref")?;

    assert_eq!(
        tree.container("ak")?.get("address-type")?,
        Some(LeafValue::Identity(QName::new("identityref", "source-dest")))
    );
    assert_eq!(Encoder::new(EncodeMode::Filtered).encode(&tree), doc);
    Ok(())
}

#[test]
fn test_full_mode_emits_unset_leafs_as_null() {
    let tree = tree();
    let doc = Encoder::new(EncodeMode::Full).encode(&tree);

    assert_eq!(doc["identityref:test-container"]["id1"], json!(null));
    assert_eq!(doc["identityref:ak"]["address-type"], json!(null));
}
