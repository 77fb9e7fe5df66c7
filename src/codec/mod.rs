//! Namespace-aware JSON Codec
//!
//! RFC 7951 encoding of data trees: member names are `module:name` wherever
//! the module changes (and at the top level), identity values carry their
//! module when it differs from the leaf's, and 64-bit numbers travel as
//! strings.

mod decode;
mod encode;

pub use crate::config::{EncodeMode, OutputFormat, UnknownMembers};
pub use decode::Decoder;
pub use encode::Encoder;

use serde_json::Value;

use crate::restriction::LeafValue;

/// Wire form of a leaf value owned by `leaf_module`
pub(crate) fn value_to_json(value: &LeafValue, leaf_module: &str, qualify_local: bool) -> Value {
    match value {
        LeafValue::String(s) | LeafValue::Enumeration(s) => Value::String(s.clone()),
        LeafValue::Boolean(b) => Value::Bool(*b),
        LeafValue::Empty => Value::Array(vec![Value::Null]),
        LeafValue::Integer { kind, .. } if kind.is_wide() => Value::String(value.to_string()),
        LeafValue::Integer { value: n, .. } => {
            if *n >= 0 {
                u64::try_from(*n).map(Value::from).unwrap_or_else(|_| Value::String(n.to_string()))
            } else {
                i64::try_from(*n).map(Value::from).unwrap_or_else(|_| Value::String(n.to_string()))
            }
        }
        LeafValue::Decimal { .. } => Value::String(value.to_string()),
        LeafValue::Identity(q) if q.module != leaf_module || qualify_local => Value::String(q.to_string()),
        LeafValue::Identity(q) => Value::String(q.name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restriction::IntKind;
    use crate::schema::QName;
    use serde_json::json;

    #[test]
    fn test_wire_forms() {
        let wide = LeafValue::Integer {
            value: 5,
            kind: IntKind::Uint64,
        };
        assert_eq!(value_to_json(&wide, "m", false), json!("5"));

        let narrow = LeafValue::Integer {
            value: -5,
            kind: IntKind::Int32,
        };
        assert_eq!(value_to_json(&narrow, "m", false), json!(-5));

        assert_eq!(value_to_json(&LeafValue::Empty, "m", false), json!([null]));
        assert_eq!(
            value_to_json(
                &LeafValue::Decimal {
                    scaled: 1250,
                    fraction_digits: 3
                },
                "m",
                false
            ),
            json!("1.250")
        );
    }

    #[test]
    fn test_identity_qualification() {
        let local = LeafValue::Identity(QName::new("m", "lcaf"));
        assert_eq!(value_to_json(&local, "m", false), json!("lcaf"));
        assert_eq!(value_to_json(&local, "m", true), json!("m:lcaf"));

        let remote = LeafValue::Identity(QName::new("remote-two", "remote-id"));
        assert_eq!(value_to_json(&remote, "m", false), json!("remote-two:remote-id"));
    }
}
