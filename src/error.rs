//! Error types for schema compilation, tree mutation and the wire codec

use thiserror::Error;

/// Result type for tree operations
pub type Result<T> = std::result::Result<T, YangError>;

/// Errors surfaced by the schema compiler, the data tree and the codec
#[derive(Error, Debug)]
pub enum YangError {
    #[error("validation failed at {path}: {violation}")]
    Validation { path: String, violation: Violation },

    #[error("duplicate key {key:?} in {path}")]
    DuplicateKey { path: String, key: String },

    #[error("path not found: {path}")]
    PathNotFound { path: String },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl YangError {
    pub(crate) fn validation(path: impl Into<String>, violation: Violation) -> Self {
        YangError::Validation {
            path: path.into(),
            violation,
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        YangError::Schema(message.into())
    }

    /// The structural path the error refers to, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            YangError::Validation { path, .. }
            | YangError::DuplicateKey { path, .. }
            | YangError::PathNotFound { path } => Some(path),
            YangError::Schema(_) | YangError::Json(_) => None,
        }
    }

    /// The underlying violation for validation failures
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            YangError::Validation { violation, .. } => Some(violation),
            _ => None,
        }
    }
}

/// A value rejected by a restriction, without path context.
///
/// Produced by the restriction engine and the identity registry; the data
/// tree attaches the structural path when converting into [`YangError`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Violation {
    #[error("expected {expected}, got {found}")]
    Type { expected: String, found: String },

    #[error("{value:?} does not match pattern {pattern}")]
    Pattern { value: String, pattern: String },

    #[error("length {length} is outside {allowed}")]
    Length { length: u64, allowed: String },

    #[error("{value} is outside range {allowed}")]
    Range { value: String, allowed: String },

    #[error("{value:?} is not one of the enumerated values")]
    Enumeration { value: String },

    #[error("unknown module or prefix {0:?}")]
    UnknownModule(String),

    #[error("unknown identity {0:?}")]
    UnknownIdentity(String),

    #[error("identity {identity} is not derived from {base}")]
    NotDerived { identity: String, base: String },

    #[error("no instance of {target} has value {value:?}")]
    MissingInstance { target: String, value: String },

    #[error("no member type of the union accepts {value}")]
    Union { value: String },

    #[error("unknown member {name:?}{}", suggestion_suffix(.suggestion))]
    UnknownMember {
        name: String,
        suggestion: Option<String>,
    },

    #[error("name {0:?} is ambiguous between modules; qualify it")]
    Ambiguous(String),

    #[error("key leaf {0:?} cannot change after the entry is created")]
    ImmutableKey(String),

    #[error("missing key leaf {0:?}")]
    MissingKey(String),

    #[error("path is already registered to a different node")]
    PathInUse,

    #[error("{0}")]
    Other(String),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean {:?}?)", s),
        None => String::new(),
    }
}
