//! yangtree
//!
//! Schema-validated configuration and state data trees with namespace-aware
//! JSON encoding (RFC 7951).
//!
//! ## Features
//!
//! - **Compiled Schemas**: A normalized module graph is compiled once into an
//!   immutable, `Arc`-shared table of node descriptors and restriction sets
//! - **Identity Registry**: Multi-module identity derivation with precomputed
//!   ancestor sets
//! - **Typed Leafs**: Every assignment is validated (patterns, ranges,
//!   lengths, enumerations, identityrefs, leafrefs, unions)
//! - **Keyed Lists**: Composite keys, duplicate detection, stable order
//! - **Path Index**: Optional instance-path lookup used for leafref checks
//! - **Codec**: Filtered or full encoding, strict all-or-nothing decoding
//!
//! ## Architecture
//!
//! ```text
//! SchemaModel (JSON) --compile--> Schema (Arc)
//!                                   │
//!        ┌──────────────────────────┼───────────────────┐
//!        ▼                          ▼                   ▼
//!  IdentityRegistry         RestrictionSet       NodeSchema table
//!                                   │
//!                     DataTree ◄────┘ ──── PathIndex (Rc, optional)
//!                        │
//!              Encoder / Decoder  ◄──►  RFC 7951 JSON
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod path_index;
pub mod restriction;
pub mod schema;
pub mod tree;

pub use codec::{Decoder, Encoder};
pub use config::{CodecConfig, EncodeMode, OutputFormat, UnknownMembers};
pub use error::{Result, Violation, YangError};
pub use identity::{IdentityRegistry, Resolution};
pub use path_index::{PathIndex, SharedPathIndex};
pub use restriction::{LeafValue, RestrictionSet};
pub use schema::{NodeSchema, QName, Schema, SchemaModel};
pub use tree::{Container, DataTree, Leaf, LeafList, List, Node};
