//! Schema-driven configuration nodes with parent override and merge rules.
//!
//! A [`Schema`] declares typed, validated properties for one node kind. A
//! [`ConfigTree`] holds live nodes, loads generic nested data into them and
//! resolves each property's effective value against the node's parent:
//!
//! - `override_parent`: the node's own value wins unless it is nil
//! - `merge_with_parent`: arrays concatenate (own elements first), hashes
//!   deep-merge with the parent's value winning on conflicting keys
//! - neither: the node's own value, whatever the parent holds
//!
//! The engine never reads files; callers hand it parsed data.

mod error;
mod loader;
mod resolve;
mod schema;
mod tree;
mod validation;
mod value;

pub use error::{Error, ValidationError};
pub use schema::{
    Munger, PropertyDefinition, Schema, SchemaRegistry, StructuralType, UnknownKeyHandler,
    CHILDREN_PROPERTY, PARENT_PROPERTY,
};
pub use tree::{ConfigNode, ConfigTree};
pub use validation::{
    validate, NamedValidator, Predicate, ValidationSpec, ValidatorRegistry, ValueType,
};
pub use value::{deep_merge, to_text, NodeId, PropertyValue};
