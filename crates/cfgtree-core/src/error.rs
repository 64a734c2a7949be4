//! Error types for schema declaration, property access and validation.

use crate::value::NodeId;

/// Errors raised while declaring schemas or operating on a config tree.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`{kind}` already has a property `{property}`")]
    DuplicateProperty { kind: String, property: String },

    #[error("invalid definition of `{property}` in `{kind}`: {reason}")]
    InvalidDefinition {
        kind: String,
        property: String,
        reason: String,
    },

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unknown property `{property}` in `{kind}`")]
    UnknownProperty { kind: String, property: String },

    #[error("while loading data in `{kind}`, found `{key}` that is not known")]
    UnknownKey { kind: String, key: String },

    #[error("property `{property}` in `{kind}` is managed by the tree and cannot be set")]
    ReservedProperty { kind: String, property: String },

    #[error("while resolving `{property}` in `{kind}`: can only merge array or hash type properties")]
    UnmergeableType { kind: String, property: String },

    #[error("child property `{property}` in `{kind}` has no linked node to load into")]
    ChildNotLinked { kind: String, property: String },

    #[error("expected a mapping to load into `{kind}`, found {found}")]
    ExpectedMapping { kind: String, found: &'static str },

    #[error("unknown node kind `{0}`")]
    UnknownKind(String),

    #[error("node kind `{0}` is already registered")]
    DuplicateKind(String),

    #[error("{0} does not belong to this tree")]
    UnknownNode(NodeId),

    #[error("{child} of kind `{kind}` is already owned by another node")]
    AlreadyOwned { kind: String, child: NodeId },

    #[error("linking {child} under {owner} would create a cycle")]
    OwnershipCycle { owner: NodeId, child: NodeId },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A value was rejected by the validation pipeline of a property.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{property} is a {found} should be a {expected}")]
    TypeMismatch {
        property: String,
        expected: String,
        found: String,
    },

    #[error("{property} should be {expected}")]
    RequiredValue { property: String, expected: String },

    #[error("{property} should be one of {}", allowed.join(", "))]
    NotInEnum {
        property: String,
        allowed: Vec<String>,
    },

    #[error("{property} should match {pattern}")]
    PatternMismatch { property: String, pattern: String },

    #[error("{property} does not validate against predicate")]
    PredicateFailed { property: String },

    #[error("don't know how to validate {property} using {validator}")]
    UnknownValidator { property: String, validator: String },

    #[error("{property} should be a valid {family} address")]
    InvalidAddress {
        property: String,
        family: &'static str,
    },

    #[error("{property} should be a boolean")]
    NotBoolean { property: String },

    #[error("{property}: {reason}")]
    Rejected { property: String, reason: String },
}

impl ValidationError {
    /// Name of the property whose value was rejected.
    pub fn property(&self) -> &str {
        match self {
            Self::TypeMismatch { property, .. }
            | Self::RequiredValue { property, .. }
            | Self::NotInEnum { property, .. }
            | Self::PatternMismatch { property, .. }
            | Self::PredicateFailed { property }
            | Self::UnknownValidator { property, .. }
            | Self::InvalidAddress { property, .. }
            | Self::NotBoolean { property }
            | Self::Rejected { property, .. } => property,
        }
    }

    /// Rejection produced by a caller-supplied validator hook.
    pub fn rejected(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            property: property.into(),
            reason: reason.into(),
        }
    }
}
