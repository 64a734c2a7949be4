//! Validation strategies and the pipeline that applies them to a value.
//!
//! The pipeline runs in a fixed order:
//! 1. structural check for hash/array/child typed properties
//! 2. nil rejection when a validation spec is present
//! 3. dispatch on the [`ValidationSpec`] kind
//!
//! Values equal to the property's default never reach the pipeline; that
//! check lives in [`ConfigTree::set`](crate::ConfigTree::set).

use regex_lite::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::error::{Error, ValidationError};
use crate::schema::StructuralType;
use crate::value::{describe, to_text};

/// Caller-supplied boolean check.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Validator looked up by name, or attached to a single property.
/// Receives the property name and the candidate value.
pub type NamedValidator = Arc<dyn Fn(&str, &Value) -> Result<(), ValidationError> + Send + Sync>;

/// Primitive or structural type a value can be required to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Integer,
    Float,
    Number,
    Boolean,
    Hash,
    Array,
}

impl ValueType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ValueType::String => value.is_string(),
            ValueType::Integer => value.is_i64() || value.is_u64(),
            ValueType::Float => value.is_f64(),
            ValueType::Number => value.is_number(),
            ValueType::Boolean => value.is_boolean(),
            ValueType::Hash => value.is_object(),
            ValueType::Array => value.is_array(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Hash => "hash",
            ValueType::Array => "array",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a property's value is checked.
#[derive(Clone)]
pub enum ValidationSpec {
    /// Value must have this type.
    Type(ValueType),
    /// Value must be one of these members.
    OneOf(Vec<Value>),
    /// Value's string representation must match.
    Pattern(Regex),
    /// Caller-supplied check.
    Predicate(Predicate),
    /// Validator registered under this name (`ipv4`, `ipv6`, `boolean`, ...).
    Named(String),
}

impl ValidationSpec {
    /// Compile a pattern spec.
    pub fn pattern(pattern: &str) -> Result<Self, Error> {
        Regex::new(pattern)
            .map(ValidationSpec::Pattern)
            .map_err(|e| Error::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn one_of<I, V>(members: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ValidationSpec::OneOf(members.into_iter().map(Into::into).collect())
    }

    pub fn predicate(check: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        ValidationSpec::Predicate(Arc::new(check))
    }

    pub fn named(name: impl Into<String>) -> Self {
        ValidationSpec::Named(name.into())
    }

    /// The structural type this spec implies, if any.
    pub fn implied_type(&self) -> Option<ValueType> {
        match self {
            ValidationSpec::Type(t) => Some(*t),
            _ => None,
        }
    }

    fn expectation(&self) -> String {
        match self {
            ValidationSpec::Type(t) => format!("a {}", t),
            ValidationSpec::OneOf(members) => format!("one of {}", member_list(members).join(", ")),
            ValidationSpec::Pattern(re) => format!("matching {}", re.as_str()),
            ValidationSpec::Predicate(_) => "a value accepted by its predicate".to_string(),
            ValidationSpec::Named(name) => format!("a valid {}", name),
        }
    }
}

impl fmt::Debug for ValidationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationSpec::Type(t) => f.debug_tuple("Type").field(t).finish(),
            ValidationSpec::OneOf(members) => f.debug_tuple("OneOf").field(members).finish(),
            ValidationSpec::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            ValidationSpec::Predicate(_) => f.write_str("Predicate(..)"),
            ValidationSpec::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

fn member_list(members: &[Value]) -> Vec<String> {
    members.iter().map(to_text).collect()
}

/// Table of validators addressable by [`ValidationSpec::Named`].
#[derive(Clone)]
pub struct ValidatorRegistry {
    validators: HashMap<String, NamedValidator>,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.validators.keys().collect();
        names.sort();
        f.debug_struct("ValidatorRegistry").field("validators", &names).finish()
    }
}

impl ValidatorRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// Registry with the `ipv4`, `ipv6` and `boolean` validators.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("ipv4", ipv4_validator);
        registry.register("ipv6", ipv6_validator);
        registry.register("boolean", boolean_validator);
        registry
    }

    /// Register (or replace) a validator.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        validator: impl Fn(&str, &Value) -> Result<(), ValidationError> + Send + Sync + 'static,
    ) {
        self.validators.insert(name.into(), Arc::new(validator));
    }

    pub fn get(&self, name: &str) -> Option<&NamedValidator> {
        self.validators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }
}

/// Run the validation pipeline for one property value.
pub fn validate(
    property: &str,
    structural_type: StructuralType,
    spec: Option<&ValidationSpec>,
    value: &Value,
    validators: &ValidatorRegistry,
) -> Result<(), ValidationError> {
    check_structure(property, structural_type, value)?;

    let Some(spec) = spec else {
        return Ok(());
    };

    if value.is_null() {
        return Err(ValidationError::RequiredValue {
            property: property.to_string(),
            expected: spec.expectation(),
        });
    }

    match spec {
        ValidationSpec::Named(name) => match validators.get(name) {
            Some(validator) => validator(property, value),
            None => Err(ValidationError::UnknownValidator {
                property: property.to_string(),
                validator: name.clone(),
            }),
        },
        ValidationSpec::OneOf(members) => {
            if members.contains(value) {
                Ok(())
            } else {
                Err(ValidationError::NotInEnum {
                    property: property.to_string(),
                    allowed: member_list(members),
                })
            }
        }
        ValidationSpec::Pattern(re) => {
            if re.is_match(&to_text(value)) {
                Ok(())
            } else {
                Err(ValidationError::PatternMismatch {
                    property: property.to_string(),
                    pattern: re.as_str().to_string(),
                })
            }
        }
        ValidationSpec::Predicate(check) => {
            if check(value) {
                Ok(())
            } else {
                Err(ValidationError::PredicateFailed {
                    property: property.to_string(),
                })
            }
        }
        ValidationSpec::Type(expected) => {
            if expected.matches(value) {
                Ok(())
            } else {
                Err(type_mismatch(property, expected.name(), value))
            }
        }
    }
}

fn check_structure(
    property: &str,
    structural_type: StructuralType,
    value: &Value,
) -> Result<(), ValidationError> {
    let ok = match structural_type {
        StructuralType::Scalar => true,
        StructuralType::Hash => value.is_object(),
        StructuralType::Array => value.is_array(),
        // Only node links belong in child slots; they never get here.
        StructuralType::Child => false,
    };
    if ok {
        Ok(())
    } else {
        Err(type_mismatch(property, structural_type.name(), value))
    }
}

fn type_mismatch(property: &str, expected: &str, value: &Value) -> ValidationError {
    ValidationError::TypeMismatch {
        property: property.to_string(),
        expected: expected.to_string(),
        found: describe(value).to_string(),
    }
}

/// Split an optional `/prefix` off an address, checking the prefix length.
fn split_prefix(text: &str, max_prefix: u8) -> Option<&str> {
    match text.split_once('/') {
        Some((addr, prefix)) => prefix
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= max_prefix)
            .map(|_| addr),
        None => Some(text),
    }
}

fn ipv4_validator(property: &str, value: &Value) -> Result<(), ValidationError> {
    value
        .as_str()
        .and_then(|s| split_prefix(s, 32))
        .and_then(|s| s.parse::<Ipv4Addr>().ok())
        .map(|_| ())
        .ok_or_else(|| ValidationError::InvalidAddress {
            property: property.to_string(),
            family: "IPv4",
        })
}

fn ipv6_validator(property: &str, value: &Value) -> Result<(), ValidationError> {
    value
        .as_str()
        .and_then(|s| split_prefix(s, 128))
        .and_then(|s| s.parse::<Ipv6Addr>().ok())
        .map(|_| ())
        .ok_or_else(|| ValidationError::InvalidAddress {
            property: property.to_string(),
            family: "IPv6",
        })
}

fn boolean_validator(property: &str, value: &Value) -> Result<(), ValidationError> {
    if value.is_boolean() {
        Ok(())
    } else {
        Err(ValidationError::NotBoolean {
            property: property.to_string(),
        })
    }
}
