//! Effective-value resolution against the parent chain.
//!
//! Each read is a pure function of the node's stored value, the property's
//! flags and the parent's resolved value. Policies, checked in order:
//!
//! - child slots and parentless nodes return the stored value
//! - a parent whose schema lacks the property contributes nothing
//! - `override_parent`: first non-nil wins, child before parent
//! - neither flag: the stored value, independent of the parent
//! - `merge_with_parent`: arrays concatenate (own first); hashes deep-merge
//!   with the parent winning on conflicting keys

use serde_json::{Map, Value};

use crate::error::{Error, ValidationError};
use crate::schema::{PropertyDefinition, CHILDREN_PROPERTY, PARENT_PROPERTY};
use crate::tree::ConfigTree;
use crate::validation::ValueType;
use crate::value::{deep_merge, NodeId, PropertyValue};

impl ConfigTree {
    /// The effective value of `name` on `node`.
    pub fn get(&self, node: NodeId, name: &str) -> Result<PropertyValue, Error> {
        let current = self.node(node)?;
        let def = current.schema.require(name)?;

        if def.is_implicit() {
            return Ok(match name {
                PARENT_PROPERTY => current
                    .parent
                    .map(PropertyValue::Node)
                    .unwrap_or(PropertyValue::NIL),
                CHILDREN_PROPERTY => PropertyValue::Nodes(current.children.clone()),
                _ => PropertyValue::NIL,
            });
        }

        let stored = current
            .values
            .get(name)
            .cloned()
            .unwrap_or(PropertyValue::NIL);

        if def.is_child() {
            return Ok(stored);
        }

        let Some(parent) = current.parent else {
            return Ok(stored);
        };

        if !self.node(parent)?.schema.contains(name) {
            return Ok(stored);
        }

        if def.overrides_parent() {
            if stored.is_nil() {
                tracing::trace!(property = name, node = node.0, "nil value, deferring to parent");
                return self.get(parent, name);
            }
            return Ok(stored);
        }

        if !def.merges_with_parent() {
            return Ok(stored);
        }

        let Some(shape) = def.merge_shape() else {
            return Err(Error::UnmergeableType {
                kind: current.kind().to_string(),
                property: name.to_string(),
            });
        };

        let inherited = self.get(parent, name)?;
        if shape == ValueType::Array {
            tracing::trace!(property = name, node = node.0, "concatenating with parent");
            let mut merged = sequence(def, stored)?;
            merged.extend(sequence(def, inherited)?);
            Ok(PropertyValue::Data(Value::Array(merged)))
        } else {
            tracing::trace!(property = name, node = node.0, "merging parent over own hash");
            let own = mapping(def, stored)?;
            let theirs = mapping(def, inherited)?;
            Ok(PropertyValue::Data(deep_merge(
                Value::Object(own),
                Value::Object(theirs),
            )))
        }
    }

    /// Every declared property of `node` with its effective value, in
    /// declaration order. `parent` and `children` are left out.
    pub fn resolved_properties(&self, node: NodeId) -> Result<Vec<(String, PropertyValue)>, Error> {
        let schema = self.node(node)?.schema.clone();
        schema
            .properties()
            .map(|def| Ok((def.name().to_string(), self.get(node, def.name())?)))
            .collect()
    }
}

/// Nil contributes nothing to a merge.
fn sequence(def: &PropertyDefinition, value: PropertyValue) -> Result<Vec<Value>, Error> {
    match value {
        PropertyValue::Data(Value::Array(items)) => Ok(items),
        PropertyValue::Data(Value::Null) => Ok(Vec::new()),
        other => Err(shape_mismatch(def, "array", &other)),
    }
}

fn mapping(def: &PropertyDefinition, value: PropertyValue) -> Result<Map<String, Value>, Error> {
    match value {
        PropertyValue::Data(Value::Object(map)) => Ok(map),
        PropertyValue::Data(Value::Null) => Ok(Map::new()),
        other => Err(shape_mismatch(def, "hash", &other)),
    }
}

fn shape_mismatch(def: &PropertyDefinition, expected: &str, found: &PropertyValue) -> Error {
    ValidationError::TypeMismatch {
        property: def.name().to_string(),
        expected: expected.to_string(),
        found: found.describe().to_string(),
    }
    .into()
}
