//! Stored property values and the deep merge used by hash properties.
//!
//! Data values are plain `serde_json::Value`s: whatever a JSON or TOML
//! parser yields. Child links are node handles and never pass through the
//! merge or validation paths.

use serde_json::Value;
use std::fmt;

/// Handle of a node inside a [`ConfigTree`](crate::ConfigTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in its tree's arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node #{}", self.0)
    }
}

/// Value held in (or resolved from) a property slot.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Plain configuration data.
    Data(Value),
    /// Link to a single child node.
    Node(NodeId),
    /// The owned children list.
    Nodes(Vec<NodeId>),
}

impl PropertyValue {
    pub const NIL: PropertyValue = PropertyValue::Data(Value::Null);

    /// True for the absent value (`Data(Null)`).
    pub fn is_nil(&self) -> bool {
        matches!(self, PropertyValue::Data(Value::Null))
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            PropertyValue::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<Value> {
        match self {
            PropertyValue::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            PropertyValue::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_data().and_then(Value::as_str)
    }

    /// Short description of the value's shape, used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            PropertyValue::Data(v) => describe(v),
            PropertyValue::Node(_) => "config node",
            PropertyValue::Nodes(_) => "list of config nodes",
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        PropertyValue::Data(value)
    }
}

impl From<NodeId> for PropertyValue {
    fn from(id: NodeId) -> Self {
        PropertyValue::Node(id)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Data(Value::String(s.to_string()))
    }
}

/// Short description of a data value's shape.
pub fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "hash",
    }
}

/// String representation used for pattern matching and display: strings as-is,
/// everything else as its JSON text.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Deep merge two values.
///
/// Merge semantics:
/// - Objects: deep-merge by key (recursive), overlay wins on conflicts
/// - Anything else: overlay replaces base wholesale
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            // Merge in place so keys keep their original position.
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => {
                        let merged = deep_merge(base_value.take(), overlay_value);
                        *base_value = merged;
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Object(base_map)
        }

        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_overlay_wins_on_conflicting_leaves() {
        let base = json!({"a": 1, "b": 2});
        let overlay = json!({"b": 99, "c": 3});
        assert_eq!(deep_merge(base, overlay), json!({"a": 1, "b": 99, "c": 3}));
    }

    #[test]
    fn test_nested_deep_merge() {
        let base = json!({
            "level1": {
                "level2": {"a": 1, "b": 2}
            }
        });
        let overlay = json!({
            "level1": {
                "level2": {"b": 3, "c": 4}
            }
        });
        let result = deep_merge(base, overlay);

        assert_eq!(result["level1"]["level2"]["a"], 1);
        assert_eq!(result["level1"]["level2"]["b"], 3);
        assert_eq!(result["level1"]["level2"]["c"], 4);
    }

    #[test]
    fn test_arrays_replace() {
        let result = deep_merge(json!({"tags": ["a", "b"]}), json!({"tags": ["x"]}));
        assert_eq!(result["tags"], json!(["x"]));
    }

    #[test]
    fn test_scalar_overlay_replaces_mapping() {
        assert_eq!(deep_merge(json!({"a": 1}), json!("flat")), json!("flat"));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&json!("8080")), "8080");
        assert_eq!(to_text(&json!(8080)), "8080");
        assert_eq!(to_text(&json!(true)), "true");
        assert_eq!(to_text(&Value::Null), "");
        assert_eq!(to_text(&json!({"a": "b"})), r#"{"a":"b"}"#);
    }

    #[test]
    fn test_property_value_accessors() {
        assert!(PropertyValue::NIL.is_nil());
        assert!(!PropertyValue::from(json!(false)).is_nil());
        assert_eq!(PropertyValue::from("x").as_str(), Some("x"));
        assert_eq!(PropertyValue::Node(NodeId(3)).as_node(), Some(NodeId(3)));
        assert_eq!(PropertyValue::Node(NodeId(3)).describe(), "config node");
    }
}
