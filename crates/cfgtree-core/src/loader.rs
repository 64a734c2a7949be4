//! Loading generic nested data into a node.
//!
//! Keys are applied in document order. Loading is fail-fast: the first
//! failing key aborts the load, keys before it stay applied and keys after
//! it are never looked at.

use serde_json::Value;
use std::sync::Arc;

use crate::error::Error;
use crate::tree::ConfigTree;
use crate::value::{describe, NodeId, PropertyValue};

impl ConfigTree {
    /// Walk `data` against the node's schema: child properties recurse into
    /// the linked node, other properties go through [`set`](Self::set), and
    /// unknown keys fail unless the schema is open.
    pub fn load_data(&mut self, node: NodeId, data: &Value) -> Result<(), Error> {
        let entries = match data {
            Value::Object(entries) => entries,
            Value::Null => return Ok(()),
            other => {
                return Err(Error::ExpectedMapping {
                    kind: self.kind(node)?.to_string(),
                    found: describe(other),
                })
            }
        };

        for (key, value) in entries {
            // Fetched per key: an unknown-key handler may have extended it.
            let schema = Arc::clone(self.schema(node)?);
            tracing::debug!(kind = %schema.kind(), node = node.index(), key = %key, "loading key");

            let Some(def) = schema.property(key) else {
                match schema.unknown_key_handler() {
                    Some(handler) => {
                        let mark = self.len();
                        if let Err(e) = handler(self, node, key, value) {
                            self.discard_unlinked(mark);
                            return Err(e);
                        }
                    }
                    None => {
                        return Err(Error::UnknownKey {
                            kind: schema.kind().to_string(),
                            key: key.clone(),
                        })
                    }
                }
                continue;
            };

            if def.is_implicit() {
                return Err(Error::ReservedProperty {
                    kind: schema.kind().to_string(),
                    property: key.clone(),
                });
            }

            if def.is_child() {
                match self.get(node, key)? {
                    PropertyValue::Node(child) => self.load_data(child, value)?,
                    _ => {
                        return Err(Error::ChildNotLinked {
                            kind: schema.kind().to_string(),
                            property: key.clone(),
                        })
                    }
                }
            } else {
                self.set(node, key, value.clone())?;
            }
        }
        Ok(())
    }
}
