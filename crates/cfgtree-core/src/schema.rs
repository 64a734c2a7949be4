//! Property definitions and per-kind schemas.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ValidationError};
use crate::tree::ConfigTree;
use crate::validation::{NamedValidator, ValidationSpec, ValidatorRegistry, ValueType};
use crate::value::NodeId;

/// Name of the implicit back-reference property.
pub const PARENT_PROPERTY: &str = "parent";

/// Name of the implicit owned-children property.
pub const CHILDREN_PROPERTY: &str = "children";

/// Pre-processing hook applied to incoming values before validation.
pub type Munger = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Handler invoked by `load_data` for keys the schema does not declare.
/// Only schemas opened with [`Schema::open`] have one.
pub type UnknownKeyHandler =
    Arc<dyn Fn(&mut ConfigTree, NodeId, &str, &Value) -> Result<(), Error> + Send + Sync>;

/// Coarse classification of a property, independent of its validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralType {
    Scalar,
    Hash,
    Array,
    Child,
}

impl StructuralType {
    pub fn name(self) -> &'static str {
        match self {
            StructuralType::Scalar => "scalar",
            StructuralType::Hash => "hash",
            StructuralType::Array => "array",
            StructuralType::Child => "config node",
        }
    }
}

/// Declarative metadata for one property.
#[derive(Clone)]
pub struct PropertyDefinition {
    name: String,
    default: Value,
    merge_with_default: bool,
    merge_with_parent: bool,
    override_parent: Option<bool>,
    validation: Option<ValidationSpec>,
    structural_type: StructuralType,
    child_kind: Option<String>,
    munger: Option<Munger>,
    validator: Option<NamedValidator>,
    implicit: bool,
}

impl PropertyDefinition {
    fn with_type(structural_type: StructuralType) -> Self {
        Self {
            name: String::new(),
            default: Value::Null,
            merge_with_default: false,
            merge_with_parent: false,
            override_parent: None,
            validation: None,
            structural_type,
            child_kind: None,
            munger: None,
            validator: None,
            implicit: false,
        }
    }

    pub fn scalar() -> Self {
        Self::with_type(StructuralType::Scalar)
    }

    /// Mapping property; defaults to `{}` and hash validation.
    pub fn hash() -> Self {
        Self::with_type(StructuralType::Hash)
    }

    /// Sequence property; defaults to `[]` and array validation.
    pub fn array() -> Self {
        Self::with_type(StructuralType::Array)
    }

    /// Slot linking a child node. Never merged or overridden.
    pub fn child() -> Self {
        Self::with_type(StructuralType::Child)
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    /// Deep-merge every assigned value over a copy of the default.
    pub fn merge_with_default(mut self, enabled: bool) -> Self {
        self.merge_with_default = enabled;
        self
    }

    /// Combine own value with the parent's resolved value.
    pub fn merge_with_parent(mut self, enabled: bool) -> Self {
        self.merge_with_parent = enabled;
        self
    }

    /// Own value wins unless nil. Enabled unless `merge_with_parent` is set.
    pub fn override_parent(mut self, enabled: bool) -> Self {
        self.override_parent = Some(enabled);
        self
    }

    pub fn validation(mut self, spec: ValidationSpec) -> Self {
        self.validation = Some(spec);
        self
    }

    /// Kind of node to create for this child slot when the owner is
    /// created with [`ConfigTree::new_node_of_kind`].
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.child_kind = Some(kind.into());
        self
    }

    pub fn munger(mut self, munger: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.munger = Some(Arc::new(munger));
        self
    }

    /// Custom validator; replaces the default validation pipeline.
    pub fn validator(
        mut self,
        validator: impl Fn(&str, &Value) -> Result<(), ValidationError> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn merges_with_default(&self) -> bool {
        self.merge_with_default
    }

    pub fn merges_with_parent(&self) -> bool {
        self.merge_with_parent
    }

    pub fn overrides_parent(&self) -> bool {
        self.override_parent.unwrap_or(!self.merge_with_parent)
    }

    pub fn validation_spec(&self) -> Option<&ValidationSpec> {
        self.validation.as_ref()
    }

    pub fn structural_type(&self) -> StructuralType {
        self.structural_type
    }

    pub fn child_kind(&self) -> Option<&str> {
        self.child_kind.as_deref()
    }

    pub fn munger_hook(&self) -> Option<&Munger> {
        self.munger.as_ref()
    }

    pub fn validator_hook(&self) -> Option<&NamedValidator> {
        self.validator.as_ref()
    }

    pub fn is_child(&self) -> bool {
        self.structural_type == StructuralType::Child
    }

    /// True for `parent` and `children`.
    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    /// Array or hash, as indicated by the structural type or else the
    /// validation spec.
    pub(crate) fn merge_shape(&self) -> Option<ValueType> {
        match self.structural_type {
            StructuralType::Array => Some(ValueType::Array),
            StructuralType::Hash => Some(ValueType::Hash),
            _ => self
                .validation
                .as_ref()
                .and_then(ValidationSpec::implied_type)
                .filter(|t| matches!(t, ValueType::Array | ValueType::Hash)),
        }
    }

    /// `parent` is a node link; `children` is the owned node list.
    fn implicit_slot(name: &str, structural_type: StructuralType) -> Self {
        let mut def = Self::with_type(structural_type);
        def.name = name.to_string();
        def.implicit = true;
        def
    }
}

impl fmt::Debug for PropertyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDefinition")
            .field("name", &self.name)
            .field("structural_type", &self.structural_type)
            .field("default", &self.default)
            .field("merge_with_default", &self.merge_with_default)
            .field("merge_with_parent", &self.merge_with_parent)
            .field("override_parent", &self.overrides_parent())
            .field("validation", &self.validation)
            .field("child_kind", &self.child_kind)
            .field("munger", &self.munger.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Ordered mapping from property name to definition for one node kind.
///
/// Every schema carries the implicit `parent` and `children` properties.
/// A schema is closed unless opened with an unknown-key handler.
#[derive(Clone)]
pub struct Schema {
    kind: String,
    properties: Vec<PropertyDefinition>,
    index: HashMap<String, usize>,
    unknown_key_handler: Option<UnknownKeyHandler>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Schema {
    pub fn new(kind: impl Into<String>) -> Self {
        let mut schema = Self {
            kind: kind.into(),
            properties: Vec::new(),
            index: HashMap::new(),
            unknown_key_handler: None,
        };
        schema.push(PropertyDefinition::implicit_slot(
            PARENT_PROPERTY,
            StructuralType::Child,
        ));
        schema.push(PropertyDefinition::implicit_slot(
            CHILDREN_PROPERTY,
            StructuralType::Array,
        ));
        schema
    }

    fn push(&mut self, def: PropertyDefinition) {
        self.index.insert(def.name.clone(), self.properties.len());
        self.properties.push(def);
    }

    /// Declare a property, normalising hash/array defaults and validation.
    pub fn declare_property(
        &mut self,
        name: impl Into<String>,
        mut definition: PropertyDefinition,
    ) -> Result<(), Error> {
        let name = name.into();
        if self.contains(&name) {
            return Err(Error::DuplicateProperty {
                kind: self.kind.clone(),
                property: name,
            });
        }

        let invalid = |reason: &str| Error::InvalidDefinition {
            kind: self.kind.clone(),
            property: name.clone(),
            reason: reason.to_string(),
        };

        if definition.merge_with_parent && definition.override_parent == Some(true) {
            return Err(invalid(
                "properties can't be both merge_with_parent and override_parent",
            ));
        }

        if definition.child_kind.is_some() && definition.structural_type != StructuralType::Child {
            return Err(invalid("only child properties can name a node kind"));
        }

        match definition.structural_type {
            StructuralType::Hash => {
                if definition.default.is_null() {
                    definition.default = Value::Object(Default::default());
                }
                if !definition.default.is_object() {
                    return Err(invalid("hash properties can only have mapping defaults"));
                }
                if definition.validation.is_none() {
                    definition.validation = Some(ValidationSpec::Type(ValueType::Hash));
                }
            }
            StructuralType::Array => {
                if definition.default.is_null() {
                    definition.default = Value::Array(Vec::new());
                }
                if !definition.default.is_array() {
                    return Err(invalid("array properties can only have sequence defaults"));
                }
                if definition.validation.is_none() {
                    definition.validation = Some(ValidationSpec::Type(ValueType::Array));
                }
            }
            StructuralType::Child => {
                if !definition.default.is_null() {
                    return Err(invalid("child properties cannot have a data default"));
                }
            }
            StructuralType::Scalar => {}
        }

        definition.name = name;
        definition.implicit = false;
        self.push(definition);
        Ok(())
    }

    /// Chaining form of [`declare_property`](Self::declare_property).
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        definition: PropertyDefinition,
    ) -> Result<Self, Error> {
        self.declare_property(name, definition)?;
        Ok(self)
    }

    /// New schema version with one more property; `self` is untouched.
    pub fn extend(
        &self,
        name: impl Into<String>,
        definition: PropertyDefinition,
    ) -> Result<Schema, Error> {
        let name = name.into();
        let mut extended = self.clone();
        extended.declare_property(name.clone(), definition)?;
        tracing::debug!(kind = %self.kind, property = %name, "extended schema");
        Ok(extended)
    }

    /// Open the schema: unknown keys met by `load_data` go to `handler`
    /// instead of failing.
    pub fn open(
        mut self,
        handler: impl Fn(&mut ConfigTree, NodeId, &str, &Value) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.unknown_key_handler = Some(Arc::new(handler));
        self
    }

    pub fn is_open(&self) -> bool {
        self.unknown_key_handler.is_some()
    }

    pub fn unknown_key_handler(&self) -> Option<&UnknownKeyHandler> {
        self.unknown_key_handler.as_ref()
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.index.get(name).map(|&i| &self.properties[i])
    }

    /// Looks up a property or fails with `UnknownProperty`.
    pub fn require(&self, name: &str) -> Result<&PropertyDefinition, Error> {
        self.property(name).ok_or_else(|| Error::UnknownProperty {
            kind: self.kind.clone(),
            property: name.to_string(),
        })
    }

    /// Declared properties in declaration order, without `parent`/`children`.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.iter().filter(|p| !p.implicit)
    }

    /// All properties including the implicit ones.
    pub(crate) fn all_properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.iter()
    }

    pub fn default_value(&self, name: &str) -> Result<&Value, Error> {
        self.require(name).map(PropertyDefinition::default_value)
    }
}

/// Schemas keyed by node kind plus the named validator table.
///
/// Built once at startup and shared by every tree created from it.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
    validators: ValidatorRegistry,
}

impl SchemaRegistry {
    /// Registry with the built-in named validators and no schemas.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Schema) -> Result<Arc<Schema>, Error> {
        if self.schemas.contains_key(schema.kind()) {
            return Err(Error::DuplicateKind(schema.kind().to_string()));
        }
        let schema = Arc::new(schema);
        self.schemas
            .insert(schema.kind().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn schema(&self, kind: &str) -> Result<&Arc<Schema>, Error> {
        self.schemas
            .get(kind)
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }

    pub fn register_validator(
        &mut self,
        name: impl Into<String>,
        validator: impl Fn(&str, &Value) -> Result<(), ValidationError> + Send + Sync + 'static,
    ) {
        self.validators.register(name, validator);
    }

    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }
}
