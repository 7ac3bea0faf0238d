//! Schema types and builders for tfplug
//!
//! This module provides the schema system for defining provider, resource and
//! data source schemas, including attribute types, nested attributes and the
//! hooks (validators, plan modifiers, defaults) attached to attributes.

use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use std::collections::HashMap;
use std::sync::Arc;

/// AttributeType defines the type system for Terraform attributes
/// This must match Terraform's type system exactly
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    String,
    Number, // Always f64
    Bool,
    List(Box<AttributeType>),               // Ordered, allows duplicates
    Set(Box<AttributeType>),                // Unordered, no duplicates
    Map(Box<AttributeType>),                // String keys only
    Object(HashMap<String, AttributeType>), // Fixed structure
}

impl AttributeType {
    pub fn list(element: AttributeType) -> Self {
        AttributeType::List(Box::new(element))
    }

    pub fn set(element: AttributeType) -> Self {
        AttributeType::Set(Box::new(element))
    }

    pub fn map(element: AttributeType) -> Self {
        AttributeType::Map(Box::new(element))
    }

    /// The cty JSON type expression Terraform expects in schema responses
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        match self {
            AttributeType::String => json!("string"),
            AttributeType::Number => json!("number"),
            AttributeType::Bool => json!("bool"),
            AttributeType::List(element) => json!(["list", element.to_json()]),
            AttributeType::Set(element) => json!(["set", element.to_json()]),
            AttributeType::Map(element) => json!(["map", element.to_json()]),
            AttributeType::Object(fields) => {
                let fields: serde_json::Map<String, serde_json::Value> = fields
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.to_json()))
                    .collect();
                json!(["object", fields])
            }
        }
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }

    /// Shapes a value to this type: objects get every declared attribute
    /// (missing ones as null) and lose undeclared ones
    pub fn normalize(&self, value: Dynamic) -> Dynamic {
        match (self, value) {
            (_, Dynamic::Null) => Dynamic::Null,
            (_, Dynamic::Unknown) => Dynamic::Unknown,
            (AttributeType::Object(fields), Dynamic::Map(mut entries)) => Dynamic::Map(
                fields
                    .iter()
                    .map(|(name, ty)| {
                        let value = entries.remove(name).unwrap_or(Dynamic::Null);
                        (name.clone(), ty.normalize(value))
                    })
                    .collect(),
            ),
            (AttributeType::List(element) | AttributeType::Set(element), Dynamic::List(items)) => {
                Dynamic::List(items.into_iter().map(|i| element.normalize(i)).collect())
            }
            (AttributeType::Map(element), Dynamic::Map(entries)) => Dynamic::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, element.normalize(v)))
                    .collect(),
            ),
            (_, value) => value,
        }
    }
}

/// Schema is returned by providers/resources/data sources
/// Version is used for state migration
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: i64, // Increment when schema changes require migration
    pub block: Block, // Root block containing all attributes
}

impl Schema {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.attributes.iter().find(|a| a.name == name)
    }

    /// Fills missing attributes with null and drops unknown ones, recursively
    pub fn normalize(&self, value: DynamicValue) -> DynamicValue {
        DynamicValue::new(self.block.object_type().normalize(value.value))
    }

    /// Runs every attribute validator against the configuration
    pub fn validate(&self, config: &DynamicValue) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        validate_attributes(
            &self.block.attributes,
            &config.value,
            &AttributePath::root(),
            &mut diagnostics,
        );
        diagnostics
    }

    /// Marks computed attributes without configuration as unknown in the plan,
    /// descending into nested attributes
    pub fn mark_computed_unknown(&self, config: &DynamicValue, planned: &mut DynamicValue) {
        mark_computed_unknown(&self.block.attributes, &config.value, &mut planned.value);
    }
}

/// Block represents the root configuration block
#[derive(Debug, Clone)]
pub struct Block {
    pub version: i64,
    pub attributes: Vec<Attribute>,
    pub description: String,
    pub description_kind: StringKind,
    pub deprecated: bool,
}

impl Block {
    pub fn object_type(&self) -> AttributeType {
        object_type(&self.attributes)
    }
}

fn object_type(attributes: &[Attribute]) -> AttributeType {
    AttributeType::Object(
        attributes
            .iter()
            .map(|a| (a.name.clone(), a.value_type()))
            .collect(),
    )
}

/// Attribute represents a single configuration attribute
#[derive(Clone)]
pub struct Attribute {
    pub name: String,
    pub r#type: AttributeType,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub validators: Vec<Arc<dyn Validator>>,
    pub plan_modifiers: Vec<Arc<dyn PlanModifier>>,
    pub default: Option<Arc<dyn AttributeDefault>>,
    pub nested_type: Option<NestedType>,
    pub deprecated: bool,
}

impl Attribute {
    /// The value type of the attribute, derived from nested attributes when present
    pub fn value_type(&self) -> AttributeType {
        match &self.nested_type {
            None => self.r#type.clone(),
            Some(nested) => {
                let object = object_type(&nested.attributes);
                match nested.nesting {
                    ObjectNestingMode::Single => object,
                    ObjectNestingMode::List => AttributeType::list(object),
                    ObjectNestingMode::Set => AttributeType::set(object),
                    ObjectNestingMode::Map => AttributeType::map(object),
                }
            }
        }
    }
}

// Manual Debug implementation since validators/modifiers don't implement Debug
impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("sensitive", &self.sensitive)
            .field(
                "validators",
                &format!("{} validators", self.validators.len()),
            )
            .field(
                "plan_modifiers",
                &format!("{} plan modifiers", self.plan_modifiers.len()),
            )
            .field("default", &self.default.is_some())
            .field("nested_type", &self.nested_type)
            .finish()
    }
}

/// NestedType for attributes with nested structures
#[derive(Debug, Clone)]
pub struct NestedType {
    pub attributes: Vec<Attribute>,
    pub nesting: ObjectNestingMode,
}

/// ObjectNestingMode for nested attribute objects
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectNestingMode {
    Single,
    List,
    Set,
    Map,
}

/// StringKind represents the format of string values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StringKind {
    Plain,
    Markdown,
}

/// Validator checks a configured attribute value
/// Validators are never called with null or unknown values
pub trait Validator: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Perform validation
    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse;
}

/// Request for validators
pub struct ValidatorRequest {
    pub config_value: Dynamic,
    pub path: AttributePath,
}

/// Response from validators
#[derive(Default)]
pub struct ValidatorResponse {
    pub diagnostics: Vec<Diagnostic>,
}

/// PlanModifier modifies planned values during planning
/// Common uses: RequiresReplace, UseStateForUnknown
pub trait PlanModifier: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Modify the planned value
    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse;
}

/// Request for plan modifiers, state_value is null while creating
pub struct PlanModifierRequest {
    pub config_value: Dynamic,
    pub state_value: Dynamic,
    pub plan_value: Dynamic,
    pub path: AttributePath,
}

/// Response from plan modifiers
pub struct PlanModifierResponse {
    pub plan_value: Dynamic,
    pub requires_replace: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanModifierResponse {
    pub fn unchanged(request: PlanModifierRequest) -> Self {
        Self {
            plan_value: request.plan_value,
            requires_replace: false,
            diagnostics: Vec::new(),
        }
    }
}

/// AttributeDefault provides the planned value of an optional attribute
/// that is absent from configuration
pub trait AttributeDefault: Send + Sync {
    /// Human-readable description
    fn description(&self) -> String;
    /// Provide default value
    fn default_value(&self, request: DefaultRequest) -> DefaultResponse;
}

/// Request for default values
pub struct DefaultRequest {
    pub path: AttributePath,
}

/// Response with default value
pub struct DefaultResponse {
    pub value: Dynamic,
}

fn validate_attributes(
    attributes: &[Attribute],
    config: &Dynamic,
    base: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(entries) = config.as_map() else {
        return;
    };

    for attr in attributes {
        let value = entries.get(&attr.name).unwrap_or(&Dynamic::Null);
        let path = base.clone().attribute(&attr.name);

        if value.is_null() || value.is_unknown() {
            continue;
        }

        for validator in &attr.validators {
            let response = validator.validate(ValidatorRequest {
                config_value: value.clone(),
                path: path.clone(),
            });
            diagnostics.extend(response.diagnostics);
        }

        if let Some(nested) = &attr.nested_type {
            match (nested.nesting, value) {
                (ObjectNestingMode::Single, _) => {
                    validate_attributes(&nested.attributes, value, &path, diagnostics)
                }
                (ObjectNestingMode::List | ObjectNestingMode::Set, Dynamic::List(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        let item_path = path.clone().index(i as i64);
                        validate_attributes(&nested.attributes, item, &item_path, diagnostics);
                    }
                }
                (ObjectNestingMode::Map, Dynamic::Map(items)) => {
                    for (key, item) in items {
                        let item_path = path.clone().key(key);
                        validate_attributes(&nested.attributes, item, &item_path, diagnostics);
                    }
                }
                _ => {}
            }
        }
    }
}

fn mark_computed_unknown(attributes: &[Attribute], config: &Dynamic, planned: &mut Dynamic) {
    let Dynamic::Map(planned_entries) = planned else {
        return;
    };

    for attr in attributes {
        let config_value = config
            .as_map()
            .and_then(|m| m.get(&attr.name))
            .unwrap_or(&Dynamic::Null);

        if attr.computed && config_value.is_null() {
            planned_entries.insert(attr.name.clone(), Dynamic::Unknown);
            continue;
        }

        let (Some(nested), Some(planned_value)) =
            (&attr.nested_type, planned_entries.get_mut(&attr.name))
        else {
            continue;
        };

        match (nested.nesting, planned_value) {
            (ObjectNestingMode::Single, value) => {
                mark_computed_unknown(&nested.attributes, config_value, value)
            }
            (ObjectNestingMode::List | ObjectNestingMode::Set, Dynamic::List(items)) => {
                let config_items = config_value.as_list().unwrap_or(&[]);
                for (i, item) in items.iter_mut().enumerate() {
                    let item_config = config_items.get(i).unwrap_or(&Dynamic::Null);
                    mark_computed_unknown(&nested.attributes, item_config, item);
                }
            }
            (ObjectNestingMode::Map, Dynamic::Map(items)) => {
                for (key, item) in items.iter_mut() {
                    let item_config = config_value
                        .as_map()
                        .and_then(|m| m.get(key))
                        .unwrap_or(&Dynamic::Null);
                    mark_computed_unknown(&nested.attributes, item_config, item);
                }
            }
            _ => {}
        }
    }
}

/// AttributeBuilder provides fluent API for building attributes
/// ALWAYS use this instead of constructing Attribute directly
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    /// Create a new attribute builder
    pub fn new(name: &str, type_: AttributeType) -> Self {
        Self {
            attribute: Attribute {
                name: name.to_string(),
                r#type: type_,
                description: String::new(),
                required: false,
                optional: false,
                computed: false,
                sensitive: false,
                validators: Vec::new(),
                plan_modifiers: Vec::new(),
                default: None,
                nested_type: None,
                deprecated: false,
            },
        }
    }

    /// Create an attribute whose value is made of nested attributes
    pub fn nested(name: &str, nesting: ObjectNestingMode, attributes: Vec<Attribute>) -> Self {
        let mut builder = Self::new(name, AttributeType::String);
        builder.attribute.nested_type = Some(NestedType {
            attributes,
            nesting,
        });
        builder.attribute.r#type = builder.attribute.value_type();
        builder
    }

    /// Set description
    pub fn description(mut self, desc: &str) -> Self {
        self.attribute.description = desc.to_string();
        self
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.attribute.required = true;
        self.attribute.optional = false;
        self
    }

    /// Mark as optional
    pub fn optional(mut self) -> Self {
        self.attribute.optional = true;
        self.attribute.required = false;
        self
    }

    /// Mark as computed
    pub fn computed(mut self) -> Self {
        self.attribute.computed = true;
        self
    }

    /// Mark as sensitive (hidden)
    pub fn sensitive(mut self) -> Self {
        self.attribute.sensitive = true;
        self
    }

    /// Mark as deprecated
    pub fn deprecated(mut self) -> Self {
        self.attribute.deprecated = true;
        self
    }

    /// Add validator
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.attribute.validators.push(Arc::new(validator));
        self
    }

    /// Add plan modifier
    pub fn plan_modifier(mut self, modifier: impl PlanModifier + 'static) -> Self {
        self.attribute.plan_modifiers.push(Arc::new(modifier));
        self
    }

    /// Set default
    pub fn default(mut self, default: impl AttributeDefault + 'static) -> Self {
        self.attribute.default = Some(Arc::new(default));
        self
    }

    /// Finalize the attribute
    pub fn build(self) -> Attribute {
        self.attribute
    }
}

/// SchemaBuilder provides fluent API for building schemas
/// ALWAYS use this for consistency
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Create a new schema builder
    pub fn new() -> Self {
        Self {
            schema: Schema {
                version: 0,
                block: Block {
                    version: 0,
                    attributes: Vec::new(),
                    description: String::new(),
                    description_kind: StringKind::Plain,
                    deprecated: false,
                },
            },
        }
    }

    /// Set schema version
    pub fn version(mut self, version: i64) -> Self {
        self.schema.version = version;
        self.schema.block.version = version;
        self
    }

    /// Add attribute
    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.schema.block.attributes.push(attr);
        self
    }

    /// Set description
    pub fn description(mut self, desc: &str) -> Self {
        self.schema.block.description = desc.to_string();
        self
    }

    /// Set description kind
    pub fn description_kind(mut self, kind: StringKind) -> Self {
        self.schema.block.description_kind = kind;
        self
    }

    /// Mark as deprecated
    pub fn deprecated(mut self) -> Self {
        self.schema.block.deprecated = true;
        self
    }

    /// Finalize the schema
    pub fn build(self) -> Schema {
        self.schema
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
