//! Capability registry.
//!
//! The registry is the static table of tools, resources and prompt templates
//! advertised to callers. Each entry is a [`CapabilityDescriptor`] carrying a
//! restricted JSON Schema ([`InputSchema`]) that describes its arguments.
//!
//! Names are scoped per [`CapabilityKind`], so a tool and a prompt may share a
//! name without colliding. Lookup is a single hash probe. Lists come back in
//! registration order.
//!
//! The table is populated at startup and read for the rest of the process
//! lifetime. Every registration bumps [`Registry::generation`], which lets
//! derived data (such as converted call schemas) detect staleness.

pub mod validate;

pub use validate::{validate_arguments, FieldError, ValidationReport};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The three families of capability a server can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    /// An invocable function.
    Tool,
    /// A readable document addressed by URI.
    Resource,
    /// A parameterised message template.
    Prompt,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => f.write_str("tool"),
            Self::Resource => f.write_str("resource"),
            Self::Prompt => f.write_str("prompt"),
        }
    }
}

/// Declared type of a single schema property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// UTF-8 string. Properties without a declared type are strings.
    #[default]
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Floating point number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// JSON array, passed through after a type check.
    Array,
    /// JSON object, passed through after a type check.
    Object,
}

impl SchemaType {
    /// The JSON Schema keyword for this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Schema for one named argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// Declared type.
    #[serde(rename = "type", default)]
    pub kind: SchemaType,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Closed set of accepted values, compared after coercion.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    /// Value used when the argument is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PropertySchema {
    /// Creates a property of the given type.
    #[must_use]
    pub fn new(kind: SchemaType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: Some(description.into()),
            allowed: None,
            default: None,
        }
    }

    /// Creates a string property.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self::new(SchemaType::String, description)
    }

    /// Creates an integer property.
    #[must_use]
    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(SchemaType::Integer, description)
    }

    /// Creates a number property.
    #[must_use]
    pub fn number(description: impl Into<String>) -> Self {
        Self::new(SchemaType::Number, description)
    }

    /// Creates a boolean property.
    #[must_use]
    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(SchemaType::Boolean, description)
    }

    /// Creates an array property.
    #[must_use]
    pub fn array(description: impl Into<String>) -> Self {
        Self::new(SchemaType::Array, description)
    }

    /// Restricts the property to a closed set of string values.
    #[must_use]
    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(|v| Value::String(v.into())).collect());
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Restricted JSON Schema describing a capability's arguments.
///
/// Always an object schema. Schemas are open: arguments not listed in
/// `properties` are accepted and passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Always `"object"`.
    #[serde(rename = "type", default = "object_type")]
    pub kind: String,

    /// Declared arguments, in declaration order.
    #[serde(default)]
    pub properties: IndexMap<String, PropertySchema>,

    /// Names of arguments that must be present.
    #[serde(default)]
    pub required: Vec<String>,
}

fn object_type() -> String {
    "object".to_string()
}

impl Default for InputSchema {
    fn default() -> Self {
        Self::object()
    }
}

impl InputSchema {
    /// Creates an empty object schema.
    #[must_use]
    pub fn object() -> Self {
        Self {
            kind: object_type(),
            properties: IndexMap::new(),
            required: Vec::new(),
        }
    }

    /// Adds a required argument.
    #[must_use]
    pub fn required_property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    /// Adds an optional argument.
    #[must_use]
    pub fn optional_property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Returns `true` if `name` must be supplied.
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Serialises the schema to its JSON form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({"type": "object"}))
    }
}

/// A named, schema-described capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    /// Unique name within its kind. For resources this is the URI.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Capability family.
    pub kind: CapabilityKind,
    /// Argument schema.
    pub input_schema: InputSchema,
    /// Display title (resources only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// MIME type of the content (resources only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Whether invocations may run as tracked background operations.
    #[serde(skip)]
    pub supports_async: bool,
}

impl CapabilityDescriptor {
    /// Describes a tool.
    #[must_use]
    pub fn tool(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: CapabilityKind::Tool,
            input_schema,
            title: None,
            mime_type: None,
            supports_async: true,
        }
    }

    /// Describes a resource.
    #[must_use]
    pub fn resource(
        uri: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            name: uri.into(),
            description: description.into(),
            kind: CapabilityKind::Resource,
            input_schema: InputSchema::object(),
            title: Some(title.into()),
            mime_type: Some(mime_type.into()),
            supports_async: false,
        }
    }

    /// Describes a prompt template.
    #[must_use]
    pub fn prompt(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: CapabilityKind::Prompt,
            input_schema,
            title: None,
            mime_type: None,
            supports_async: false,
        }
    }

    /// Marks the capability as synchronous-only.
    #[must_use]
    pub const fn synchronous_only(mut self) -> Self {
        self.supports_async = false;
        self
    }

    /// Renders the entry the way the matching `*/list` method reports it.
    #[must_use]
    pub fn listing(&self) -> Value {
        match self.kind {
            CapabilityKind::Tool => json!({
                "name": self.name,
                "description": self.description,
                "inputSchema": self.input_schema.to_value(),
            }),
            CapabilityKind::Resource => json!({
                "uri": self.name,
                "name": self.title.as_deref().unwrap_or(&self.name),
                "description": self.description,
                "mimeType": self.mime_type,
            }),
            CapabilityKind::Prompt => {
                let arguments: Vec<Value> = self
                    .input_schema
                    .properties
                    .iter()
                    .map(|(name, prop)| {
                        json!({
                            "name": name,
                            "description": prop.description,
                            "required": self.input_schema.is_required(name),
                        })
                    })
                    .collect();
                json!({
                    "name": self.name,
                    "description": self.description,
                    "arguments": arguments,
                })
            }
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    tools: IndexMap<String, Arc<CapabilityDescriptor>>,
    resources: IndexMap<String, Arc<CapabilityDescriptor>>,
    prompts: IndexMap<String, Arc<CapabilityDescriptor>>,
}

impl Tables {
    const fn table(&self, kind: CapabilityKind) -> &IndexMap<String, Arc<CapabilityDescriptor>> {
        match kind {
            CapabilityKind::Tool => &self.tools,
            CapabilityKind::Resource => &self.resources,
            CapabilityKind::Prompt => &self.prompts,
        }
    }

    fn table_mut(
        &mut self,
        kind: CapabilityKind,
    ) -> &mut IndexMap<String, Arc<CapabilityDescriptor>> {
        match kind {
            CapabilityKind::Tool => &mut self.tools,
            CapabilityKind::Resource => &mut self.resources,
            CapabilityKind::Prompt => &mut self.prompts,
        }
    }
}

/// Table of advertised capabilities.
#[derive(Debug, Default)]
pub struct Registry {
    tables: RwLock<Tables>,
    generation: AtomicU64,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a descriptor. Returns the previous entry of the same
    /// kind and name, if any.
    pub fn register(&self, descriptor: CapabilityDescriptor) -> Option<Arc<CapabilityDescriptor>> {
        let kind = descriptor.kind;
        let name = descriptor.name.clone();
        let previous = {
            let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
            tables.table_mut(kind).insert(name.clone(), Arc::new(descriptor))
        };
        self.generation.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%kind, %name, replaced = previous.is_some(), "Registered capability");
        previous
    }

    /// Lists every descriptor of one kind, in registration order.
    #[must_use]
    pub fn list(&self, kind: CapabilityKind) -> Vec<Arc<CapabilityDescriptor>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.table(kind).values().cloned().collect()
    }

    /// Looks up a descriptor by kind and name.
    #[must_use]
    pub fn get(&self, kind: CapabilityKind, name: &str) -> Option<Arc<CapabilityDescriptor>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.table(kind).get(name).cloned()
    }

    /// Number of descriptors of one kind.
    #[must_use]
    pub fn count(&self, kind: CapabilityKind) -> usize {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.table(kind).len()
    }

    /// Monotonic counter bumped on every registration.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
