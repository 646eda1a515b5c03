//! Tool definitions and the discovered tool set of a connection.

use super::ConnectionDomainError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Metadata for a tool exposed by a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    name: String,
    description: Option<String>,
    input_schema: Value,
}

impl ToolDefinition {
    /// Creates a tool definition with a permissive object schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionDomainError::EmptyToolName`] when `name` is blank.
    pub fn new(name: impl Into<String>) -> Result<Self, ConnectionDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ConnectionDomainError::EmptyToolName);
        }

        Ok(Self {
            name: normalized_name,
            description: None,
            input_schema: json!({"type": "object"}),
        })
    }

    /// Sets the description. Blank descriptions are dropped.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let normalized = description.into().trim().to_owned();
        self.description = (!normalized.is_empty()).then_some(normalized);
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, input_schema: Value) -> Self {
        self.input_schema = input_schema;
        self
    }

    /// Builds a definition from one entry of a `tools/list` result.
    ///
    /// Accepts both `inputSchema` and `input_schema` spellings. Returns
    /// `None` for entries without a usable name.
    #[must_use]
    pub fn from_listing(entry: &Value) -> Option<Self> {
        let name = entry.get("name").and_then(Value::as_str)?;
        let mut definition = Self::new(name).ok()?;
        if let Some(description) = entry.get("description").and_then(Value::as_str) {
            definition = definition.with_description(description);
        }
        if let Some(schema) = entry
            .get("inputSchema")
            .or_else(|| entry.get("input_schema"))
        {
            definition = definition.with_input_schema(schema.clone());
        }
        Some(definition)
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

/// Tools known for a connection, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolSet(BTreeMap<String, ToolDefinition>);

impl ToolSet {
    /// Creates an empty tool set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts or replaces a tool.
    pub fn insert(&mut self, tool: ToolDefinition) {
        self.0.insert(tool.name().to_owned(), tool);
    }

    /// Returns whether a tool with `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Returns the tool with `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.0.get(name)
    }

    /// Returns tool names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Returns the number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over tool definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.0.values()
    }
}

impl FromIterator<ToolDefinition> for ToolSet {
    fn from_iter<I: IntoIterator<Item = ToolDefinition>>(iter: I) -> Self {
        let mut set = Self::new();
        for tool in iter {
            set.insert(tool);
        }
        set
    }
}

/// How a connection's tool set was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum DiscoveryStatus {
    /// Live enumeration over the session succeeded.
    Live,
    /// Live enumeration failed; tools came from the known-schema registry.
    KnownSchema {
        /// Why live enumeration failed.
        reason: String,
    },
    /// Live enumeration failed and no fallback schemas were available.
    Degraded {
        /// Why live enumeration failed.
        reason: String,
    },
}

impl DiscoveryStatus {
    /// Returns whether live discovery failed.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        !matches!(self, Self::Live)
    }
}
