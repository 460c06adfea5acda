//! Tool definition value object reported by a server's tool listing.

use super::{ToolRegistryDomainError, server::normalize_capabilities};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata for a tool exposed by a tool-provider server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    name: String,
    description: String,
    input_schema: Value,
    output_schema: Option<Value>,
    capabilities: Vec<String>,
}

impl ToolDefinition {
    /// Creates a tool definition with required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyToolName`] when the name is
    /// empty.
    pub fn new(
        name: impl Into<String>,
        input_schema: Value,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ToolRegistryDomainError::EmptyToolName);
        }

        Ok(Self {
            name: normalized_name,
            description: String::new(),
            input_schema,
            output_schema: None,
            capabilities: Vec::new(),
        })
    }

    /// Sets a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into().trim().to_owned();
        self
    }

    /// Sets an optional output schema.
    #[must_use]
    pub fn with_output_schema(mut self, output_schema: Value) -> Self {
        self.output_schema = Some(output_schema);
        self
    }

    /// Sets capability tags.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyCapability`] for blank tags.
    pub fn with_capabilities(
        mut self,
        capabilities: impl IntoIterator<Item = String>,
    ) -> Result<Self, ToolRegistryDomainError> {
        self.capabilities = normalize_capabilities(capabilities)?;
        Ok(self)
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Returns the optional output schema.
    #[must_use]
    pub const fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }

    /// Returns capability tags.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }
}
