use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ToolError;
use crate::models::tool::{Tool, ToolCall};
use crate::schema::{ArgumentSchema, Arguments};

/// Static description of a tool: what the model sees plus how risky it is
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub schema: ArgumentSchema,
    /// Whether running the tool can change anything outside the conversation
    pub side_effecting: bool,
}

impl ToolDefinition {
    pub fn new<N, D>(name: N, description: D, schema: ArgumentSchema, side_effecting: bool) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            side_effecting,
        }
    }

    /// The capability entry advertised to the model
    pub fn capability(&self) -> Tool {
        Tool::new(&self.name, &self.description, self.schema.to_json_schema())
    }
}

/// A tool implementation. Handlers own their safety checks.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    /// Run the tool with validated arguments, producing text for the model
    async fn call(&self, args: Arguments) -> Result<String, ToolError>;
}

/// The fixed set of tools available to an agent, built once at startup
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder {
            registry: ToolRegistry {
                handlers: Vec::new(),
                by_name: HashMap::new(),
            },
        }
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.handler(name).map(|handler| handler.definition())
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.handlers.iter().map(|handler| handler.definition())
    }

    /// Capability list in registration order
    pub fn capabilities(&self) -> Vec<Tool> {
        self.definitions().map(ToolDefinition::capability).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn handler(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.by_name.get(name).map(|&index| &self.handlers[index])
    }

    /// Validate and run a tool call.
    ///
    /// Lookup and validation failures are returned as errors; failures inside the handler
    /// become `Ok` text prefixed with the error marker so the conversation can continue.
    pub async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let handler = self
            .handler(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        let definition = handler.definition();
        let args = definition
            .schema
            .validate(&call.arguments)
            .map_err(|violations| ToolError::InvalidArguments {
                tool: definition.name.clone(),
                violations,
            })?;

        match handler.call(args).await {
            Ok(output) => Ok(output),
            Err(error) => {
                tracing::warn!(tool = %definition.name, call_id = %call.id, %error, "tool call failed");
                Ok(error.to_tool_output())
            }
        }
    }
}

pub struct ToolRegistryBuilder {
    registry: ToolRegistry,
}

impl ToolRegistryBuilder {
    pub fn register<H: ToolHandler + 'static>(self, handler: H) -> Result<Self, ToolError> {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(mut self, handler: Arc<dyn ToolHandler>) -> Result<Self, ToolError> {
        let name = handler.definition().name.clone();
        if self.registry.by_name.contains_key(&name) {
            return Err(ToolError::DuplicateToolName(name));
        }
        self.registry
            .by_name
            .insert(name, self.registry.handlers.len());
        self.registry.handlers.push(handler);
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        self.registry
    }
}
