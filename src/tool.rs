use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{HarrierError, Result};
use crate::types::{ToolCall, ToolResponse};

/// Wire-level description of a tool, handed to providers that accept
/// structured tool definitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the accepted parameters, advertised to providers
    /// with structured tool calling.
    fn parameters(&self) -> Option<Value> {
        None
    }

    /// Structural check run before execution. Calls that fail validation
    /// are dropped without being executed.
    fn validate_params(&self, params: &Map<String, Value>) -> bool;

    async fn execute(&self, params: Map<String, Value>) -> Result<ToolResponse>;
}

/// Tools keyed by name. Lookup is the only dispatch mechanism, so an
/// unknown name is a plain map miss.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_shared(Arc::new(tool));
    }

    /// Registers an already shared tool. Re-registering a name replaces
    /// the tool but keeps its position in listings.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Schemas for every registered tool, in registration order.
    pub fn describe(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Executes one call, wrapping tool failures with the tool name.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResponse> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| HarrierError::ToolNotFound(call.name.clone()))?;
        tool.execute(call.parameters.clone())
            .await
            .map_err(|source| HarrierError::ToolInvocation {
                name: call.name.clone(),
                source: Box::new(source),
            })
    }
}
