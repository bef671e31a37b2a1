use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::knowledge::KnowledgeBase;
use crate::tool::Tool;
use crate::types::ToolResponse;

/// Exposes a knowledge base as a callable tool.
pub struct RetrievalTool {
    knowledge: Arc<dyn KnowledgeBase>,
}

impl RetrievalTool {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        "knowledge_search"
    }

    fn description(&self) -> &str {
        "Query the knowledge base for information"
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look up"
                }
            },
            "required": ["query"]
        }))
    }

    // A lookup with no query returns nothing useful rather than failing.
    fn validate_params(&self, _params: &Map<String, Value>) -> bool {
        true
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<ToolResponse> {
        let query = params.get("query").and_then(Value::as_str).unwrap_or_default();
        match self.knowledge.query(query).await {
            Ok(snippets) => Ok(ToolResponse::ok(json!(snippets))),
            Err(err) => Ok(ToolResponse::fail(err.to_string())),
        }
    }
}
