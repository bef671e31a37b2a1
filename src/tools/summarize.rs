use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::llm::LlmManager;
use crate::tool::Tool;
use crate::types::{Message, ToolResponse};

const SUMMARY_PROMPT: &str = "Summarize the following text concisely, keeping the key points.";

/// Condenses long text through a model.
pub struct SummarizationTool {
    llm: LlmManager,
}

impl SummarizationTool {
    pub fn new() -> Self {
        Self {
            llm: LlmManager::new(crate::config::DEFAULT_MODEL),
        }
    }

    /// Tool backed by a specific manager instead of the default model.
    pub fn with_manager(llm: LlmManager) -> Self {
        Self { llm }
    }
}

impl Default for SummarizationTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SummarizationTool {
    fn name(&self) -> &str {
        "summarize"
    }

    fn description(&self) -> &str {
        "Summarize the provided text"
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to summarize"
                }
            },
            "required": ["text"]
        }))
    }

    fn validate_params(&self, params: &Map<String, Value>) -> bool {
        params
            .get("text")
            .and_then(Value::as_str)
            .map_or(false, |text| !text.trim().is_empty())
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<ToolResponse> {
        let Some(text) = params.get("text").and_then(Value::as_str) else {
            return Ok(ToolResponse::fail("Missing required 'text' parameter"));
        };

        let messages = [Message::user(text)];
        match self.llm.generate(&messages, Some(SUMMARY_PROMPT), &[]).await {
            Ok(completion) => Ok(ToolResponse::ok(json!({
                "summary": completion.content.trim(),
            }))),
            Err(err) => Ok(ToolResponse::fail(format!("Summarization failed: {err}"))),
        }
    }
}
