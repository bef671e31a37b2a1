use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::config::{AppConfig, DEFAULT_MODEL};
use crate::error::Result;
use crate::knowledge::KnowledgeBase;
use crate::llm::{provider_from_config, LlmManager, Provider};
use crate::memory::{InMemoryStore, MemoryConfig, MemoryManager, MemoryStore};
use crate::tool::{Tool, ToolRegistry};
use crate::types::{AgentResponse, Message, ToolCall};

const ERROR_REPLY: &str = "I encountered an error processing your message. Please try again.";
const FOLLOW_UP_PROMPT: &str =
    "Review the tool results and provide a follow-up response if needed.";

fn default_instructions(name: &str) -> String {
    format!(
        "You are {name}, an AI assistant that helps users with their tasks.\n\
         You have access to various tools and knowledge sources that you can use to help users.\n\
         When using tools, format your response with clear tool calls using the specified JSON format."
    )
}

/// Everything needed to assemble an [`Agent`]. Fields are plain data so a
/// config can be filled in, inspected, or derived from settings before the
/// single [`build`](AgentConfig::build) call.
pub struct AgentConfig {
    pub name: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub provider: Option<Arc<dyn Provider>>,
    pub instructions: Option<String>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub knowledge: Option<Arc<dyn KnowledgeBase>>,
    pub memory: MemoryConfig,
    pub memory_store: Option<Arc<dyn MemoryStore>>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            provider: None,
            instructions: None,
            tools: Vec::new(),
            knowledge: None,
            memory: MemoryConfig::default(),
            memory_store: None,
        }
    }

    /// Config seeded from application settings. Tools and knowledge are
    /// still attached by the caller.
    pub fn from_app_config(app: &AppConfig) -> Self {
        let mut config = Self::new(app.agent.name.clone());
        config.model = app.model.model.clone();
        config.temperature = app.model.temperature;
        config.instructions = app.agent.instructions.clone();
        config.memory = app.memory.clone();
        config.provider = Some(provider_from_config(&app.model));
        config
    }

    pub fn build(self) -> Agent {
        let llm = match self.provider {
            Some(provider) => LlmManager::with_provider(self.model, provider),
            None => LlmManager::new(self.model),
        };
        let llm = match self.temperature {
            Some(temperature) => llm.with_temperature(temperature),
            None => llm,
        };

        let store = self.memory_store.unwrap_or_else(|| {
            Arc::new(InMemoryStore::new().with_retention_days(self.memory.retention_days))
        });
        let memory = MemoryManager::new(store, self.memory);

        let mut tools = ToolRegistry::new();
        for tool in self.tools {
            tools.register_shared(tool);
        }

        let instructions = self
            .instructions
            .unwrap_or_else(|| default_instructions(&self.name));

        Agent {
            name: self.name,
            instructions,
            llm,
            tools,
            knowledge: self.knowledge,
            memory,
            tool_call_re: Regex::new(r"(?s)<tool_call>(.*?)</tool_call>")
                .expect("valid tool call pattern"),
        }
    }
}

/// A conversational agent: one model, a fixed tool set, interaction
/// memory, and optional knowledge retrieval.
pub struct Agent {
    name: String,
    instructions: String,
    llm: LlmManager,
    tools: ToolRegistry,
    knowledge: Option<Arc<dyn KnowledgeBase>>,
    memory: MemoryManager,
    tool_call_re: Regex,
}

impl Agent {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    /// Handles one user message end to end: context gathering, the model
    /// round trip, tool execution, an optional follow-up, and memory
    /// recording. Never fails; internal errors produce an apologetic reply
    /// with the cause under the `error` metadata key.
    pub async fn process(
        &self,
        message: &str,
        context: Option<Map<String, Value>>,
    ) -> AgentResponse {
        match self.process_inner(message, context).await {
            Ok(response) => response,
            Err(err) => {
                error!("failed to process message: {err}");
                let mut metadata = Map::new();
                metadata.insert("error".to_string(), json!(err.to_string()));
                AgentResponse {
                    message: ERROR_REPLY.to_string(),
                    tool_calls: Vec::new(),
                    metadata,
                }
            }
        }
    }

    async fn process_inner(
        &self,
        message: &str,
        context: Option<Map<String, Value>>,
    ) -> Result<AgentResponse> {
        let mut combined = self.gather_context(message).await;
        if let Some(extra) = context {
            // Caller-supplied entries win over gathered ones.
            combined.extend(extra);
        }

        let native_tools = self.llm.supports_tools() && !self.tools.is_empty();
        let messages = vec![
            Message::system(self.system_message(&combined, !native_tools)),
            Message::user(message),
        ];
        let schemas = if native_tools {
            self.tools.describe()
        } else {
            Vec::new()
        };

        let completion = self.llm.generate(&messages, None, &schemas).await?;

        let mut response = if completion.tool_calls.is_empty() {
            self.parse_response(&completion.content)
        } else {
            let tool_calls = completion
                .tool_calls
                .iter()
                .filter(|call| self.approves(call))
                .cloned()
                .collect();
            AgentResponse {
                message: completion.content.trim().to_string(),
                tool_calls,
                metadata: Map::new(),
            }
        };

        if !response.tool_calls.is_empty() {
            let results = self.execute_tools(&response.tool_calls).await;
            let succeeded = results
                .iter()
                .any(|record| record.get("success").and_then(Value::as_bool).unwrap_or(false));
            response
                .metadata
                .insert("tool_results".to_string(), Value::Array(results.clone()));
            if succeeded {
                if let Some(follow_up) = self.follow_up(&results, &messages).await {
                    response.message.push_str("\n\n");
                    response.message.push_str(&follow_up);
                }
            }
        }

        if let Err(err) = self.memory.add_interaction(message, &response.message).await {
            error!("failed to record interaction: {err}");
        }

        Ok(response)
    }

    /// Recent interactions and knowledge snippets for the message. Both
    /// lookups degrade to empty lists on failure.
    async fn gather_context(&self, message: &str) -> Map<String, Value> {
        let mut context = Map::new();

        let memories = match self.memory.get_relevant_memories(message).await {
            Ok(memories) => memories,
            Err(err) => {
                error!("error gathering memory context: {err}");
                Vec::new()
            }
        };
        context.insert("memory".to_string(), Value::Array(memories));

        let knowledge = match &self.knowledge {
            Some(kb) => match kb.query(message).await {
                Ok(snippets) => snippets.into_iter().map(Value::String).collect(),
                Err(err) => {
                    error!("error querying knowledge base: {err}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        context.insert("knowledge".to_string(), Value::Array(knowledge));

        context
    }

    fn system_message(&self, context: &Map<String, Value>, include_tools: bool) -> String {
        let memory = context.get("memory").cloned().unwrap_or_else(|| json!([]));
        let knowledge = context.get("knowledge").cloned().unwrap_or_else(|| json!([]));

        let mut prompt = format!(
            "{}\n\nContext from memory:\n{}\n\nRelevant knowledge:\n{}",
            self.instructions,
            pretty(&memory),
            pretty(&knowledge),
        );

        if include_tools && !self.tools.is_empty() {
            let listing = self
                .tools
                .describe()
                .iter()
                .map(|tool| format!("- {}: {}", tool.name, tool.description))
                .collect::<Vec<_>>()
                .join("\n");
            prompt.push_str(&format!(
                "\n\nAvailable tools:\n{listing}\n\n\
                 To use a tool, include a JSON block in your response:\n\
                 <tool_call>\n\
                 {{\"name\": \"tool_name\", \"parameters\": {{\"param1\": \"value1\"}}}}\n\
                 </tool_call>"
            ));
        }
        prompt
    }

    /// Extracts `<tool_call>` blocks from the reply. Blocks with valid JSON
    /// are always removed from the visible text, even when the call inside
    /// is rejected; blocks that do not parse are left in place and logged.
    fn parse_response(&self, raw: &str) -> AgentResponse {
        let mut message = raw.to_string();
        let mut tool_calls = Vec::new();

        for captures in self.tool_call_re.captures_iter(raw) {
            let Some(inner) = captures.get(1) else {
                continue;
            };
            match serde_json::from_str::<Value>(inner.as_str()) {
                Ok(value) => {
                    if let Some(call) = self.extract_call(&value) {
                        tool_calls.push(call);
                    }
                    message = message.replace(&captures[0], "");
                }
                Err(_) => warn!("invalid tool call JSON: {}", inner.as_str()),
            }
        }

        AgentResponse {
            message: message.trim().to_string(),
            tool_calls,
            metadata: Map::new(),
        }
    }

    fn extract_call(&self, value: &Value) -> Option<ToolCall> {
        let fields = value.as_object()?;
        let name = fields.get("name")?.as_str()?;
        let parameters = fields.get("parameters")?.as_object()?;
        let call = ToolCall {
            name: name.to_string(),
            parameters: parameters.clone(),
        };
        self.approves(&call).then_some(call)
    }

    fn approves(&self, call: &ToolCall) -> bool {
        self.tools
            .get(&call.name)
            .map_or(false, |tool| tool.validate_params(&call.parameters))
    }

    /// Runs calls sequentially, in reply order. Each outcome becomes a
    /// result record; a tool error is recorded rather than propagated.
    async fn execute_tools(&self, calls: &[ToolCall]) -> Vec<Value> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let record = match self.tools.execute(call).await {
                Ok(outcome) => json!({
                    "tool": call.name,
                    "success": outcome.success,
                    "result": outcome.result,
                    "error": outcome.error,
                }),
                Err(err) => {
                    error!("tool `{}` execution failed: {err}", call.name);
                    json!({
                        "tool": call.name,
                        "success": false,
                        "result": Value::Null,
                        "error": err.to_string(),
                    })
                }
            };
            results.push(record);
        }
        results
    }

    /// Asks the model to comment on the tool results. Failures here are
    /// logged and swallowed; the response simply goes out without a
    /// follow-up.
    async fn follow_up(&self, results: &[Value], prior: &[Message]) -> Option<String> {
        let rendered = match serde_json::to_string_pretty(results) {
            Ok(rendered) => rendered,
            Err(err) => {
                error!("failed to render tool results: {err}");
                return None;
            }
        };

        let mut messages = prior.to_vec();
        messages.push(Message::system(format!("Tool execution results:\n{rendered}")));

        match self.llm.generate(&messages, Some(FOLLOW_UP_PROMPT), &[]).await {
            Ok(completion) => {
                let text = completion.content.trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            Err(err) => {
                error!("follow-up generation failed: {err}");
                None
            }
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
