use std::collections::VecDeque;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::config::ModelConfig;
use crate::error::{HarrierError, Result};
use crate::tool::ToolSchema;
use crate::types::{Message, Role, ToolCall};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One model reply: the visible text plus any structured tool calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// A chat backend. Implementations translate the neutral message format
/// into one vendor's wire schema.
#[async_trait]
pub trait Provider: Send + Sync {
    /// True when the backend accepts structured tool definitions. The agent
    /// then sends schemas here instead of describing tools in the prompt.
    fn supports_tools(&self) -> bool {
        false
    }

    async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolSchema],
        temperature: Option<f32>,
    ) -> Result<Completion>;
}

/// Splits a `provider/model` identifier. Bare names default to OpenAI.
pub fn split_model(model: &str) -> (&str, &str) {
    model.split_once('/').unwrap_or(("openai", model))
}

/// Picks a provider from the identifier prefix, configured from the
/// environment. Unknown prefixes fall back to the OpenAI wire format,
/// which most compatible gateways accept.
pub fn provider_for_model(model: &str) -> Arc<dyn Provider> {
    match split_model(model).0 {
        "anthropic" => Arc::new(AnthropicProvider::from_env()),
        _ => Arc::new(OpenAiProvider::from_env()),
    }
}

/// Like [`provider_for_model`], but credentials come from settings rather
/// than the environment.
pub fn provider_from_config(cfg: &ModelConfig) -> Arc<dyn Provider> {
    match split_model(&cfg.model).0 {
        "anthropic" => Arc::new(AnthropicProvider::from_config(cfg)),
        _ => Arc::new(OpenAiProvider::from_config(cfg)),
    }
}

/// Routes chat requests to one provider and applies shared policy: system
/// prompt injection, reply screening, and error logging.
pub struct LlmManager {
    model: String,
    temperature: Option<f32>,
    provider: Arc<dyn Provider>,
}

impl LlmManager {
    /// Manager for a `provider/model` identifier, e.g. `openai/gpt-4o` or
    /// `anthropic/claude-3-5-sonnet-20241022`.
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        let provider = provider_for_model(&model);
        Self {
            model,
            temperature: None,
            provider,
        }
    }

    /// Manager with an explicit provider, bypassing prefix routing.
    pub fn with_provider(model: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            provider,
        }
    }

    pub fn from_config(cfg: &ModelConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            provider: provider_from_config(cfg),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn supports_tools(&self) -> bool {
        self.provider.supports_tools()
    }

    /// Sends the conversation to the provider. `system_prompt` is prepended
    /// as the leading system message when given. Errors are logged and
    /// propagated to the caller.
    pub async fn generate(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
        tools: &[ToolSchema],
    ) -> Result<Completion> {
        let mut outbound = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = system_prompt {
            outbound.push(Message::system(prompt));
        }
        outbound.extend_from_slice(messages);

        let bare_model = split_model(&self.model).1;
        match self
            .provider
            .generate(bare_model, &outbound, tools, self.temperature)
            .await
        {
            Ok(completion) => {
                if completion.tool_calls.is_empty() && looks_degenerate(&completion.content) {
                    warn!("suspect completion from `{}`: {}", self.model, completion.content);
                }
                Ok(completion)
            }
            Err(err) => {
                error!("completion failed for `{}`: {err}", self.model);
                Err(err)
            }
        }
    }
}

/// Boilerplate failure phrases worth flagging in logs. The reply is still
/// returned to the caller.
fn looks_degenerate(content: &str) -> bool {
    let lowered = content.to_lowercase();
    ["error occurred", "failed to generate", "invalid response"]
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

fn coalesce_error(status: StatusCode, body: &str, provider: &str) -> HarrierError {
    if status.as_u16() == 429 {
        return HarrierError::Model(format!("{provider} rate limit exceeded: {body}"));
    }
    HarrierError::Model(format!(
        "{provider} request failed with status {status}: {body}"
    ))
}

fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .expect("failed to build http client")
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

// OpenAI

/// Client for OpenAI's chat completions API, including native function
/// calling.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    organization: Option<String>,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: default_http_client(),
            api_key: Some(api_key.into()),
            base_url: OPENAI_BASE_URL.to_string(),
            organization: None,
        }
    }

    /// Client configured from `OPENAI_API_KEY`. A missing key only fails at
    /// request time, so construction never does.
    pub fn from_env() -> Self {
        Self {
            http: default_http_client(),
            api_key: env::var("OPENAI_API_KEY").ok(),
            base_url: OPENAI_BASE_URL.to_string(),
            organization: env::var("OPENAI_ORGANIZATION").ok(),
        }
    }

    pub fn from_config(cfg: &ModelConfig) -> Self {
        let mut provider = Self::from_env();
        if let Some(key) = cfg.openai.api_key.clone().or_else(|| cfg.api_key.clone()) {
            provider.api_key = Some(key);
        }
        if let Some(endpoint) = cfg.openai.endpoint.clone() {
            provider.base_url = endpoint;
        }
        if cfg.openai.organization.is_some() {
            provider.organization = cfg.openai.organization.clone();
        }
        provider
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    fn key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            HarrierError::Config("OpenAI API key is not set (OPENAI_API_KEY)".into())
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn supports_tools(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolSchema],
        temperature: Option<f32>,
    ) -> Result<Completion> {
        let key = self.key()?;

        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(temperature) = temperature {
            body["temperature"] = json!(temperature);
        }
        if !tools.is_empty() {
            body["tools"] = json!(to_openai_tools(tools));
            body["tool_choice"] = json!("auto");
        }

        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {key}"))
            .json(&body);
        if let Some(organization) = &self.organization {
            request = request.header("OpenAI-Organization", organization);
        }

        let response = request
            .send()
            .await
            .map_err(|err| HarrierError::Model(format!("OpenAI request error: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "OpenAI"));
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|err| HarrierError::Model(format!("OpenAI response parse error: {err}")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| HarrierError::Model("OpenAI returned no choices".into()))?;

        let content = choice.message.content.unwrap_or_default();
        let mut tool_calls = Vec::with_capacity(choice.message.tool_calls.len());
        for call in choice.message.tool_calls {
            let arguments: Value =
                serde_json::from_str(&call.function.arguments).map_err(|err| {
                    HarrierError::Protocol(format!(
                        "tool call `{}` has malformed arguments: {err}",
                        call.function.name
                    ))
                })?;
            let parameters = arguments.as_object().cloned().ok_or_else(|| {
                HarrierError::Protocol(format!(
                    "tool call `{}` arguments are not an object",
                    call.function.name
                ))
            })?;
            tool_calls.push(ToolCall {
                name: call.function.name,
                parameters,
            });
        }

        if content.is_empty() && tool_calls.is_empty() {
            return Err(HarrierError::Model("OpenAI returned an empty completion".into()));
        }
        Ok(Completion { content, tool_calls })
    }
}

fn to_openai_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool
                        .parameters
                        .clone()
                        .unwrap_or_else(|| json!({"type": "object"})),
                },
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    function: OpenAiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

// Anthropic

/// Client for the Anthropic messages API. System messages are lifted into
/// the top-level `system` field the API expects.
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: default_http_client(),
            api_key: Some(api_key.into()),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            max_tokens: 1024,
        }
    }

    /// Client configured from `ANTHROPIC_API_KEY`. A missing key only fails
    /// at request time.
    pub fn from_env() -> Self {
        Self {
            http: default_http_client(),
            api_key: env::var("ANTHROPIC_API_KEY").ok(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            max_tokens: 1024,
        }
    }

    pub fn from_config(cfg: &ModelConfig) -> Self {
        let mut provider = Self::from_env();
        if let Some(key) = cfg
            .anthropic
            .api_key
            .clone()
            .or_else(|| cfg.api_key.clone())
        {
            provider.api_key = Some(key);
        }
        if let Some(endpoint) = cfg.anthropic.endpoint.clone() {
            provider.base_url = endpoint;
        }
        provider
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            HarrierError::Config("Anthropic API key is not set (ANTHROPIC_API_KEY)".into())
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn supports_tools(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolSchema],
        temperature: Option<f32>,
    ) -> Result<Completion> {
        let key = self.key()?;

        let turns: Vec<Value> = messages
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| {
                json!({
                    "role": role_name(message.role),
                    "content": message.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "messages": turns,
        });
        if let Some(system) = join_system_text(messages) {
            body["system"] = json!(system);
        }
        if let Some(temperature) = temperature {
            body["temperature"] = json!(temperature);
        }
        if !tools.is_empty() {
            body["tools"] = json!(to_anthropic_tools(tools));
            body["tool_choice"] = json!({"type": "auto"});
        }

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| HarrierError::Model(format!("Anthropic request error: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "Anthropic"));
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|err| {
            HarrierError::Model(format!("Anthropic response parse error: {err}"))
        })?;

        let mut content_parts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block.r#type.as_str() {
                "text" => {
                    if let Some(text) = block.text {
                        content_parts.push(text);
                    }
                }
                "tool_use" => {
                    let name = block.name.unwrap_or_default();
                    let parameters = match block.input {
                        Some(Value::Object(map)) => map,
                        None => Map::new(),
                        Some(_) => {
                            return Err(HarrierError::Protocol(format!(
                                "tool call `{name}` arguments are not an object"
                            )))
                        }
                    };
                    tool_calls.push(ToolCall { name, parameters });
                }
                _ => {}
            }
        }

        let content = content_parts.join("\n");
        if content.is_empty() && tool_calls.is_empty() {
            return Err(HarrierError::Model(
                "Anthropic returned an empty completion".into(),
            ));
        }
        Ok(Completion { content, tool_calls })
    }
}

fn join_system_text(messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|message| message.role == Role::System)
        .map(|message| message.content.as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

fn to_anthropic_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object"})),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

// Stub

/// Scripted provider for tests and offline development. Replies are popped
/// front to back; running out is an error so tests notice extra calls.
pub struct StubProvider {
    replies: Mutex<VecDeque<String>>,
    native: bool,
}

impl StubProvider {
    pub fn new(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            native: false,
        })
    }

    /// Stub that reports native tool support and understands `call_tool`
    /// directives.
    pub fn native(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            native: true,
        })
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("stub replies poisoned").len()
    }
}

/// Scripted reply shapes: plain text is returned as-is, while JSON
/// directives can trigger native tool calls.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond {
        content: String,
    },
    CallTool {
        name: String,
        #[serde(default)]
        parameters: Map<String, Value>,
    },
}

#[async_trait]
impl Provider for StubProvider {
    fn supports_tools(&self) -> bool {
        self.native
    }

    async fn generate(
        &self,
        _model: &str,
        _messages: &[Message],
        _tools: &[ToolSchema],
        _temperature: Option<f32>,
    ) -> Result<Completion> {
        let reply = self
            .replies
            .lock()
            .expect("stub replies poisoned")
            .pop_front();
        let Some(reply) = reply else {
            return Err(HarrierError::Model(
                "stub provider ran out of scripted replies".into(),
            ));
        };

        match serde_json::from_str::<StubDirective>(&reply) {
            Ok(StubDirective::Respond { content }) => Ok(Completion {
                content,
                tool_calls: Vec::new(),
            }),
            Ok(StubDirective::CallTool { name, parameters }) => Ok(Completion {
                content: String::new(),
                tool_calls: vec![ToolCall { name, parameters }],
            }),
            Err(_) => Ok(Completion {
                content: reply,
                tool_calls: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CaptureProvider {
        seen: Mutex<Vec<Message>>,
        temperature: Mutex<Option<f32>>,
    }

    impl CaptureProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                temperature: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Provider for CaptureProvider {
        async fn generate(
            &self,
            _model: &str,
            messages: &[Message],
            _tools: &[ToolSchema],
            temperature: Option<f32>,
        ) -> Result<Completion> {
            *self.seen.lock().unwrap() = messages.to_vec();
            *self.temperature.lock().unwrap() = temperature;
            Ok(Completion {
                content: "ok".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    #[test]
    fn splits_prefixed_identifiers() {
        assert_eq!(split_model("openai/gpt-4o"), ("openai", "gpt-4o"));
        assert_eq!(
            split_model("anthropic/claude-3-5-sonnet-20241022"),
            ("anthropic", "claude-3-5-sonnet-20241022")
        );
        assert_eq!(split_model("gpt-4o"), ("openai", "gpt-4o"));
    }

    #[test]
    fn flags_degenerate_replies() {
        assert!(looks_degenerate("An Error Occurred while routing"));
        assert!(looks_degenerate("we FAILED TO GENERATE anything"));
        assert!(!looks_degenerate("all systems nominal"));
    }

    #[tokio::test]
    async fn manager_prepends_system_prompt() {
        let capture = CaptureProvider::new();
        let manager = LlmManager::with_provider("openai/gpt-4o", capture.clone())
            .with_temperature(0.4);

        let messages = [Message::user("hello")];
        manager
            .generate(&messages, Some("Be terse."), &[])
            .await
            .unwrap();

        let seen = capture.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Message::system("Be terse."));
        assert_eq!(seen[1], Message::user("hello"));
        assert_eq!(*capture.temperature.lock().unwrap(), Some(0.4));
    }

    #[tokio::test]
    async fn stub_replies_pop_in_order_then_run_out() {
        let stub = StubProvider::new(vec!["first".to_string(), "second".to_string()]);

        let one = stub.generate("m", &[], &[], None).await.unwrap();
        let two = stub.generate("m", &[], &[], None).await.unwrap();
        assert_eq!(one.content, "first");
        assert_eq!(two.content, "second");
        assert_eq!(stub.remaining(), 0);

        let err = stub.generate("m", &[], &[], None).await.unwrap_err();
        assert!(matches!(err, HarrierError::Model(_)));
    }

    #[tokio::test]
    async fn stub_call_tool_directive_yields_native_call() {
        let stub = StubProvider::native(vec![
            r#"{"action": "call_tool", "name": "echo", "parameters": {"q": "hi"}}"#.to_string(),
        ]);
        assert!(stub.supports_tools());

        let completion = stub.generate("m", &[], &[], None).await.unwrap();
        assert!(completion.content.is_empty());
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "echo");
        assert_eq!(completion.tool_calls[0].parameters["q"], json!("hi"));
    }

    #[tokio::test]
    async fn anthropic_system_text_is_joined() {
        let messages = [
            Message::system("one"),
            Message::user("hi"),
            Message::system("two"),
        ];
        assert_eq!(join_system_text(&messages), Some("one\n\ntwo".to_string()));
        assert_eq!(join_system_text(&[Message::user("hi")]), None);
    }
}
