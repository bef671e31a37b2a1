use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{HarrierError, Result};
use crate::tool::Tool;
use crate::types::ToolResponse;

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Settings for [`WebSearchTool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Tavily search depth, `basic` or `advanced`.
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_search_depth() -> String {
    "basic".to_string()
}

fn default_max_results() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            search_depth: default_search_depth(),
            max_results: default_max_results(),
        }
    }
}

/// Web search backed by the Tavily API.
pub struct WebSearchTool {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    search_depth: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: TAVILY_ENDPOINT.to_string(),
            search_depth: default_search_depth(),
            max_results: default_max_results(),
        }
    }

    /// Tool configured from `TAVILY_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("TAVILY_API_KEY").map_err(|_| {
            HarrierError::Config("Tavily API key is not set (TAVILY_API_KEY)".into())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn from_config(cfg: &SearchConfig) -> Result<Self> {
        let tool = match &cfg.api_key {
            Some(key) => Self::new(key.clone()),
            None => Self::from_env()?,
        };
        Ok(tool
            .with_search_depth(cfg.search_depth.clone())
            .with_max_results(cfg.max_results))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_search_depth(mut self, search_depth: impl Into<String>) -> Self {
        self.search_depth = search_depth.into();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for recent and accurate information"
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        }))
    }

    fn validate_params(&self, params: &Map<String, Value>) -> bool {
        params
            .get("query")
            .and_then(Value::as_str)
            .map_or(false, |query| !query.trim().is_empty())
    }

    async fn execute(&self, params: Map<String, Value>) -> Result<ToolResponse> {
        let Some(query) = params.get("query").and_then(Value::as_str) else {
            return Ok(ToolResponse::fail("Missing required 'query' parameter"));
        };

        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": self.search_depth,
            "max_results": self.max_results,
        });

        let outcome = async {
            let response = self.http.post(&self.endpoint).json(&body).send().await?;
            let response = response.error_for_status()?;
            response.json::<TavilyResponse>().await
        }
        .await;

        match outcome {
            Ok(parsed) => Ok(ToolResponse::ok(format_results(parsed))),
            Err(err) => Ok(ToolResponse::fail(format!("Search failed: {err}"))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    score: f64,
}

fn format_results(response: TavilyResponse) -> Value {
    let results: Vec<Value> = response
        .results
        .into_iter()
        .map(|result| {
            json!({
                "title": result.title,
                "snippet": result.content,
                "url": result.url,
                "score": result.score,
            })
        })
        .collect();
    json!({ "results": results })
}
