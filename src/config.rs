use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{HarrierError, Result};
use crate::memory::MemoryConfig;
use crate::tools::SearchConfig;

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Application settings loaded from TOML, with `HARRIER_*` environment
/// overrides applied on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

fn default_agent_name() -> String {
    "assistant".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            instructions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// `provider/model` identifier; bare names route to OpenAI.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Shared key used when a provider block does not set its own.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub openai: ProviderSettings,
    #[serde(default)]
    pub anthropic: ProviderSettings,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: None,
            api_key: None,
            openai: ProviderSettings::default(),
            anthropic: ProviderSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

impl AppConfig {
    /// Loads settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            HarrierError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|err| {
            HarrierError::Config(format!("failed to parse {}: {err}", path.display()))
        })
    }

    /// Defaults with environment overrides applied, no file involved.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Loads from the file when it exists, then applies environment
    /// overrides.
    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(name) = env::var("HARRIER_AGENT_NAME") {
            self.agent.name = name;
        }
        if let Ok(model) = env::var("HARRIER_MODEL") {
            self.model.model = model;
        }
        if let Ok(temperature) = env::var("HARRIER_TEMPERATURE") {
            match temperature.parse() {
                Ok(value) => self.model.temperature = Some(value),
                Err(_) => warn!("ignoring invalid HARRIER_TEMPERATURE: {temperature}"),
            }
        }
        if let Ok(key) = env::var("HARRIER_OPENAI_API_KEY") {
            self.model.openai.api_key = Some(key);
        }
        if let Ok(endpoint) = env::var("HARRIER_OPENAI_ENDPOINT") {
            self.model.openai.endpoint = Some(endpoint);
        }
        if let Ok(key) = env::var("HARRIER_ANTHROPIC_API_KEY") {
            self.model.anthropic.api_key = Some(key);
        }
        if let Ok(endpoint) = env::var("HARRIER_ANTHROPIC_ENDPOINT") {
            self.model.anthropic.endpoint = Some(endpoint);
        }
        if let Ok(key) = env::var("HARRIER_TAVILY_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Ok(days) = env::var("HARRIER_MEMORY_RETENTION_DAYS") {
            match days.parse() {
                Ok(value) => self.memory.retention_days = value,
                Err(_) => warn!("ignoring invalid HARRIER_MEMORY_RETENTION_DAYS: {days}"),
            }
        }
    }
}
