//! Rust-flavored building blocks for LLM agents:
//!
//! - [`Agent`] handles one message end to end: context gathering, the
//!   model round trip, tool dispatch, and memory recording
//! - [`Tool`] and [`ToolRegistry`] for validated, name-keyed tool calls
//! - [`Provider`] implementations for OpenAI and Anthropic, routed by a
//!   `provider/model` identifier, plus a scripted stub for tests
//! - [`MemoryStore`] and [`KnowledgeBase`] abstractions with in-memory
//!   implementations
//! - [`FlowManager`] for multi-step pipelines that keep going when a
//!   step fails

mod agent;
mod config;
mod error;
mod flow;
mod knowledge;
mod llm;
mod memory;
mod tool;
pub mod tools;
mod types;

pub use agent::{Agent, AgentConfig};
pub use config::{AgentSettings, AppConfig, ModelConfig, ProviderSettings, DEFAULT_MODEL};
pub use error::{HarrierError, Result};
pub use flow::{FlowManager, FlowStep};
pub use knowledge::{
    Document, Embedder, InMemoryVectorStore, KnowledgeBase, ScoredDocument, VectorKnowledgeBase,
    VectorStore, WhitespaceEmbedder,
};
pub use llm::{
    provider_for_model, provider_from_config, split_model, AnthropicProvider, Completion,
    LlmManager, OpenAiProvider, Provider, StubProvider,
};
pub use memory::{InMemoryStore, MemoryConfig, MemoryManager, MemoryStore};
pub use tool::{Tool, ToolRegistry, ToolSchema};
pub use types::{AgentResponse, Message, Role, ToolCall, ToolResponse};
