//! Built-in tools agents can register:
//! - Web search: Tavily-backed lookup of recent information
//! - Knowledge retrieval: queries the agent's knowledge base
//! - Summarization: condenses text through the configured model
//! - Code execution: sandboxed-ish shell commands with limits
//! - Email: logged outbound mail stub

pub mod code;
pub mod email;
pub mod rag;
pub mod search;
pub mod summarize;

pub use code::{CodeConfig, CodeExecutionTool};
pub use email::EmailTool;
pub use rag::RetrievalTool;
pub use search::{SearchConfig, WebSearchTool};
pub use summarize::SummarizationTool;
