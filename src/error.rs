use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarrierError>;

#[derive(Debug, Error)]
pub enum HarrierError {
    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("model error: {0}")]
    Model(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),
}
