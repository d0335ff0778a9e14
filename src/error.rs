use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("failed to build schema for tool `{tool}`: {reason}")]
    SchemaGeneration { tool: String, reason: String },

    #[error("model transport error: {0}")]
    Transport(String),

    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{name}` failed: {source}")]
    ToolExecution {
        name: String,
        #[source]
        source: ToolError,
    },

    #[error("exchange cancelled")]
    Cancelled,

    #[error("exceeded tool-call budget of {steps} model requests without a final answer")]
    StepLimitExceeded { steps: usize },

    #[error("exceeded time budget of {0:?} without a final answer")]
    DeadlineExceeded(std::time::Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure raised by a tool's own execution. The display text is what the model sees.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} is required")]
    MissingArgument(String),

    #[error("{name} is not a valid {expected}")]
    InvalidArgument { name: String, expected: String },

    #[error("{0}")]
    Failed(String),

    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ToolError {
    pub fn backend(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ToolError::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
