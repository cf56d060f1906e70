use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to create action record: {0}")]
    ActionCreation(String),

    #[error("Handler failed for '{action_type}': {message}")]
    Handler {
        action_type: String,
        message: String,
    },

    #[error("Handler timed out for '{action_type}' after {timeout_ms}ms")]
    HandlerTimeout {
        action_type: String,
        timeout_ms: u64,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}
