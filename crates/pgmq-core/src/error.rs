use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("duplicate handler for job '{job}' in queue '{queue}'")]
    DuplicateHandler { queue: String, job: String },

    #[error("message not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
