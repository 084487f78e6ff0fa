use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No usable rows to fit on")]
    EmptyData,

    #[error("Model must be fitted before making predictions")]
    NotFitted,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("No active model set")]
    NoActiveModel,

    #[error("Incompatible model artifact: {0}")]
    IncompatibleArtifact(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model prediction failed: {0}")]
    Prediction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for EngineError {
    fn from(err: bincode::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}
