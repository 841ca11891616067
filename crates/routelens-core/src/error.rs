use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouteLensError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model transport error: {0}")]
    ModelTransport(String),

    #[error("Model retries exhausted after {attempts} attempts: {last_error}")]
    ModelExhausted { attempts: u32, last_error: String },

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),
}

pub type Result<T> = std::result::Result<T, RouteLensError>;
