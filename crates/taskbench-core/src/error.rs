use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type BenchResult<T> = Result<T, BenchError>;
