use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Structured output error: {0}")]
    StructuredOutput(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<rusqlite::Error> for AssistantError {
    fn from(err: rusqlite::Error) -> Self {
        AssistantError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
