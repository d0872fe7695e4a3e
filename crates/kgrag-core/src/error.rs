use thiserror::Error;

#[derive(Error, Debug)]
pub enum KgError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing run output failed. Kept apart from [`KgError::Io`] so callers
    /// can tell a broken output stream from a failing stage.
    #[error("Output error: {0}")]
    Output(std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document load error: {0}")]
    Load(String),

    #[error("Graph database error: {0}")]
    Graph(String),

    #[error("Model error ({model}): {message}")]
    Model { model: String, message: String },

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, KgError>;
