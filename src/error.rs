use serde::Serialize;
use thiserror::Error;

/// A single pre-flight rejection for a reviewed import item. Collected and
/// returned as a batch before anything is written.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub item_id: Option<i64>,
    pub field: &'static str,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid {field}: {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error("{} validation failure(s)", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("Unknown {0}: {1}")]
    NotFound(&'static str, i64),

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
