use thiserror::Error;

/// Errors that can occur while processing a single upload notification
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Failed to serialize image record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write image record: {0}")]
    Store(String),
}

impl IndexerError {
    /// Short label for structured logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            IndexerError::MalformedNotification(_) => "malformed_notification",
            IndexerError::Detection(_) => "detection",
            IndexerError::Serialization(_) => "serialization",
            IndexerError::Store(_) => "store",
        }
    }
}
