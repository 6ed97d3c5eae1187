use thiserror::Error;

/// Errors surfaced by the external record stores (dispatch repository,
/// notification store, preference store).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Duplicate(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialize(e.to_string())
    }
}
