use thiserror::Error;

#[derive(Debug, Error)]
pub enum HazardError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    UploadRejected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("PDF generation failed: {0}")]
    Pdf(String),
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for HazardError {
    fn from(err: std::io::Error) -> Self {
        HazardError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for HazardError {
    fn from(err: serde_json::Error) -> Self {
        HazardError::Serialization(err.to_string())
    }
}
