use hazard_report_shared::error::HazardError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Every rule the draft currently breaks, in display order
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("{0}")]
    UploadRejected(String),
    /// The server answered with an error body
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },
    /// The request never got an answer, or the answer couldn't be read
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// The messages to show the user, one per line.
    pub fn messages(&self) -> Vec<String> {
        match self {
            ClientError::Validation(messages) => messages.clone(),
            ClientError::Api { message, .. } => vec![message.clone()],
            other => vec![other.to_string()],
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl From<HazardError> for ClientError {
    fn from(err: HazardError) -> Self {
        match err {
            HazardError::Validation(msg) => ClientError::Validation(vec![msg]),
            HazardError::UploadRejected(msg) => ClientError::UploadRejected(msg),
            HazardError::Io(msg) => ClientError::Io(msg),
            HazardError::Serialization(msg) => ClientError::Serialization(msg),
            other => ClientError::Other(other.to_string()),
        }
    }
}
