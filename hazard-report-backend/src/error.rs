use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use hazard_report_shared::api::ErrorResponse;
use hazard_report_shared::error::HazardError;
use tracing::error;

#[derive(Debug)]
pub struct WebError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        WebError {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::to_string(&ErrorResponse::new(self.message))
            .unwrap_or_else(|_| r#"{"ok":false,"error":"Internal error"}"#.to_string());
        let mut response = axum::response::Response::new(body.into());
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

impl From<HazardError> for WebError {
    fn from(err: HazardError) -> Self {
        match err {
            HazardError::NotFound(msg) => WebError::not_found(msg),
            HazardError::Validation(msg) | HazardError::UploadRejected(msg) => {
                WebError::bad_request(msg)
            }
            HazardError::Unauthorized => WebError::unauthorized(),
            other => {
                error!("Internal error: {:?}", other);
                WebError::internal(other.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for WebError {
    fn from(err: serde_json::Error) -> Self {
        WebError::internal(format!("Serialization error: {:?}", err))
    }
}
