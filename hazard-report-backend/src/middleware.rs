//! Axum middleware things
//!

use axum::extract::{Request, State};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::Response;
use hazard_report_shared::API_KEY_HEADER;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::error::WebError;
use crate::SharedState;

pub fn corslayer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(API_KEY_HEADER),
        ])
        // the wizard is served from a different port
        .allow_origin(Any)
}

/// Rejects the request unless `x-api-key` matches the configured key.
///
/// With no key configured every request passes.
pub async fn require_api_key(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, WebError> {
    let expected = state.read().await.config.api_key.clone();
    if let Some(expected) = expected {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!(
                "Rejected {} {} with missing or wrong api key",
                request.method(),
                request.uri().path()
            );
            return Err(WebError::unauthorized());
        }
    }
    Ok(next.run(request).await)
}
