pub mod attachment;
pub mod cli;
pub mod error;
pub mod export;
pub mod logging;
pub mod middleware;
pub mod openapi;
pub mod pdf;
pub mod reports;
pub mod repository;
pub mod server;
pub mod storage;
pub mod tls;
pub mod uploads;
#[cfg(test)]
mod tests;

use attachment::{delete_upload, upload_attachment, MULTIPART_OVERHEAD};
use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::{header, Response, StatusCode},
    routing::{delete, get, post, put},
    Router,
};
use export::export_pdf;
use hazard_report_shared::attachment::MAX_UPLOAD_BYTES;
use hazard_report_shared::error::HazardError;
use hazard_report_shared::UPLOADS_PATH;
use reports::{create_report, delete_report, get_report, list_reports, update_report};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tower::{BoxError, ServiceBuilder};
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer};
use tracing::{error, info};

use crate::{
    cli::CliOpts, error::WebError, logging::logging_layer, repository::Repository,
    storage::JsonFileStore, uploads::AttachmentStore,
};

pub type SharedState = Arc<RwLock<AppState>>;

/// Settings the handlers read at request time.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `None` leaves the gated routes open
    pub api_key: Option<String>,
    pub logo_path: PathBuf,
    /// Whether uploads get `https://` URLs
    pub https: bool,
}

pub struct AppState {
    pub repo: Repository,
    pub config: ServerConfig,
}

impl AppState {
    pub async fn new(cli: &CliOpts, https: bool) -> Result<Self, HazardError> {
        let store = JsonFileStore::open(&cli.data_file()).await?;
        let attachments = AttachmentStore::new(&cli.uploads_dir()).await?;
        info!(
            "Reports in {}, uploads in {}",
            store.path().display(),
            attachments.dir().display()
        );
        let config = ServerConfig {
            api_key: cli.api_key(),
            logo_path: cli.logo_path(),
            https,
        };
        if config.api_key.is_none() {
            info!("No api key configured, mutating routes are open");
        }
        Ok(Self {
            repo: Repository::new(Arc::new(store), attachments),
            config,
        })
    }

    #[cfg(test)]
    pub async fn test(dir: &std::path::Path, api_key: Option<&str>) -> Self {
        let cli = CliOpts {
            data_file: Some(dir.join("data/db.json")),
            uploads_dir: Some(dir.join("uploads")),
            logo_path: Some(dir.join("logo.png")),
            api_key: api_key.map(|key| key.to_string()),
            ..Default::default()
        };
        Self::new(&cli, false)
            .await
            .expect("Failed to start test state")
    }
}

pub async fn build_app<T>(shared_state: &SharedState) -> Router<T> {
    let uploads_dir = shared_state
        .read()
        .await
        .repo
        .attachments()
        .dir()
        .to_path_buf();
    let uploads_service = ServeDir::new(uploads_dir);

    // editing or deleting reports, deleting uploads and exporting need the api key
    let gate = axum::middleware::from_fn_with_state(
        shared_state.clone(),
        middleware::require_api_key,
    );

    let router = Router::new()
        .route("/api/reports", get(list_reports).post(create_report))
        .route(
            "/api/reports/{id}",
            get(get_report).merge(
                put(update_report)
                    .delete(delete_report)
                    .route_layer(gate.clone()),
            ),
        )
        .route(
            "/api/upload",
            post(upload_attachment).layer(DefaultBodyLimit::max(
                MAX_UPLOAD_BYTES as usize + MULTIPART_OVERHEAD,
            )),
        )
        .route(
            "/api/uploads/{filename}",
            delete(delete_upload).route_layer(gate.clone()),
        )
        .route("/api/export/pdf", post(export_pdf).route_layer(gate))
        .merge(openapi::api_route())
        .nest_service(UPLOADS_PATH, uploads_service);

    router
        // Add middleware to all routes
        .layer(
            ServiceBuilder::new()
                .layer(middleware::corslayer())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    |response: &Response<Body>| {
                        if response.status() == StatusCode::OK {
                            "private, no-transform max-age=0".parse().ok()
                        } else {
                            None
                        }
                    },
                ))
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .concurrency_limit(1024)
                .timeout(Duration::from_secs(10))
                .layer(logging_layer()),
        )
        .with_state(shared_state.clone())
}

async fn handle_error(error: BoxError) -> WebError {
    if error.is::<tower::timeout::error::Elapsed>() {
        return WebError::new(StatusCode::REQUEST_TIMEOUT, "request timed out");
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        let msg = "service is overloaded, try again later";
        error!("{}", msg);
        return WebError::new(StatusCode::SERVICE_UNAVAILABLE, msg);
    }

    let msg = format!("Unhandled internal error: {error}");
    error!("{}", msg);
    WebError::internal(msg)
}

#[tokio::test]
async fn test_handle_error() {
    use axum::response::IntoResponse;
    use hazard_report_shared::api::ErrorResponse;

    async fn body_of(res: Response<Body>) -> ErrorResponse {
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("error body is json")
    }

    let err = tower::timeout::error::Elapsed::new();
    let res = handle_error(Box::new(err)).await.into_response();
    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body_of(res).await, ErrorResponse::new("request timed out"));

    let err = tower::load_shed::error::Overloaded::new();
    let res = handle_error(Box::new(err)).await.into_response();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_of(res).await,
        ErrorResponse::new("service is overloaded, try again later")
    );

    let res = handle_error("boom".into()).await.into_response();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body_of(res).await.ok);
}
