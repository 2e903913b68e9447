use axum::extract::multipart::MultipartError;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use hazard_report_shared::api::{DeleteUploadQuery, ErrorResponse, OkResponse, UploadResponse};
use hazard_report_shared::attachment::{Attachment, MAX_UPLOAD_BYTES};
use hazard_report_shared::UPLOADS_PATH;
use tracing::{debug, error, info};
use utoipa::ToSchema;

use crate::error::WebError;
use crate::SharedState;

/// Slack on top of the file size limit for the multipart framing.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

fn multipart_error(err: MultipartError, what: &str) -> WebError {
    error!("{}: {:?}", what, err);
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return WebError::bad_request(format!(
            "File too large: exceeds the {} byte limit",
            MAX_UPLOAD_BYTES
        ));
    }
    WebError::bad_request(format!("{}: {}", what, err.body_text()))
}

/// Shape of the upload form, for the API docs only; the handler reads `Multipart`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// JPEG, PNG or PDF, at most 5 MiB
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}

/// `<scheme>://<host>` the client used to reach us.
pub(crate) fn public_base_url(headers: &HeaderMap, https: bool) -> String {
    let forwarded_https = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .map(|proto| proto.eq_ignore_ascii_case("https"))
        .unwrap_or(false);
    let scheme = match https || forwarded_https {
        true => "https",
        false => "http",
    };
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .unwrap_or("localhost");
    format!("{}://{}", scheme, host)
}

/// Store an uploaded file
/// POST /api/upload
#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(
        content = UploadForm,
        content_type = "multipart/form-data",
        description = "A single `file` field",
    ),
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 400, description = "No file, too large or not an allowed type", body = ErrorResponse)
    ),
    tag = "uploads"
)]
pub async fn upload_attachment(
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), WebError> {
    let (repo, https) = {
        let state = state.read().await;
        (state.repo.clone(), state.config.https)
    };

    let mut filename = None;
    let mut content_type = None;
    let mut data = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, "Failed to read multipart field"))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                content_type = field.content_type().map(|s| s.to_string());
                debug!(
                    "File name: {:?}, content type: {:?}",
                    filename, content_type
                );
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| multipart_error(err, "Failed to read file data"))?,
                );
            }
            _ => {
                debug!("Ignoring unknown multipart field: {}", field_name);
            }
        }
    }

    let data = data.ok_or_else(|| WebError::bad_request("No file uploaded"))?;
    let filename = filename.unwrap_or_else(|| "file".to_string());
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());

    let stored = repo
        .attachments()
        .store(&data, &filename, &content_type)
        .await?;
    info!(
        "Stored upload {} as {} ({} bytes)",
        filename, stored.stored_name, stored.size
    );

    let url = format!(
        "{}{}/{}",
        public_base_url(&headers, https),
        UPLOADS_PATH,
        stored.stored_name
    );
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            ok: true,
            file: Attachment {
                name: filename,
                url,
                content_type,
                size: stored.size,
                stored_name: Some(stored.stored_name),
            },
        }),
    ))
}

/// Delete an uploaded file, and optionally the report's reference to it
/// DELETE /api/uploads/{filename}?reportId=
#[utoipa::path(
    delete,
    path = "/api/uploads/{filename}",
    params(
        ("filename" = String, Path, description = "Stored name of the file"),
        DeleteUploadQuery
    ),
    responses(
        (status = 200, description = "File deleted", body = OkResponse),
        (status = 401, description = "Missing or wrong api key", body = ErrorResponse),
        (status = 404, description = "No such file", body = ErrorResponse)
    ),
    tag = "uploads",
    security(("api_key" = []))
)]
pub async fn delete_upload(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
    query: Result<Query<DeleteUploadQuery>, QueryRejection>,
) -> Result<Json<OkResponse>, WebError> {
    let Query(query) = query.map_err(|rejection| WebError::bad_request(rejection.body_text()))?;
    let repo = state.read().await.repo.clone();
    repo.delete_upload(&filename, query.report_id).await?;
    info!("Deleted upload {}", filename);
    Ok(Json(OkResponse::default()))
}
