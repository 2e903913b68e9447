use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use hazard_report_shared::api::{CreatedResponse, ErrorResponse, OkResponse, ReportResponse};
use hazard_report_shared::report::{Report, ReportFields, ReportPatch};
use tracing::{debug, info};

use crate::error::WebError;
use crate::SharedState;

/// Turns axum's plain-text body rejection into the JSON error shape.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, WebError> {
    match body {
        Ok(Json(val)) => Ok(val),
        Err(rejection) => {
            debug!("Rejected request body: {}", rejection.body_text());
            Err(WebError::bad_request(rejection.body_text()))
        }
    }
}

/// A report id that doesn't parse can't name a stored report.
pub(crate) fn report_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, WebError> {
    match id {
        Ok(Path(id)) => Ok(id),
        Err(rejection) => {
            debug!("Rejected report id: {}", rejection.body_text());
            Err(WebError::not_found("Report not found"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/reports",
    responses(
        (status = 200, description = "Every stored report", body = Vec<Report>),
        (status = 500, description = "The report store couldn't be read", body = ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn list_reports(State(state): State<SharedState>) -> Result<Json<Vec<Report>>, WebError> {
    let repo = state.read().await.repo.clone();
    let reports = repo.list().await?;
    debug!("Listing {} reports", reports.len());
    Ok(Json(reports))
}

#[utoipa::path(
    get,
    path = "/api/reports/{id}",
    params(("id" = i64, Path, description = "Report id")),
    responses(
        (status = 200, description = "The report", body = Report),
        (status = 404, description = "No report with that id", body = ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn get_report(
    id: Result<Path<i64>, PathRejection>,
    State(state): State<SharedState>,
) -> Result<Json<Report>, WebError> {
    let id = report_id(id)?;
    let repo = state.read().await.repo.clone();
    Ok(Json(repo.get(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = ReportFields,
    responses(
        (status = 201, description = "Report stored", body = CreatedResponse),
        (status = 400, description = "Body isn't a report", body = ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn create_report(
    State(state): State<SharedState>,
    body: Result<Json<ReportFields>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedResponse>), WebError> {
    let fields = json_body(body)?;
    let repo = state.read().await.repo.clone();
    let report = repo.create(fields).await?;
    info!("Created report {}", report.id);
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            ok: true,
            id: report.id,
        }),
    ))
}

#[utoipa::path(
    put,
    path = "/api/reports/{id}",
    params(("id" = i64, Path, description = "Report id")),
    request_body = ReportPatch,
    responses(
        (status = 200, description = "The report after the update", body = ReportResponse),
        (status = 401, description = "Missing or wrong api key", body = ErrorResponse),
        (status = 404, description = "No report with that id", body = ErrorResponse)
    ),
    tag = "reports",
    security(("api_key" = []))
)]
pub async fn update_report(
    id: Result<Path<i64>, PathRejection>,
    State(state): State<SharedState>,
    body: Result<Json<ReportPatch>, JsonRejection>,
) -> Result<Json<ReportResponse>, WebError> {
    let id = report_id(id)?;
    let patch = json_body(body)?;
    let repo = state.read().await.repo.clone();
    let report = repo.update(id, patch).await?;
    info!("Updated report {}", id);
    Ok(Json(ReportResponse { ok: true, report }))
}

#[utoipa::path(
    delete,
    path = "/api/reports/{id}",
    params(("id" = i64, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report and its attachment files deleted", body = OkResponse),
        (status = 401, description = "Missing or wrong api key", body = ErrorResponse),
        (status = 404, description = "No report with that id", body = ErrorResponse)
    ),
    tag = "reports",
    security(("api_key" = []))
)]
pub async fn delete_report(
    id: Result<Path<i64>, PathRejection>,
    State(state): State<SharedState>,
) -> Result<Json<OkResponse>, WebError> {
    let id = report_id(id)?;
    let repo = state.read().await.repo.clone();
    repo.delete(id).await?;
    info!("Deleted report {}", id);
    Ok(Json(OkResponse::default()))
}
