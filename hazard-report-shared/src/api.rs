//! Request and response bodies for the HTTP API
//!

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::attachment::Attachment;
use crate::report::Report;

/// `{"ok": false, "error": "..."}`, the body of every failed request.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

/// Plain `{"ok": true}` acknowledgement.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

impl Default for OkResponse {
    fn default() -> Self {
        Self { ok: true }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct CreatedResponse {
    pub ok: bool,
    pub id: i64,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ReportResponse {
    pub ok: bool,
    pub report: Report,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct UploadResponse {
    pub ok: bool,
    pub file: Attachment,
}

/// Body of `POST /api/export/pdf`, either `{"ids": [...]}` or `{"id": n}`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct ExportRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl ExportRequest {
    pub fn for_ids(ids: Vec<i64>) -> Self {
        Self {
            ids: Some(ids),
            id: None,
        }
    }

    /// Requested ids in order with duplicates dropped; `ids` wins over `id`.
    pub fn requested_ids(&self) -> Vec<i64> {
        let raw = match (&self.ids, self.id) {
            (Some(ids), _) => ids.clone(),
            (None, Some(id)) => vec![id],
            (None, None) => Vec::new(),
        };
        let mut seen = Vec::with_capacity(raw.len());
        for id in raw {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        seen
    }
}

/// Query string of `DELETE /api/uploads/{filename}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DeleteUploadQuery {
    /// Report whose attachment list should also drop the file
    #[serde(
        default,
        deserialize_with = "lenient_report_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub report_id: Option<i64>,
}

/// A `reportId` that isn't a number is ignored, the file still gets deleted.
fn lenient_report_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|val| val.trim().parse().ok()))
}
