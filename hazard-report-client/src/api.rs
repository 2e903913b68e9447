//! What the wizard needs from the backend
//!

use std::sync::Arc;

use async_trait::async_trait;
use hazard_report_shared::attachment::Attachment;
use hazard_report_shared::report::{Report, ReportFields, ReportPatch};

use crate::error::ClientError;
use crate::upload::LocalFile;

/// Called with the percentage (0-100) of an upload sent so far.
pub type Progress = Arc<dyn Fn(u8) + Send + Sync>;

#[async_trait]
pub trait ReportApi: Send + Sync {
    async fn list_reports(&self) -> Result<Vec<Report>, ClientError>;

    async fn get_report(&self, id: i64) -> Result<Report, ClientError>;

    /// Returns the id the server assigned.
    async fn create_report(&self, fields: &ReportFields) -> Result<i64, ClientError>;

    async fn update_report(&self, id: i64, patch: &ReportPatch) -> Result<Report, ClientError>;

    async fn delete_report(&self, id: i64) -> Result<(), ClientError>;

    async fn upload_file(&self, file: &LocalFile, progress: Progress)
        -> Result<Attachment, ClientError>;

    /// Deletes a stored file, dropping the reference from `report_id` if given.
    async fn delete_upload(
        &self,
        stored_name: &str,
        report_id: Option<i64>,
    ) -> Result<(), ClientError>;

    /// The PDF bytes for the given reports.
    async fn export_pdf(&self, ids: &[i64]) -> Result<Vec<u8>, ClientError>;
}
