//! In-memory [ReportApi] for the client tests

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hazard_report_shared::attachment::Attachment;
use hazard_report_shared::report::{Report, ReportFields, ReportPatch};

use crate::api::{Progress, ReportApi};
use crate::error::ClientError;
use crate::upload::LocalFile;

/// Uploads take a millisecond per byte and fail for names starting with `fail`.
#[derive(Default)]
pub(crate) struct FakeApi {
    reports: Mutex<Vec<Report>>,
    uploaded: Mutex<Vec<String>>,
}

impl FakeApi {
    pub(crate) fn created(&self) -> Vec<(i64, ReportFields)> {
        self.reports
            .lock()
            .expect("reports lock")
            .iter()
            .map(|r| (r.id, r.fields.clone()))
            .collect()
    }

    /// Names of successful uploads, in completion order.
    pub(crate) fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().expect("uploads lock").clone()
    }

    fn not_found() -> ClientError {
        ClientError::Api {
            status: 404,
            message: "Report not found".to_string(),
        }
    }
}

#[async_trait]
impl ReportApi for FakeApi {
    async fn list_reports(&self) -> Result<Vec<Report>, ClientError> {
        Ok(self.reports.lock().expect("reports lock").clone())
    }

    async fn get_report(&self, id: i64) -> Result<Report, ClientError> {
        self.reports
            .lock()
            .expect("reports lock")
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn create_report(&self, fields: &ReportFields) -> Result<i64, ClientError> {
        let mut reports = self.reports.lock().expect("reports lock");
        let id = reports.len() as i64 + 1;
        reports.push(Report::new(id, fields.clone()));
        Ok(id)
    }

    async fn update_report(&self, id: i64, patch: &ReportPatch) -> Result<Report, ClientError> {
        let mut reports = self.reports.lock().expect("reports lock");
        let report = reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(Self::not_found)?;
        patch.clone().apply(report);
        Ok(report.clone())
    }

    async fn delete_report(&self, id: i64) -> Result<(), ClientError> {
        let mut reports = self.reports.lock().expect("reports lock");
        let before = reports.len();
        reports.retain(|r| r.id != id);
        match reports.len() < before {
            true => Ok(()),
            false => Err(Self::not_found()),
        }
    }

    async fn upload_file(
        &self,
        file: &LocalFile,
        progress: Progress,
    ) -> Result<Attachment, ClientError> {
        progress(50);
        tokio::time::sleep(Duration::from_millis(file.size())).await;
        if file.name.starts_with("fail") {
            return Err(ClientError::Api {
                status: 500,
                message: "Upload failed".to_string(),
            });
        }
        progress(100);
        self.uploaded
            .lock()
            .expect("uploads lock")
            .push(file.name.clone());
        let stored = format!("1700000000000-{}", file.name);
        Ok(Attachment {
            name: file.name.clone(),
            url: format!("http://localhost:4000/uploads/{}", stored),
            content_type: file.content_type.clone(),
            size: file.size(),
            stored_name: Some(stored),
        })
    }

    async fn delete_upload(
        &self,
        _stored_name: &str,
        _report_id: Option<i64>,
    ) -> Result<(), ClientError> {
        Ok(())
    }

    async fn export_pdf(&self, _ids: &[i64]) -> Result<Vec<u8>, ClientError> {
        Ok(b"%PDF-1.5".to_vec())
    }
}
