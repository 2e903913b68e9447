use std::sync::Arc;

use hazard_report_shared::error::HazardError;
use hazard_report_shared::report::{Report, ReportFields, ReportPatch};
use tracing::{debug, warn};

use crate::storage::ReportStore;
use crate::uploads::AttachmentStore;

/// Report operations with the attachment cleanup that goes with them.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn ReportStore>,
    attachments: AttachmentStore,
}

impl Repository {
    pub fn new(store: Arc<dyn ReportStore>, attachments: AttachmentStore) -> Self {
        Self { store, attachments }
    }

    pub fn attachments(&self) -> &AttachmentStore {
        &self.attachments
    }

    pub async fn list(&self) -> Result<Vec<Report>, HazardError> {
        self.store.list().await
    }

    pub async fn get(&self, id: i64) -> Result<Report, HazardError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| report_not_found(id))
    }

    pub async fn create(&self, fields: ReportFields) -> Result<Report, HazardError> {
        self.store.create(fields).await
    }

    pub async fn update(&self, id: i64, patch: ReportPatch) -> Result<Report, HazardError> {
        self.store
            .update(id, patch)
            .await?
            .ok_or_else(|| report_not_found(id))
    }

    /// Deletes the report, then tries to delete every file it referenced.
    ///
    /// File cleanup failures are logged and don't undo the delete.
    pub async fn delete(&self, id: i64) -> Result<(), HazardError> {
        let report = self
            .store
            .delete(id)
            .await?
            .ok_or_else(|| report_not_found(id))?;

        for attachment in &report.fields.attachments {
            let Some(stored_name) = attachment.stored_name() else {
                debug!(
                    "Attachment {:?} on report {} has no stored file",
                    attachment.name, id
                );
                continue;
            };
            match self.attachments.delete(stored_name).await {
                Ok(true) => {}
                Ok(false) => debug!("Attachment file {} was already gone", stored_name),
                Err(err) => warn!(
                    "Failed to delete attachment file {} for report {}: {}",
                    stored_name, id, err
                ),
            }
        }
        Ok(())
    }

    /// Drops references to `stored_name` from report `id`, if both exist.
    pub async fn delete_attachment_ref(&self, id: i64, stored_name: &str) -> Result<(), HazardError> {
        let removed = self.store.remove_attachment_refs(id, stored_name).await?;
        debug!(
            "Dropped {} reference(s) to {} from report {}",
            removed.len(),
            stored_name,
            id
        );
        Ok(())
    }

    /// Deletes an uploaded file and, when a report is named, its references to it.
    pub async fn delete_upload(
        &self,
        stored_name: &str,
        report_id: Option<i64>,
    ) -> Result<(), HazardError> {
        if !self.attachments.delete(stored_name).await? {
            return Err(HazardError::NotFound("File not found".to_string()));
        }
        if let Some(report_id) = report_id {
            if let Err(err) = self.delete_attachment_ref(report_id, stored_name).await {
                warn!(
                    "Failed to update report {} after deleting attachment {}: {}",
                    report_id, stored_name, err
                );
            }
        }
        Ok(())
    }
}

fn report_not_found(id: i64) -> HazardError {
    debug!("Report {} not found", id);
    HazardError::NotFound("Report not found".to_string())
}
