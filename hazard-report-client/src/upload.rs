//! Attachment uploads for the wizard
//!

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use hazard_report_shared::attachment::{check_upload, Attachment};
use tracing::{info, warn};

use crate::api::{Progress, ReportApi};
use crate::error::ClientError;
use crate::wizard::ReportWizard;

/// The wizard as seen by concurrent uploads and their progress callbacks.
pub type SharedWizard = Arc<Mutex<ReportWizard>>;

/// A file picked for upload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LocalFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Reads a file from disk, guessing the type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(name, mime_for_path(path), bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Size and type limits, checked before anything is sent.
    pub fn check(&self) -> Result<(), ClientError> {
        check_upload(self.size(), &self.content_type).map_err(ClientError::from)
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// What happened to one selected file.
#[derive(Debug)]
pub struct UploadOutcome {
    pub name: String,
    pub result: Result<Attachment, ClientError>,
}

fn lock(wizard: &SharedWizard) -> MutexGuard<'_, ReportWizard> {
    // a panicked progress callback shouldn't wedge the wizard
    wizard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn upload_one(wizard: &SharedWizard, api: &dyn ReportApi, file: &LocalFile) -> UploadOutcome {
    let name = file.name.clone();
    if let Err(err) = file.check() {
        warn!("Not uploading {}: {}", name, err);
        return UploadOutcome {
            name,
            result: Err(err),
        };
    }

    let local_id = lock(wizard).begin_upload(&file.name, &file.content_type, file.size());
    let progress: Progress = {
        let wizard = wizard.clone();
        Arc::new(move |percent: u8| {
            lock(&wizard).set_progress(local_id, percent);
        })
    };

    let result = api.upload_file(file, progress).await;
    match &result {
        Ok(attachment) => {
            info!("Uploaded {} as {}", name, attachment.url);
            lock(wizard).complete_upload(local_id, attachment.clone());
        }
        Err(err) => {
            warn!("Upload of {} failed: {}", name, err);
            lock(wizard).fail_upload(local_id);
        }
    }
    UploadOutcome { name, result }
}

/// Uploads every file at once, each with its own placeholder on the draft.
///
/// Files failing the local checks get no placeholder. Outcomes come back in
/// selection order whatever order the uploads finish in.
pub async fn upload_files(
    wizard: &SharedWizard,
    api: &dyn ReportApi,
    files: &[LocalFile],
) -> Vec<UploadOutcome> {
    join_all(files.iter().map(|file| upload_one(wizard, api, file))).await
}

/// Submits the shared wizard's draft, holding the lock only around the checks
/// and the reset so uploads and progress updates carry on meanwhile.
pub async fn submit_shared(wizard: &SharedWizard, api: &dyn ReportApi) -> Result<i64, ClientError> {
    let fields = lock(wizard).prepare_submit()?;
    let id = api.create_report(&fields).await?;
    info!("Submitted report {}", id);
    lock(wizard).finish_submit(id);
    Ok(id)
}
