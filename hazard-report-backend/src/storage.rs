use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use hazard_report_shared::attachment::Attachment;
use hazard_report_shared::error::HazardError;
use hazard_report_shared::report::{Report, ReportFields, ReportPatch};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

/// On-disk layout of the report collection.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ReportDb {
    #[serde(default)]
    pub reports: Vec<Report>,
}

impl ReportDb {
    fn position(&self, id: i64) -> Option<usize> {
        self.reports.iter().position(|report| report.id == id)
    }

    /// Creation timestamp in millis, bumped past any existing id so ids stay unique.
    fn next_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        match self.reports.iter().map(|report| report.id).max() {
            Some(highest) if highest >= now => highest + 1,
            _ => now,
        }
    }
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// All reports, in insertion order.
    async fn list(&self) -> Result<Vec<Report>, HazardError>;

    async fn get(&self, id: i64) -> Result<Option<Report>, HazardError>;

    async fn create(&self, fields: ReportFields) -> Result<Report, HazardError>;

    /// Returns `None` if there's no report with that id.
    async fn update(&self, id: i64, patch: ReportPatch) -> Result<Option<Report>, HazardError>;

    /// Removes the report and hands it back so the caller can clean up after it.
    async fn delete(&self, id: i64) -> Result<Option<Report>, HazardError>;

    /// Drops every attachment of report `id` stored under `stored_name`,
    /// returning the removed references.
    async fn remove_attachment_refs(
        &self,
        id: i64,
        stored_name: &str,
    ) -> Result<Vec<Attachment>, HazardError>;
}

/// Reports kept in a single JSON document.
///
/// Every operation holds the lock for its whole read-modify-write, and writes
/// land in a temp file that's renamed over the original.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(path: &Path) -> Result<Self, HazardError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    error!("Failed to create data directory {}: {:?}", parent.display(), err);
                    HazardError::Storage(format!(
                        "Failed to create data directory {}: {}",
                        parent.display(),
                        err
                    ))
                })?;
            }
        }
        let store = Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        };
        // fail at startup rather than on the first request if the file is junk
        let db = store.read_db().await?;
        debug!(
            "Opened report store {} with {} reports",
            store.path.display(),
            db.reports.len()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_db(&self) -> Result<ReportDb, HazardError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReportDb::default())
            }
            Err(err) => {
                return Err(HazardError::Storage(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    err
                )))
            }
        };
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(ReportDb::default());
        }
        serde_json::from_slice(&raw).map_err(|err| {
            error!("Report store {} is malformed: {:?}", self.path.display(), err);
            HazardError::Storage(format!("Malformed report store: {}", err))
        })
    }

    async fn write_db(&self, db: &ReportDb) -> Result<(), HazardError> {
        let body = serde_json::to_vec_pretty(db)?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, body).await.map_err(|err| {
            HazardError::Storage(format!("Failed to write {}: {}", tmp_path.display(), err))
        })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|err| {
                HazardError::Storage(format!(
                    "Failed to replace {}: {}",
                    self.path.display(),
                    err
                ))
            })
    }
}

#[async_trait]
impl ReportStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<Report>, HazardError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_db().await?.reports)
    }

    async fn get(&self, id: i64) -> Result<Option<Report>, HazardError> {
        let _guard = self.lock.lock().await;
        let db = self.read_db().await?;
        Ok(db.reports.into_iter().find(|report| report.id == id))
    }

    async fn create(&self, fields: ReportFields) -> Result<Report, HazardError> {
        let _guard = self.lock.lock().await;
        let mut db = self.read_db().await?;
        let report = Report::new(db.next_id(), fields);
        db.reports.push(report.clone());
        self.write_db(&db).await?;
        debug!("Created report {}", report.id);
        Ok(report)
    }

    async fn update(&self, id: i64, patch: ReportPatch) -> Result<Option<Report>, HazardError> {
        let _guard = self.lock.lock().await;
        let mut db = self.read_db().await?;
        let Some(idx) = db.position(id) else {
            return Ok(None);
        };
        patch.apply(&mut db.reports[idx]);
        let updated = db.reports[idx].clone();
        self.write_db(&db).await?;
        debug!("Updated report {}", id);
        Ok(Some(updated))
    }

    async fn delete(&self, id: i64) -> Result<Option<Report>, HazardError> {
        let _guard = self.lock.lock().await;
        let mut db = self.read_db().await?;
        let Some(idx) = db.position(id) else {
            return Ok(None);
        };
        let removed = db.reports.remove(idx);
        self.write_db(&db).await?;
        debug!("Deleted report {}", id);
        Ok(Some(removed))
    }

    async fn remove_attachment_refs(
        &self,
        id: i64,
        stored_name: &str,
    ) -> Result<Vec<Attachment>, HazardError> {
        let _guard = self.lock.lock().await;
        let mut db = self.read_db().await?;
        let Some(idx) = db.position(id) else {
            return Ok(Vec::new());
        };
        let (removed, kept): (Vec<Attachment>, Vec<Attachment>) = db.reports[idx]
            .fields
            .attachments
            .drain(..)
            .partition(|attachment| attachment.stored_name() == Some(stored_name));
        db.reports[idx].fields.attachments = kept;
        if !removed.is_empty() {
            self.write_db(&db).await?;
            debug!(
                "Removed {} reference(s) to {} from report {}",
                removed.len(),
                stored_name,
                id
            );
        }
        Ok(removed)
    }
}
