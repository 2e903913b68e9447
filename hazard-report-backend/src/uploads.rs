//! On-disk attachment storage
//!

use std::path::{Path, PathBuf};

use chrono::Utc;
use hazard_report_shared::attachment::check_upload;
use hazard_report_shared::error::HazardError;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

/// What landed on disk after an upload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StoredFile {
    pub stored_name: String,
    pub size: u64,
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    match cleaned.is_empty() {
        true => "file".to_string(),
        false => cleaned,
    }
}

/// Stored names are bare filenames, anything that could walk out of the
/// uploads directory is refused.
pub fn check_stored_name(stored_name: &str) -> Result<(), HazardError> {
    if stored_name.is_empty()
        || stored_name == "."
        || stored_name == ".."
        || stored_name.contains(['/', '\\', '\0'])
    {
        return Err(HazardError::Validation(format!(
            "Invalid filename: {}",
            stored_name
        )));
    }
    Ok(())
}

/// A flat directory of uploaded files, shared by every report.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
}

impl AttachmentStore {
    pub async fn new(dir: &Path) -> Result<Self, HazardError> {
        tokio::fs::create_dir_all(dir).await.map_err(|err| {
            error!("Failed to create uploads directory {}: {:?}", dir.display(), err);
            HazardError::Io(format!(
                "Failed to create uploads directory {}: {}",
                dir.display(),
                err
            ))
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, stored_name: &str) -> Result<PathBuf, HazardError> {
        check_stored_name(stored_name)?;
        Ok(self.dir.join(stored_name))
    }

    /// Writes the file under `<unix-millis>-<sanitized original name>`.
    ///
    /// Oversized files and disallowed types are refused before anything touches disk.
    pub async fn store(
        &self,
        data: &[u8],
        original_name: &str,
        content_type: &str,
    ) -> Result<StoredFile, HazardError> {
        check_upload(data.len() as u64, content_type)?;

        let safe_name = sanitize_filename(original_name);
        let stamp = Utc::now().timestamp_millis();
        let mut stored_name = format!("{}-{}", stamp, safe_name);
        let mut attempt = 1;
        let mut file = loop {
            let path = self.path_for(&stored_name)?;
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break file,
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    stored_name = format!("{}-{}-{}", stamp, attempt, safe_name);
                    attempt += 1;
                }
                Err(err) => {
                    error!("Failed to create {}: {:?}", path.display(), err);
                    return Err(err.into());
                }
            }
        };

        let written = match file.write_all(data).await {
            Ok(()) => file.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            error!("Failed to write upload {}: {:?}", stored_name, err);
            let _ = tokio::fs::remove_file(self.dir.join(&stored_name)).await;
            return Err(err.into());
        }

        debug!("Stored {} ({} bytes)", stored_name, data.len());
        Ok(StoredFile {
            stored_name,
            size: data.len() as u64,
        })
    }

    /// `Ok(false)` when there was nothing to delete.
    pub async fn delete(&self, stored_name: &str) -> Result<bool, HazardError> {
        let path = self.path_for(stored_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted upload {}", stored_name);
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Whole-file read, `None` if the file isn't there.
    pub async fn resolve(&self, stored_name: &str) -> Result<Option<Vec<u8>>, HazardError> {
        let path = self.path_for(stored_name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazard_report_shared::attachment::MAX_UPLOAD_BYTES;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("site photo (1).png"), "site_photo__1_.png");
        assert_eq!(sanitize_filename("report-v2_final.pdf"), "report-v2_final.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename("café.jpg"), "caf_.jpg");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[test]
    fn test_check_stored_name() {
        assert!(check_stored_name("1700000000000-a.png").is_ok());
        assert!(check_stored_name("1-a..b.png").is_ok());
        assert!(check_stored_name("..").is_err());
        assert!(check_stored_name("../db.json").is_err());
        assert!(check_stored_name("a/b.png").is_err());
        assert!(check_stored_name("a\\b.png").is_err());
        assert!(check_stored_name("").is_err());
    }

    #[tokio::test]
    async fn test_store_resolve_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AttachmentStore::new(&dir.path().join("uploads"))
            .await
            .expect("store");

        let stored = store
            .store(b"%PDF-1.4 test", "site plan.pdf", "application/pdf")
            .await
            .expect("stored");
        assert!(stored.stored_name.ends_with("-site_plan.pdf"));
        assert_eq!(stored.size, 13);

        let data = store
            .resolve(&stored.stored_name)
            .await
            .expect("resolve")
            .expect("exists");
        assert_eq!(data, b"%PDF-1.4 test");

        assert!(store.delete(&stored.stored_name).await.expect("delete"));
        assert!(!store.delete(&stored.stored_name).await.expect("delete again"));
        assert!(store
            .resolve(&stored.stored_name)
            .await
            .expect("resolve")
            .is_none());
    }

    #[tokio::test]
    async fn test_same_name_same_millisecond_does_not_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AttachmentStore::new(dir.path()).await.expect("store");
        let mut names = Vec::new();
        for _ in 0..5 {
            names.push(
                store
                    .store(b"png", "same.png", "image/png")
                    .await
                    .expect("stored")
                    .stored_name,
            );
        }
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);
    }

    #[tokio::test]
    async fn test_rejected_uploads_leave_no_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AttachmentStore::new(dir.path()).await.expect("store");

        let too_big = vec![0u8; MAX_UPLOAD_BYTES as usize + 1];
        assert!(matches!(
            store.store(&too_big, "big.png", "image/png").await,
            Err(HazardError::UploadRejected(_))
        ));
        assert!(matches!(
            store.store(b"hello", "notes.txt", "text/plain").await,
            Err(HazardError::UploadRejected(_))
        ));

        let entries = std::fs::read_dir(dir.path()).expect("read_dir").count();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn test_traversal_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AttachmentStore::new(&dir.path().join("uploads"))
            .await
            .expect("store");
        assert!(matches!(
            store.delete("../secret").await,
            Err(HazardError::Validation(_))
        ));
    }
}
