use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::HazardError;
use crate::UPLOADS_PATH;

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// MIME types accepted by the upload endpoint.
pub const ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];

/// A file uploaded for a report, as referenced from the report record.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Original display name, not unique
    pub name: String,
    /// Where the bytes can be fetched from
    pub url: String,
    /// MIME type of the file (e.g., "image/png", "application/pdf")
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default)]
    pub size: u64,
    /// Server-generated name of the file in the uploads directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_name: Option<String>,
}

impl Attachment {
    /// The uploads-directory filename this attachment points at.
    ///
    /// Records written before `storedName` existed only carry the URL, so the
    /// name is recovered from the segment after `/uploads/`.
    pub fn stored_name(&self) -> Option<&str> {
        if let Some(name) = self.stored_name.as_deref() {
            return Some(name);
        }
        stored_name_from_url(&self.url)
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Text used when the attachment is rendered as a link.
    pub fn label(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if !self.url.is_empty() {
            &self.url
        } else {
            "Attachment"
        }
    }
}

/// Pull the stored filename out of an uploads URL.
pub fn stored_name_from_url(url: &str) -> Option<&str> {
    let marker = format!("{}/", UPLOADS_PATH);
    let (_, tail) = url.split_once(marker.as_str())?;
    let tail = tail.split(['?', '#']).next().unwrap_or_default();
    match tail.is_empty() {
        true => None,
        false => Some(tail),
    }
}

/// Checks an upload against the size and type limits.
pub fn check_upload(size: u64, content_type: &str) -> Result<(), HazardError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(HazardError::UploadRejected(format!(
            "File too large: {} bytes exceeds the {} byte limit",
            size, MAX_UPLOAD_BYTES
        )));
    }
    if !ALLOWED_MIME_TYPES.contains(&content_type) {
        return Err(HazardError::UploadRejected(format!(
            "File type {} is not allowed, expected one of: {}",
            content_type,
            ALLOWED_MIME_TYPES.join(", ")
        )));
    }
    Ok(())
}
