#![forbid(unsafe_code)]
#![cfg_attr(not(debug_assertions), deny(warnings))] // Forbid warnings in release builds
#![warn(clippy::all, rust_2018_idioms)]

//! Client side of the hazard report builder: the step-by-step wizard, its
//! attachment uploads, the locally saved draft and the HTTP API client.

pub mod api;
pub mod draft;
pub mod error;
pub mod http;
#[cfg(test)]
mod testing;
pub mod upload;
pub mod wizard;

pub use api::{Progress, ReportApi};
pub use draft::{DraftSaver, DraftSnapshot, DraftStore, FileDraftStore};
pub use error::ClientError;
pub use http::ReportsClient;
pub use upload::{submit_shared, upload_files, LocalFile, SharedWizard, UploadOutcome};
pub use wizard::{DraftAttachment, ReportDraft, ReportWizard};
