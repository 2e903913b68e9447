//! HTTPS from a local certificate pair
//!

use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use hazard_report_shared::error::HazardError;
use tracing::{debug, error};

pub const CERT_FILE: &str = "localhost.pem";
pub const KEY_FILE: &str = "localhost-key.pem";

/// `(cert, key)` when both files are present in `cert_dir`.
pub fn find_cert_pair(cert_dir: &Path) -> Option<(PathBuf, PathBuf)> {
    let cert = cert_dir.join(CERT_FILE);
    let key = cert_dir.join(KEY_FILE);
    match cert.is_file() && key.is_file() {
        true => Some((cert, key)),
        false => {
            debug!(
                "No {} / {} in {}, serving plain HTTP",
                CERT_FILE,
                KEY_FILE,
                cert_dir.display()
            );
            None
        }
    }
}

pub async fn load_rustls_config(cert: &Path, key: &Path) -> Result<RustlsConfig, HazardError> {
    // several providers can be compiled in, pick one before rustls has to
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    RustlsConfig::from_pem_file(cert, key).await.map_err(|err| {
        error!(
            "Failed to load TLS certificate {} / {}: {:?}",
            cert.display(),
            key.display(),
            err
        );
        HazardError::Other(format!("Failed to load TLS certificate: {}", err))
    })
}
