//! Cli things
//!

use std::path::PathBuf;

use clap::Parser;

pub fn data_file_default() -> String {
    "./data/db.json".to_string()
}

pub fn uploads_dir_default() -> String {
    "./uploads".to_string()
}

pub fn logo_path_default() -> String {
    "./public/images/logo.png".to_string()
}

pub fn cert_dir_default() -> String {
    "./certs".to_string()
}

/// Expands a leading `~` so paths from env files work like they do in a shell.
pub fn expand_path(path: &std::path::Path) -> PathBuf {
    shellexpand::tilde(&path.to_string_lossy()).to_string().into()
}

#[derive(Parser, Debug, Default, Clone)]
pub struct CliOpts {
    #[clap(
        long,
        help = "Path to the JSON report store",
        env = "HAZARD_REPORT_DATA_FILE"
    )]
    pub data_file: Option<PathBuf>,

    #[clap(
        long,
        help = "Directory uploaded attachments are kept in",
        env = "HAZARD_REPORT_UPLOADS_DIR"
    )]
    pub uploads_dir: Option<PathBuf>,

    #[clap(
        long,
        help = "Image drawn at the top of every exported PDF page",
        env = "HAZARD_REPORT_LOGO_PATH"
    )]
    pub logo_path: Option<PathBuf>,

    #[clap(
        long,
        help = "Shared secret required in the x-api-key header for mutating requests",
        env = "API_KEY",
        hide_env_values = true
    )]
    pub api_key: Option<String>,

    #[clap(
        long,
        help = "Directory holding localhost.pem and localhost-key.pem for HTTPS",
        env = "HAZARD_REPORT_CERT_DIR"
    )]
    pub cert_dir: Option<PathBuf>,

    #[clap(long, help = "Enable debug logging")]
    pub debug: bool,
}

impl CliOpts {
    pub fn data_file(&self) -> PathBuf {
        expand_path(
            &self
                .data_file
                .clone()
                .unwrap_or_else(|| data_file_default().into()),
        )
    }

    pub fn uploads_dir(&self) -> PathBuf {
        expand_path(
            &self
                .uploads_dir
                .clone()
                .unwrap_or_else(|| uploads_dir_default().into()),
        )
    }

    pub fn logo_path(&self) -> PathBuf {
        expand_path(
            &self
                .logo_path
                .clone()
                .unwrap_or_else(|| logo_path_default().into()),
        )
    }

    pub fn cert_dir(&self) -> PathBuf {
        expand_path(
            &self
                .cert_dir
                .clone()
                .unwrap_or_else(|| cert_dir_default().into()),
        )
    }

    /// An empty key counts as no key, which leaves the gated routes open.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}
