pub mod api;
pub mod attachment;
pub mod error;
pub mod report;
pub mod validation;

/// Port the backend listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 4000;

/// Header carrying the shared secret for the gated endpoints.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Path prefix under which stored attachments are served.
pub const UPLOADS_PATH: &str = "/uploads";

pub struct AddrInfo {
    pub addr: String,
    pub port: u16,
    pub https: bool,
}

impl AddrInfo {
    pub fn as_url(&self) -> String {
        let scheme = match self.https {
            true => "https",
            false => "http",
        };
        format!("{}://{}:{}", scheme, self.addr, self.port)
    }

    pub fn as_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    /// The same address one port higher, used when the current port is taken.
    pub fn next_port(&self) -> Option<Self> {
        Some(Self {
            addr: self.addr.clone(),
            port: self.port.checked_add(1)?,
            https: self.https,
        })
    }

    pub fn from_env() -> Self {
        let https = match std::env::var("HAZARD_REPORT_HTTPS") {
            Ok(val) => val == "true",
            Err(_) => false,
        };

        let port: u16 = match std::env::var("HAZARD_REPORT_PORT").or_else(|_| std::env::var("PORT"))
        {
            Ok(val) => val.parse().unwrap_or(DEFAULT_PORT),
            Err(_) => DEFAULT_PORT,
        };

        Self {
            addr: std::env::var("HAZARD_REPORT_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port,
            https,
        }
    }
}
