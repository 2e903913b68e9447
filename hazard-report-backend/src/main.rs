use std::{process::ExitCode, sync::Arc};

use axum::Router;
use clap::Parser;
use hazard_report_backend::server::{bind_with_fallback, serve, PORT_ATTEMPTS};
use hazard_report_backend::{build_app, tls, AppState};
use hazard_report_shared::AddrInfo;

use tokio::sync::RwLock;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = hazard_report_backend::cli::CliOpts::parse();

    let my_filter = match cli.debug {
        true => "hazard_report=debug,tower_http=debug",
        false => "hazard_report=info,tower_http=info",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| my_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let tls_config = match tls::find_cert_pair(&cli.cert_dir()) {
        Some((cert, key)) => match tls::load_rustls_config(&cert, &key).await {
            Ok(config) => {
                info!("Serving HTTPS with {}", cert.display());
                Some(config)
            }
            Err(err) => {
                error!("Failed to set up HTTPS: {:?}", err);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let appstate = match AppState::new(&cli, tls_config.is_some()).await {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to initialize application state: {:?}", err);
            return ExitCode::FAILURE;
        }
    };
    let shared_state = Arc::new(RwLock::new(appstate));

    let mut addrinfo = AddrInfo::from_env();
    addrinfo.https |= tls_config.is_some();

    let app: Router = build_app(&shared_state).await;

    let (listener, addrinfo) = match bind_with_fallback(addrinfo, PORT_ATTEMPTS).await {
        Ok(bound) => bound,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = serve(listener, &addrinfo, app, tls_config).await {
        error!("Server stopped: {:?}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
