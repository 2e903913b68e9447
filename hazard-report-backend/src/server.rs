//! Listener setup and serving, plain or TLS
//!

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use hazard_report_shared::error::HazardError;
use hazard_report_shared::AddrInfo;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// How many ports are tried, starting at the configured one.
pub const PORT_ATTEMPTS: usize = 10;

/// Binds `addrinfo`, moving up a port at a time while the port is taken.
pub async fn bind_with_fallback(
    addrinfo: AddrInfo,
    attempts: usize,
) -> Result<(TcpListener, AddrInfo), HazardError> {
    let mut current = addrinfo;
    for attempt in 1..=attempts {
        match TcpListener::bind(current.as_addr()).await {
            Ok(listener) => return Ok((listener, current)),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse && attempt < attempts => {
                let Some(next) = current.next_port() else {
                    break;
                };
                warn!("Port {} is in use, trying {}", current.port, next.port);
                current = next;
            }
            Err(err) => {
                error!("Failed to bind to {}: {:?}", current.as_url(), err);
                return Err(HazardError::Io(format!(
                    "Failed to bind to {}: {}",
                    current.as_addr(),
                    err
                )));
            }
        }
    }
    Err(HazardError::Io(format!(
        "No free port found after {} attempts",
        attempts
    )))
}

pub async fn serve(
    listener: TcpListener,
    addrinfo: &AddrInfo,
    app: Router,
    tls: Option<RustlsConfig>,
) -> Result<(), HazardError> {
    info!("Listening on {}", addrinfo.as_url());
    match tls {
        Some(config) => {
            let listener = listener.into_std()?;
            axum_server::from_tcp_rustls(listener, config)
                .serve(app.into_make_service())
                .await?;
        }
        None => axum::serve(listener, app).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(port: u16) -> AddrInfo {
        AddrInfo {
            addr: "127.0.0.1".to_string(),
            port,
            https: false,
        }
    }

    #[tokio::test]
    async fn test_busy_port_falls_through_to_next() {
        let (taken, first) = bind_with_fallback(local(0), 1).await.expect("bind");
        let busy_port = taken.local_addr().expect("addr").port();
        assert_eq!(first.port, 0);

        match bind_with_fallback(local(busy_port), PORT_ATTEMPTS).await {
            Ok((listener, found)) => {
                assert!(found.port > busy_port);
                assert_eq!(listener.local_addr().expect("addr").port(), found.port);
            }
            // every one of the next ports being taken is possible on a busy box
            Err(err) => assert!(matches!(err, HazardError::Io(_))),
        }
    }

    #[tokio::test]
    async fn test_single_attempt_gives_up() {
        let (taken, _) = bind_with_fallback(local(0), 1).await.expect("bind");
        let busy_port = taken.local_addr().expect("addr").port();
        assert!(matches!(
            bind_with_fallback(local(busy_port), 1).await,
            Err(HazardError::Io(_))
        ));
    }
}
