//! Listener bootstrap shared by both servers.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

/// Time in-flight requests get to finish once shutdown begins.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Certificate and key PEM files.
#[derive(Debug, Clone, Copy)]
pub struct TlsFiles<'a> {
    pub cert: &'a Path,
    pub key: &'a Path,
}

/// Serves `router` on `addr` until Ctrl-C.
///
/// # Errors
///
/// Returns an error when the listener cannot be bound or the TLS material
/// cannot be loaded.
pub async fn serve(
    router: Router,
    addr: SocketAddr,
    tls: Option<TlsFiles<'_>>,
    name: &str,
) -> Result<()> {
    if let Some(tls) = tls {
        // reqwest and axum-server each enable a different rustls backend
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        info!("TLS enabled, loading cert from {}", tls.cert.display());
        let tls_config = RustlsConfig::from_pem_file(tls.cert, tls.key)
            .await
            .context("failed to load TLS certificates")?;

        let handle = Handle::<SocketAddr>::new();
        let shutdown = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        info!("{name} ready on https://{addr}");
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(router.into_make_service())
            .await
            .context("HTTPS server error")?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        info!("{name} ready on http://{addr} (TLS disabled)");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;
    }

    info!("{name} shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
