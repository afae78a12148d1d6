//! Proxy command: serve the authenticating reverse proxy.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dispatch_common::ProxyServerConfig;
use tracing::info;

use crate::application::ports::ManagementApi;
use crate::application::services::login::LoginService;
use crate::application::services::proxy::ProxyService;
use crate::domain::startup::WaitPolicy;
use crate::http::proxy::{ProxyState, router, session_key};
use crate::http::serve::{TlsFiles, serve};
use crate::infra::config::load_proxy_config;
use crate::infra::forwarder::HttpForwarder;
use crate::infra::management_client::HttpManagementClient;
use crate::infra::timer::TokioTimer;

/// Load `DISPATCH_PROXY_*` and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error for invalid configuration or when the listener fails.
pub async fn run() -> Result<()> {
    let config = load_proxy_config()?;
    info!(
        listen_addr = %config.listen_addr,
        manager_url = %config.manager_url,
        tls_enabled = config.tls_enabled(),
        "configuration loaded",
    );
    let state = build_state(&config)?;
    let app = router(state, config.max_body_bytes);
    let tls = tls_files(&config);
    serve(app, config.listen_addr, tls, "proxy").await
}

/// Wires the proxy services for `config`.
///
/// # Errors
///
/// Returns an error when a client cannot be built or the cookie secret is
/// unusable.
pub fn build_state(config: &ProxyServerConfig) -> Result<ProxyState> {
    let management: Arc<dyn ManagementApi> = Arc::new(HttpManagementClient::new(
        &config.manager_url,
        config.manager_ca_cert.as_deref(),
    )?);
    let forwarder = Arc::new(HttpForwarder::new(
        config.backend_host.clone(),
        Duration::from_millis(config.forward_timeout_ms),
    )?);
    let wait = WaitPolicy {
        attempts: config.start_wait_attempts,
        interval: Duration::from_millis(config.start_wait_interval_ms),
    };
    Ok(ProxyState {
        proxy: Arc::new(ProxyService::new(
            Arc::clone(&management),
            forwarder,
            Arc::new(TokioTimer),
            wait,
        )),
        login: Arc::new(LoginService::new(management)),
        key: session_key(&config.cookie_secret)?,
        secure_cookies: config.tls_enabled(),
    })
}

fn tls_files(config: &ProxyServerConfig) -> Option<TlsFiles<'_>> {
    match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => Some(TlsFiles { cert, key }),
        _ => None,
    }
}
