//! Relays requests to agents over plain HTTP.

use std::error::Error as _;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::redirect::Policy;

use crate::application::ports::{BackendResponse, ForwardRequest, Forwarder};
use crate::domain::error::ForwardError;

pub struct HttpForwarder {
    client: reqwest::Client,
    host: String,
    timeout: Duration,
}

impl HttpForwarder {
    /// Redirects are handed back to the caller, never followed.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(host: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .context("building forwarding client")?;
        Ok(Self {
            client,
            host: host.into(),
            timeout,
        })
    }

    fn classify(&self, err: &reqwest::Error) -> ForwardError {
        if err.is_timeout() {
            ForwardError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            ForwardError::Transport(error_chain(err))
        }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(
        &self,
        port: u16,
        request: ForwardRequest,
    ) -> Result<BackendResponse, ForwardError> {
        let url = format!("http://{}:{port}{}", self.host, request.path_and_query);
        let mut builder = self
            .client
            .request(request.method, url)
            .headers(request.headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(|e| self.classify(&e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.classify(&e))?;
        Ok(BackendResponse {
            status,
            headers,
            body,
        })
    }
}

/// `outer: inner: root` rendering of an error and its sources.
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
