//! HTTP client of the management API.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use dispatch_common::{
    AgentDescriptor, AgentList, AgentRuntime, AuthenticateRequest, MemoryUsageReport, NewAgent,
    StateChange, TargetState,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::application::ports::ManagementApi;
use crate::domain::error::ManagementError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Unreserved URL characters stay as they are in path segments.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub struct HttpManagementClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpManagementClient {
    /// `ca_cert` adds a PEM root certificate for an https manager.
    ///
    /// # Errors
    ///
    /// Returns an error when the certificate cannot be read or the client
    /// cannot be built.
    pub fn new(base_url: &str, ca_cert: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(path) = ca_cert {
            let pem = std::fs::read(path)
                .with_context(|| format!("reading CA certificate {}", path.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("parsing CA certificate {}", path.display()))?;
            builder = builder.add_root_certificate(cert);
        }
        Ok(Self {
            client: builder.build().context("building management client")?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.extend(utf8_percent_encode(segment, SEGMENT));
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ManagementError> {
        let response = request
            .send()
            .await
            .map_err(|e| ManagementError::Transport(e.to_string()))?;
        let status = response.status();
        match ManagementError::from_status(status.as_u16(), status.canonical_reason().unwrap_or("")) {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ManagementError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ManagementError::Decode(e.to_string()))
    }

    async fn change_state(
        &self,
        name: &str,
        state: TargetState,
    ) -> Result<AgentRuntime, ManagementError> {
        let request = self
            .client
            .put(self.url(&["agents", name, "state"]))
            .json(&StateChange { state });
        self.json(request).await
    }
}

#[async_trait]
impl ManagementApi for HttpManagementClient {
    async fn list_agents(&self) -> Result<AgentList, ManagementError> {
        self.json(self.client.get(self.url(&["agents"]))).await
    }

    async fn get_agent(&self, name: &str) -> Result<AgentDescriptor, ManagementError> {
        self.json(self.client.get(self.url(&["agents", name]))).await
    }

    async fn agent_runtime(&self, name: &str) -> Result<AgentRuntime, ManagementError> {
        self.json(self.client.get(self.url(&["agents", name, "runtime"])))
            .await
    }

    async fn start_agent(&self, name: &str) -> Result<AgentRuntime, ManagementError> {
        self.change_state(name, TargetState::Running).await
    }

    async fn stop_agent(&self, name: &str) -> Result<AgentRuntime, ManagementError> {
        self.change_state(name, TargetState::Stopped).await
    }

    async fn authenticate(&self, name: &str, password: &str) -> Result<(), ManagementError> {
        let request = self
            .client
            .post(self.url(&["agents", name, "authenticate"]))
            .json(&AuthenticateRequest {
                password: password.to_string(),
            });
        self.send(request).await.map(|_| ())
    }

    async fn add_agent(&self, name: &str, password: &str) -> Result<(), ManagementError> {
        let request = self.client.post(self.url(&["agents"])).json(&NewAgent {
            name: name.to_string(),
            password: password.to_string(),
        });
        self.send(request).await.map(|_| ())
    }

    async fn memory_usage(&self) -> Result<MemoryUsageReport, ManagementError> {
        self.json(self.client.get(self.url(&["stats", "memory_usage"])))
            .await
    }
}
