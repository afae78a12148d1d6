//! Request dispatch: resolve the caller's agent, start it if needed, relay.

use std::sync::Arc;

use anyhow::Result;
use dispatch_common::AgentRuntime;
use tracing::{debug, info, warn};

use crate::application::ports::{
    BackendResponse, ForwardRequest, Forwarder, ManagementApi, Timer,
};
use crate::domain::error::ManagementError;
use crate::domain::headers::{filter_response_headers, forwardable_request_headers};
use crate::domain::startup::{StartupWait, WaitPolicy, WaitStep};

/// How a dispatched request ended.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The agent answered; headers are already reduced to the allow-list.
    Forwarded(BackendResponse),
    /// The agent is not reachable within the wait budget.
    Unavailable,
    /// The agent could not be talked to at the transport level.
    BackendFailed(String),
}

pub struct ProxyService {
    management: Arc<dyn ManagementApi>,
    forwarder: Arc<dyn Forwarder>,
    timer: Arc<dyn Timer>,
    wait: WaitPolicy,
}

impl ProxyService {
    #[must_use]
    pub fn new(
        management: Arc<dyn ManagementApi>,
        forwarder: Arc<dyn Forwarder>,
        timer: Arc<dyn Timer>,
        wait: WaitPolicy,
    ) -> Self {
        Self {
            management,
            forwarder,
            timer,
            wait,
        }
    }

    /// Relays `request` to the agent of the authenticated caller.
    ///
    /// # Errors
    ///
    /// Returns management API failures other than 503; the HTTP boundary
    /// turns them into a 500.
    pub async fn dispatch(&self, agent: &str, request: ForwardRequest) -> Result<DispatchOutcome> {
        let runtime = match self.management.agent_runtime(agent).await {
            Ok(runtime) => runtime,
            Err(ManagementError::ServiceUnavailable { .. }) => {
                return Ok(DispatchOutcome::Unavailable);
            }
            Err(e) => return Err(e.into()),
        };

        let port = match runtime.running_port() {
            Some(port) => port,
            None => match self.start_and_wait(agent).await? {
                Some(port) => port,
                None => return Ok(DispatchOutcome::Unavailable),
            },
        };
        Ok(self.forward(agent, port, request).await)
    }

    /// Issues a start and polls until the agent runs or the budget is spent.
    /// The start is never cancelled; a later request finds the agent running.
    async fn start_and_wait(&self, agent: &str) -> Result<Option<u16>> {
        info!(agent, "agent not running, requesting start");
        match self.management.start_agent(agent).await {
            Ok(runtime) => {
                if let Some(port) = runtime.running_port() {
                    return Ok(Some(port));
                }
            }
            Err(ManagementError::ServiceUnavailable { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut wait = StartupWait::new(self.wait);
        while !wait.is_exhausted() {
            self.timer.sleep(wait.interval()).await;
            let observed = match self.management.agent_runtime(agent).await {
                Ok(runtime) => runtime,
                Err(ManagementError::ServiceUnavailable { .. }) => AgentRuntime::starting(),
                Err(e) => return Err(e.into()),
            };
            match wait.observe(&observed) {
                WaitStep::Forward(port) => {
                    debug!(agent, port, polls = wait.polls(), "agent came up");
                    return Ok(Some(port));
                }
                WaitStep::Retry => {}
                WaitStep::Exhausted => break,
                WaitStep::Failed => {
                    warn!(agent, "agent start failed");
                    return Ok(None);
                }
            }
        }
        warn!(agent, polls = wait.polls(), "agent did not come up in time");
        Ok(None)
    }

    async fn forward(&self, agent: &str, port: u16, request: ForwardRequest) -> DispatchOutcome {
        let request = ForwardRequest {
            headers: forwardable_request_headers(&request.headers),
            ..request
        };
        match self.forwarder.forward(port, request).await {
            Ok(response) => DispatchOutcome::Forwarded(BackendResponse {
                headers: filter_response_headers(&response.headers),
                ..response
            }),
            Err(e) => {
                warn!(agent, port, error = %e, "forward failed");
                DispatchOutcome::BackendFailed(e.to_string())
            }
        }
    }
}
