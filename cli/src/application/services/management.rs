//! Use-cases behind the management API routes.

use std::sync::Arc;

use anyhow::Result;
use dispatch_common::{
    AgentDescriptor, AgentList, AgentRuntime, MemoryUsageReport, NewAgent, TargetState,
};
use tracing::info;

use crate::application::ports::CredentialStore;
use crate::application::services::orchestrator::Orchestrator;
use crate::domain::agent::validate_agent_name;
use crate::domain::error::AgentStoreError;

pub struct ManagementService {
    orchestrator: Arc<Orchestrator>,
    credentials: Arc<dyn CredentialStore>,
}

impl ManagementService {
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            orchestrator,
            credentials,
        }
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Every registered agent, running or not.
    pub async fn list_agents(&self) -> Result<AgentList> {
        let mut agents = self.credentials.list().await?;
        agents.sort();
        Ok(AgentList { agents })
    }

    pub async fn describe(&self, name: &str) -> Result<AgentDescriptor> {
        self.require_known(name).await?;
        let runtime = self.orchestrator.runtime(name).await;
        Ok(AgentDescriptor {
            name: name.to_string(),
            state: runtime.state,
        })
    }

    pub async fn runtime(&self, name: &str) -> Result<AgentRuntime> {
        self.require_known(name).await?;
        Ok(self.orchestrator.runtime(name).await)
    }

    /// `running` returns as soon as the start is claimed; `stopped` waits
    /// for the container to stop.
    pub async fn change_state(&self, name: &str, target: TargetState) -> Result<AgentRuntime> {
        self.require_known(name).await?;
        match target {
            TargetState::Running => self.orchestrator.start_detached(name).await,
            TargetState::Stopped => {
                self.orchestrator.stop(name).await?;
                Ok(self.orchestrator.runtime(name).await)
            }
        }
    }

    pub async fn authenticate(&self, name: &str, password: &str) -> Result<()> {
        self.require_known(name).await?;
        if self.credentials.verify(name, password).await? {
            Ok(())
        } else {
            info!(agent = name, "rejected credentials");
            Err(AgentStoreError::InvalidCredentials(name.to_string()).into())
        }
    }

    pub async fn add_agent(&self, agent: &NewAgent) -> Result<()> {
        validate_agent_name(&agent.name)?;
        self.credentials.create(&agent.name, &agent.password).await?;
        info!(agent = %agent.name, "agent registered");
        Ok(())
    }

    pub async fn memory_usage(&self) -> Result<MemoryUsageReport> {
        self.orchestrator.memory_usage().await
    }

    async fn require_known(&self, name: &str) -> Result<()> {
        validate_agent_name(name).map_err(|_| AgentStoreError::NotFound(name.to_string()))?;
        if self.credentials.exists(name).await? {
            Ok(())
        } else {
            Err(AgentStoreError::NotFound(name.to_string()).into())
        }
    }
}
