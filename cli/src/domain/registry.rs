//! Single owner of the agent-name to container mapping and the port pool.
//!
//! Every cross-request mutation goes through one of the methods below while
//! the caller holds the registry lock, so a port can never be handed to two
//! agents and a start can never be claimed twice.

use std::collections::HashMap;

use dispatch_common::{AgentRuntime, RuntimeState};

use crate::domain::error::OrchestratorError;
use crate::domain::port_pool::PortPool;

/// What the registry knows about one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentSlot {
    pub state: RuntimeState,
    /// Leased host port; only set while `Starting` or `Running`.
    pub port: Option<u16>,
    pub container_id: Option<String>,
}

/// Outcome of [`AgentRegistry::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller now owns the start of this agent.
    Claimed,
    /// Another start already owns it, or it is running.
    AlreadyActive(RuntimeState),
}

#[derive(Debug, Default)]
pub struct AgentRegistry {
    ports: PortPool,
    slots: HashMap<String, AgentSlot>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new(ports: PortPool) -> Self {
        Self {
            ports,
            slots: HashMap::new(),
        }
    }

    /// Moves a stopped or failed agent to `Starting`.
    pub fn claim(&mut self, name: &str) -> Claim {
        let slot = self.slots.entry(name.to_string()).or_default();
        if slot.state.is_active() {
            return Claim::AlreadyActive(slot.state);
        }
        slot.state = RuntimeState::Starting;
        Claim::Claimed
    }

    /// Leases a host port for a claimed agent. Idempotent: an agent that
    /// already holds a port gets the same one back.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::PortsExhausted`] when the pool is full.
    pub fn lease(&mut self, name: &str, preferred: Option<u16>) -> Result<u16, OrchestratorError> {
        let slot = self.slots.entry(name.to_string()).or_default();
        if let Some(port) = slot.port {
            return Ok(port);
        }
        let port = match preferred {
            Some(p) => self.ports.lease_preferred(p)?,
            None => self.ports.lease()?,
        };
        slot.port = Some(port);
        Ok(port)
    }

    /// Promotes a starting agent whose backend answered. Returns its port.
    pub fn mark_running(&mut self, name: &str) -> Option<u16> {
        let slot = self.slots.get_mut(name)?;
        if slot.state != RuntimeState::Starting {
            return None;
        }
        let port = slot.port?;
        slot.state = RuntimeState::Running;
        Some(port)
    }

    /// Marks the agent stopped and returns its port to the pool.
    pub fn release(&mut self, name: &str) -> Option<u16> {
        self.settle(name, RuntimeState::Stopped)
    }

    /// Marks the agent failed and returns its port to the pool.
    pub fn fail(&mut self, name: &str) -> Option<u16> {
        self.settle(name, RuntimeState::Failed)
    }

    fn settle(&mut self, name: &str, state: RuntimeState) -> Option<u16> {
        let slot = self.slots.entry(name.to_string()).or_default();
        slot.state = state;
        let port = slot.port.take()?;
        self.ports.release(port);
        Some(port)
    }

    pub fn upsert_container(&mut self, name: &str, container_id: &str) {
        self.slots.entry(name.to_string()).or_default().container_id =
            Some(container_id.to_string());
    }

    pub fn remove_container(&mut self, name: &str) -> Option<String> {
        self.slots.get_mut(name)?.container_id.take()
    }

    /// Registers a container found running at boot with its published port.
    ///
    /// Returns `false` when the agent is already active or the port is
    /// leased to another agent.
    pub fn adopt(&mut self, name: &str, port: u16, container_id: &str) -> bool {
        if self.slots.get(name).is_some_and(|s| s.state.is_active()) || !self.ports.lease_exact(port)
        {
            return false;
        }
        self.slots.insert(
            name.to_string(),
            AgentSlot {
                state: RuntimeState::Running,
                port: Some(port),
                container_id: Some(container_id.to_string()),
            },
        );
        true
    }

    /// Runtime as reported through the management API.
    #[must_use]
    pub fn runtime(&self, name: &str) -> AgentRuntime {
        self.slots
            .get(name)
            .map_or_else(AgentRuntime::stopped, |slot| {
                AgentRuntime::new(slot.state, slot.port)
            })
    }

    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&AgentSlot> {
        self.slots.get(name)
    }

    #[must_use]
    pub fn ports(&self) -> &PortPool {
        &self.ports
    }
}
