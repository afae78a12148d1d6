//! Host port leases for agent containers.

use std::collections::BTreeSet;

use crate::domain::error::OrchestratorError;

/// First port handed out when nothing else is configured.
pub const DEFAULT_BASE_PORT: u16 = 5000;

/// Last port handed out; stays below the Linux ephemeral range.
pub const DEFAULT_LAST_PORT: u16 = 32767;

/// Set of host ports currently leased to starting or running agents.
#[derive(Debug, Clone)]
pub struct PortPool {
    first: u16,
    last: u16,
    leased: BTreeSet<u16>,
}

impl Default for PortPool {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PORT, DEFAULT_LAST_PORT)
    }
}

impl PortPool {
    #[must_use]
    pub fn new(first: u16, last: u16) -> Self {
        Self {
            first,
            last,
            leased: BTreeSet::new(),
        }
    }

    /// Leases the lowest free port at or above the base.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::PortsExhausted`] when every port up to
    /// the ceiling is leased.
    pub fn lease(&mut self) -> Result<u16, OrchestratorError> {
        let port = (self.first..=self.last)
            .find(|candidate| !self.leased.contains(candidate))
            .ok_or(OrchestratorError::PortsExhausted {
                first: self.first,
                last: self.last,
            })?;
        self.leased.insert(port);
        Ok(port)
    }

    /// Leases `preferred` when it is in range and free, otherwise the lowest
    /// free port.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::PortsExhausted`] when the pool is full.
    pub fn lease_preferred(&mut self, preferred: u16) -> Result<u16, OrchestratorError> {
        if self.lease_exact(preferred) {
            return Ok(preferred);
        }
        self.lease()
    }

    /// Leases exactly `port`. Returns `false` when it is out of range or taken.
    pub fn lease_exact(&mut self, port: u16) -> bool {
        (self.first..=self.last).contains(&port) && self.leased.insert(port)
    }

    /// Returns `true` when the port was leased.
    pub fn release(&mut self, port: u16) -> bool {
        self.leased.remove(&port)
    }

    #[must_use]
    pub fn is_leased(&self, port: u16) -> bool {
        self.leased.contains(&port)
    }

    #[must_use]
    pub fn leased(&self) -> Vec<u16> {
        self.leased.iter().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leased.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leased.is_empty()
    }
}
