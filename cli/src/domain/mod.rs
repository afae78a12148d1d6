//! Domain layer: pure business logic and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod adapter;
pub mod agent;
pub mod credentials;
pub mod error;
pub mod headers;
pub mod login;
pub mod port_pool;
pub mod registry;
pub mod startup;

pub use adapter::{CustomAdapter, DATA_MOUNT, DockerAdapter, MailpileAdapter};
pub use error::{AgentStoreError, ForwardError, ManagementError, OrchestratorError};
pub use port_pool::PortPool;
pub use registry::{AgentRegistry, Claim};
pub use startup::{StartupWait, WaitPolicy, WaitStep};
