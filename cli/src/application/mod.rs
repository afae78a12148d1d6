//! Application layer: port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain`, never on `crate::infra`,
//! `crate::commands`, `crate::http` or `crate::output`.

pub mod ports;
pub mod services;

pub use ports::{
    BackendResponse, BuildContextSource, CommandRunner, ContainerDetails, ContainerInfo,
    ContainerRuntime, ContainerSpec, CredentialStore, ForwardRequest, Forwarder, ManagementApi,
    NetworkProbe, ProcessInspector, StopOutcome, Timer,
};
