//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: the Docker engine, host
//! processes, HTTP clients, the filesystem and external commands.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands`, `crate::http` or `crate::output` are
//! forbidden.

pub mod build_context;
pub mod command_runner;
pub mod config;
pub mod credentials;
pub mod docker;
pub mod forwarder;
pub mod management_client;
pub mod network;
pub mod process;
pub mod timer;
