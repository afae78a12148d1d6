//! Dispatch library: agent orchestration, the management API and the
//! authenticating reverse proxy. Exposed for the binary and integration
//! tests.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod application;
pub mod cli;
pub mod commands;
pub mod domain;
pub mod http;
pub mod infra;
pub mod output;
