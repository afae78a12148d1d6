//! Application services: one module per use-case.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports`, never from `crate::infra`, `crate::commands`,
//! `crate::http` or `crate::output`.

pub mod login;
pub mod management;
pub mod orchestrator;
pub mod proxy;
