pub mod api;
pub mod config;

pub use api::*;
pub use config::{ConfigError, ManagerServerConfig, ProxyServerConfig};
