//! Command implementations

pub mod agents;
pub mod manager;
pub mod memory;
pub mod proxy;
pub mod version;
