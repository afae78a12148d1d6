//! HTTP surfaces: the authenticating proxy and the management API.

pub mod management;
pub mod proxy;
pub mod serve;
