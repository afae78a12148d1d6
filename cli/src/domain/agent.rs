//! Agent identity rules and on-disk layout.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::error::AgentStoreError;

/// Agent names double as container names and directory names, so they are
/// checked before any path interpolation.
pub static AGENT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    // constant pattern
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z0-9][a-z0-9_.-]{0,62}$").expect("valid regex")
});

/// Validates an agent name.
///
/// # Errors
///
/// Returns [`AgentStoreError::InvalidName`] when the name does not match
/// [`AGENT_NAME_RE`].
pub fn validate_agent_name(name: &str) -> Result<(), AgentStoreError> {
    if AGENT_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(AgentStoreError::InvalidName(name.to_string()))
    }
}

/// `<root>/<name>`
#[must_use]
pub fn instance_path(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

/// `<root>/<name>/data`, bind-mounted into the agent container.
#[must_use]
pub fn data_path(root: &Path, name: &str) -> PathBuf {
    instance_path(root, name).join("data")
}
