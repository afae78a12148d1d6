//! Login results and where each one sends the browser.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use crate::domain::error::ManagementError;

/// Signed cookie carrying the authenticated agent name.
pub const SESSION_COOKIE: &str = "dispatch_user";

pub const LOGIN_PATH: &str = "/auth/login";

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";

pub const UNAVAILABLE_MESSAGE: &str = "Service currently not available";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(String),
    InvalidCredentials,
    ServiceUnavailable,
}

impl LoginOutcome {
    /// Maps an expected management API failure. `None` means the error is
    /// not a login condition and must propagate.
    #[must_use]
    pub fn from_error(err: &ManagementError) -> Option<Self> {
        match err {
            ManagementError::ServiceUnavailable { .. } => Some(Self::ServiceUnavailable),
            ManagementError::Request { .. } => Some(Self::InvalidCredentials),
            ManagementError::Transport(_) | ManagementError::Decode(_) => None,
        }
    }

    /// Location of the redirect answering the login form.
    #[must_use]
    pub fn redirect_target(&self) -> String {
        match self {
            Self::Authenticated(_) => "/".to_string(),
            Self::InvalidCredentials => login_error_location(INVALID_CREDENTIALS_MESSAGE),
            Self::ServiceUnavailable => login_error_location(UNAVAILABLE_MESSAGE),
        }
    }
}

#[must_use]
pub fn login_error_location(message: &str) -> String {
    format!(
        "{LOGIN_PATH}?error={}",
        utf8_percent_encode(message, NON_ALPHANUMERIC)
    )
}
