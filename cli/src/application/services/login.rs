//! Credential check behind the login form.

use std::sync::Arc;

use crate::application::ports::ManagementApi;
use crate::domain::agent::validate_agent_name;
use crate::domain::error::ManagementError;
use crate::domain::login::LoginOutcome;

pub struct LoginService {
    management: Arc<dyn ManagementApi>,
}

impl LoginService {
    #[must_use]
    pub fn new(management: Arc<dyn ManagementApi>) -> Self {
        Self { management }
    }

    /// Looks the agent up, then verifies its password.
    ///
    /// # Errors
    ///
    /// Returns management API failures that carry no HTTP status: the API
    /// was unreachable or answered with an unreadable body.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, ManagementError> {
        if validate_agent_name(username).is_err() || password.is_empty() {
            return Ok(LoginOutcome::InvalidCredentials);
        }
        match self.check(username, password).await {
            Ok(()) => Ok(LoginOutcome::Authenticated(username.to_string())),
            Err(e) => LoginOutcome::from_error(&e).ok_or(e),
        }
    }

    async fn check(&self, username: &str, password: &str) -> Result<(), ManagementError> {
        self.management.get_agent(username).await?;
        self.management.authenticate(username, password).await
    }
}
