//! Authenticator seam
//!
//! The controller awaits a single call per attempt and only sees success
//! (a token) or an opaque failure. Retries, if any, belong to the
//! implementation.

use async_trait::async_trait;
use thiserror::Error;

/// Opaque authentication failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Authentication failed: {reason}")]
pub struct AuthFailure {
    /// Human-readable reason, never shown to the user by the controller
    pub reason: String,
}

impl AuthFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Validates credentials
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Attempt a login, returning an auth token on success
    ///
    /// `online` is the connectivity status the controller last observed.
    async fn login(&self, username: &str, password: &str, online: bool)
        -> Result<String, AuthFailure>;
}

/// Fixed-credential authenticator for demos and tests
#[derive(Debug, Clone)]
pub struct DemoAuthenticator {
    username: String,
    password: String,
    token: String,
}

impl Default for DemoAuthenticator {
    fn default() -> Self {
        Self::new("kayvan", "123456", "fake-jwt-token")
    }
}

impl DemoAuthenticator {
    /// Accept exactly `username` / `password`, answering with `token`
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for DemoAuthenticator {
    async fn login(
        &self,
        username: &str,
        password: &str,
        online: bool,
    ) -> Result<String, AuthFailure> {
        if !online {
            return Err(AuthFailure::new("Offline"));
        }
        if username != self.username || password != self.password {
            return Err(AuthFailure::new("Invalid credentials"));
        }
        Ok(self.token.clone())
    }
}
