//! Login screen state

use serde::{Deserialize, Serialize};

/// Minimum password length for the login button to be enabled
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Message shown while the device is offline
pub const OFFLINE_MESSAGE: &str = "No internet connection";

/// Snapshot of the login form, replaced wholesale on every transition
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginState {
    /// Entered username (trimmed)
    pub username: String,
    /// Entered password
    pub password: String,
    /// Whether to persist the token after a successful login
    pub remember_me: bool,
    /// A login request is in flight
    pub is_loading: bool,
    /// Error message to display
    pub error_message: Option<String>,
    /// The form is locked after too many failures
    pub is_locked_out: bool,
    /// Seconds left until the lockout lifts
    pub lockout_seconds_remaining: u64,
    /// Login succeeded; the front end should leave the form
    pub navigate_to_home: bool,
}

/// Coarse phase of the login state machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginPhase {
    /// Accepting input
    Idle,
    /// Waiting on the authenticator
    Loading,
    /// Locked until the countdown ends
    LockedOut,
    /// Accepting input, with an error on display
    Error(String),
}

impl LoginState {
    /// Login button is enabled when:
    /// - Username is not empty
    /// - Password is at least `min_password_len` characters
    /// - No login request is in progress
    /// - The form is not locked out
    pub fn is_login_button_enabled(&self, min_password_len: usize) -> bool {
        !self.username.is_empty()
            && self.password.chars().count() >= min_password_len
            && !self.is_loading
            && !self.is_locked_out
    }

    /// Whether field edits are accepted
    pub fn accepts_input(&self) -> bool {
        !self.is_loading && !self.is_locked_out
    }

    /// Current phase
    pub fn phase(&self) -> LoginPhase {
        if self.is_locked_out {
            LoginPhase::LockedOut
        } else if self.is_loading {
            LoginPhase::Loading
        } else if let Some(message) = &self.error_message {
            LoginPhase::Error(message.clone())
        } else {
            LoginPhase::Idle
        }
    }

    /// Externally observable shape of this state
    pub fn snapshot(&self, min_password_len: usize) -> StateSnapshot {
        StateSnapshot {
            user_name: self.username.clone(),
            password: self.password.clone(),
            remember_me: self.remember_me,
            is_loading: self.is_loading,
            error_message: self.error_message.clone(),
            is_locked_out: self.is_locked_out,
            lockout_seconds_remaining: self.lockout_seconds_remaining,
            navigate_to_home: self.navigate_to_home,
            is_login_button_enabled: self.is_login_button_enabled(min_password_len),
        }
    }
}

/// State as exposed to a presentation layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub user_name: String,
    pub password: String,
    pub remember_me: bool,
    pub is_loading: bool,
    pub error_message: Option<String>,
    pub is_locked_out: bool,
    pub lockout_seconds_remaining: u64,
    pub navigate_to_home: bool,
    pub is_login_button_enabled: bool,
}

impl StateSnapshot {
    /// Copy with the password masked, for logs and terminals
    pub fn redacted(&self) -> Self {
        Self {
            password: "*".repeat(self.password.chars().count()),
            ..self.clone()
        }
    }
}
