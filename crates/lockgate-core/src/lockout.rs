//! Lockout policy for brute-force protection
//!
//! A fixed number of consecutive failures locks the form for a fixed
//! duration:
//!
//! - 1-2 failures: no lockout, the attempt counter is shown
//! - 3 failures: locked for 5 minutes

use std::time::Duration;

/// Default failures before lockout
pub const DEFAULT_THRESHOLD: u32 = 3;

/// Default lockout duration (5 minutes)
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(5 * 60);

/// Lockout policy for failed login attempts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger a lockout
    pub threshold: u32,
    /// How long a lockout lasts
    pub duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            duration: DEFAULT_LOCKOUT,
        }
    }
}

impl LockoutPolicy {
    /// Create a custom lockout policy
    pub fn new(threshold: u32, duration: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            duration,
        }
    }

    /// Get the lockout duration for the given number of failed attempts
    /// Returns None if not yet locked out
    pub fn lockout_duration(&self, failed_attempts: u32) -> Option<Duration> {
        self.is_locked(failed_attempts).then_some(self.duration)
    }

    /// Check if the form should be locked
    pub fn is_locked(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.threshold
    }

    /// Attempts left before the lockout kicks in
    pub fn attempts_remaining(&self, failed_attempts: u32) -> u32 {
        self.threshold.saturating_sub(failed_attempts)
    }

    /// Lockout deadline (epoch millis) for a lockout starting at `now_millis`
    pub fn deadline(&self, now_millis: i64) -> i64 {
        let duration_ms = i64::try_from(self.duration.as_millis()).unwrap_or(i64::MAX);
        now_millis.saturating_add(duration_ms)
    }

    /// Whole seconds until `deadline_millis`, rounded up, zero once passed
    pub fn remaining_seconds(deadline_millis: i64, now_millis: i64) -> u64 {
        let remaining_ms = deadline_millis.saturating_sub(now_millis);
        if remaining_ms <= 0 {
            return 0;
        }
        (remaining_ms as u64).div_ceil(1000)
    }

    /// User-facing message for a failed attempt below the threshold
    pub fn failure_message(&self, failed_attempts: u32) -> String {
        format!(
            "Login failed (Attempt {}/{})",
            failed_attempts, self.threshold
        )
    }

    /// Get a human-readable description of the current lockout state
    pub fn describe_lockout(&self, failed_attempts: u32) -> String {
        if let Some(duration) = self.lockout_duration(failed_attempts) {
            let secs = duration.as_secs();
            if secs < 60 {
                format!("Locked for {} seconds", secs)
            } else if secs < 3600 {
                format!("Locked for {} minutes", secs / 60)
            } else {
                format!("Locked for {} hours", secs / 3600)
            }
        } else {
            format!(
                "{} attempts remaining",
                self.attempts_remaining(failed_attempts)
            )
        }
    }
}

/// Format a countdown as MM:SS
pub fn format_countdown(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
