//! Guard configuration
//!
//! Loaded from a JSON file. Missing fields fall back to defaults, so an empty
//! object `{}` is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::ControllerSettings;
use crate::error::{LockgateError, Result};
use crate::lockout::LockoutPolicy;

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "LOCKGATE_CONFIG";

/// Configuration directory name under the platform config/data dirs
const APP_DIR_NAME: &str = "lockgate";

/// Configuration file name
const CONFIG_FILE_NAME: &str = "config.json";

/// Login guard configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Consecutive failures before lockout
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Lockout length (seconds)
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,

    /// Countdown tick interval (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Minimum password length for the login button
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,

    /// Upper bound on one authentication call (seconds), `null` to wait forever
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: Option<u64>,

    /// Credential store file
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// `host:port` probed for connectivity
    #[serde(default = "default_probe_addr")]
    pub probe_addr: String,

    /// Time between connectivity probes (seconds)
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Connect timeout per probe (milliseconds)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_lockout_secs() -> u64 {
    5 * 60
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_min_password_len() -> usize {
    crate::state::MIN_PASSWORD_LENGTH
}

fn default_auth_timeout_secs() -> Option<u64> {
    Some(30)
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("credentials.json")
}

fn default_probe_addr() -> String {
    "1.1.1.1:443".to_string()
}

fn default_probe_interval_secs() -> u64 {
    5
}

fn default_probe_timeout_ms() -> u64 {
    1500
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            lockout_secs: default_lockout_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            min_password_len: default_min_password_len(),
            auth_timeout_secs: default_auth_timeout_secs(),
            store_path: default_store_path(),
            probe_addr: default_probe_addr(),
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl GuardConfig {
    /// Config file location: `$LOCKGATE_CONFIG`, else the platform config dir
    pub fn config_file_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| LockgateError::Config(format!("{:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, or defaults when no file exists
    pub fn load_or_default() -> Result<Self> {
        match Self::config_file_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved config to {:?}", path);
        Ok(())
    }

    /// Create the store directory if it doesn't exist
    pub fn ensure_directories(&self) -> Result<()> {
        if let Some(parent) = self.store_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Reject values the controller cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(LockgateError::Config(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.lockout_secs == 0 {
            return Err(LockgateError::Config(
                "lockout_secs must be positive".to_string(),
            ));
        }
        if self.auth_timeout_secs == Some(0) {
            return Err(LockgateError::Config(
                "auth_timeout_secs must be positive or null".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(LockgateError::Config(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Lockout policy described by this config
    pub fn policy(&self) -> LockoutPolicy {
        LockoutPolicy::new(
            self.failure_threshold,
            Duration::from_secs(self.lockout_secs),
        )
    }

    /// Controller settings described by this config
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            policy: self.policy(),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            min_password_len: self.min_password_len,
            auth_timeout: self.auth_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Connectivity probe interval
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Connectivity probe connect timeout
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.lockout_secs, 300);
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.min_password_len, 6);
        assert_eq!(config.auth_timeout_secs, Some(30));
        assert!(config.store_path.ends_with("lockgate/credentials.json"));
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: GuardConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GuardConfig::default());
    }

    #[test]
    fn test_config_round_trip_on_disk() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");

        let config = GuardConfig {
            failure_threshold: 5,
            lockout_secs: 60,
            auth_timeout_secs: None,
            store_path: temp_dir.path().join("store.json"),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = GuardConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "failure_threshold": 0 }"#).unwrap();

        let err = GuardConfig::load(&path).unwrap_err();
        assert!(matches!(err, LockgateError::Config(_)));
    }

    #[test]
    fn test_invalid_lockout_duration_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "lockout_secs": 0 }"#).unwrap();

        let err = GuardConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("lockout_secs"));
    }

    #[test]
    fn test_invalid_auth_timeout_rejected() {
        let config = GuardConfig {
            auth_timeout_secs: Some(0),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth_timeout_secs"));

        let config = GuardConfig {
            auth_timeout_secs: None,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_tick_interval_rejected() {
        let config = GuardConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(LockgateError::Config(_))));
    }

    #[test]
    fn test_controller_settings() {
        let config = GuardConfig {
            failure_threshold: 4,
            lockout_secs: 10,
            tick_interval_ms: 250,
            auth_timeout_secs: None,
            ..Default::default()
        };
        let settings = config.controller_settings();
        assert_eq!(settings.policy.threshold, 4);
        assert_eq!(settings.policy.duration, Duration::from_secs(10));
        assert_eq!(settings.tick_interval, Duration::from_millis(250));
        assert!(settings.auth_timeout.is_none());
    }
}
