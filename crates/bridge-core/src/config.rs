use crate::{BridgeError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// The cloud rejects longer passwords; they are cut to this many characters.
pub const MAX_PASSWORD_LEN: usize = 15;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Steady metering poll interval.
    pub electricity_polling_interval_secs: u64,
    /// Delay of the extra poll after a command that changes power draw.
    pub repoll_delay_secs: u64,
    pub reconnect_backoff_secs: u64,
    /// Upper bound for each teardown phase.
    pub shutdown_grace_secs: u64,
    pub credentials: Credentials,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            electricity_polling_interval_secs: 20,
            repoll_delay_secs: 2,
            reconnect_backoff_secs: 10,
            shutdown_grace_secs: 3,
            credentials: Credentials::default(),
        }
    }
}

impl BridgeConfig {
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let cfg: BridgeConfig =
            serde_yaml::from_str(raw).map_err(|e| BridgeError::Config(e.to_string()))?;
        cfg.validate()
    }

    /// Reject unusable settings and apply the password length limit.
    pub fn validate(mut self) -> Result<Self> {
        if self.electricity_polling_interval_secs == 0 {
            return Err(BridgeError::Config(
                "electricity_polling_interval_secs must be greater than zero".into(),
            ));
        }
        if self.credentials.password.chars().count() > MAX_PASSWORD_LEN {
            warn!("password longer than {MAX_PASSWORD_LEN} characters, truncating");
            self.credentials.password = self
                .credentials
                .password
                .chars()
                .take(MAX_PASSWORD_LEN)
                .collect();
        }
        Ok(self)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.electricity_polling_interval_secs)
    }

    pub fn repoll_delay(&self) -> Duration {
        Duration::from_secs(self.repoll_delay_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Load a YAML config file. A missing file yields the defaults.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<BridgeConfig> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "config file not found, using defaults");
        return Ok(BridgeConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    let cfg = BridgeConfig::from_yaml(&raw)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = BridgeConfig::from_yaml(
            "electricity_polling_interval_secs: 60\ncredentials:\n  email: me@example.com\n",
        )
        .unwrap();
        assert_eq!(cfg.polling_interval(), Duration::from_secs(60));
        assert_eq!(cfg.repoll_delay(), Duration::from_secs(2));
        assert_eq!(cfg.reconnect_backoff(), Duration::from_secs(10));
        assert_eq!(cfg.credentials.email, "me@example.com");
    }

    #[test]
    fn long_passwords_are_truncated() {
        let cfg = BridgeConfig::from_yaml("credentials:\n  password: abcdefghijklmnopqrst\n").unwrap();
        assert_eq!(cfg.credentials.password, "abcdefghijklmno");
    }

    #[test]
    fn zero_polling_interval_is_rejected() {
        let err = BridgeConfig::from_yaml("electricity_polling_interval_secs: 0").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = load_config("/nonexistent/bridge.yaml").unwrap();
        assert_eq!(cfg, BridgeConfig::default());
    }
}
