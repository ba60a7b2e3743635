use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const API_URL_ENV: &str = "CLAUDE_HUB_API_URL";
pub const AUTH_TOKEN_ENV: &str = "CLAUDE_WEBHOOK_SECRET";
pub const REQUEST_TIMEOUT_ENV: &str = "SESSION_HUB_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    pub api_url: String,
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub wait_timeout_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3002/api/webhooks/claude".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
            poll_interval_secs: 10,
            wait_timeout_secs: 3600,
        }
    }
}

impl HubConfig {
    /// `<config dir>/session-hub/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("session-hub").join("config.toml"))
    }

    /// Defaults, then the TOML file (an explicit path must exist; the
    /// default path is optional), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
        if let Some(token) = lookup(AUTH_TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.auth_token = Some(token);
        }
        if let Some(raw) = lookup(REQUEST_TIMEOUT_ENV) {
            self.request_timeout_secs = raw.trim().parse().map_err(|_| {
                HubError::Config(format!("{} must be a whole number of seconds", REQUEST_TIMEOUT_ENV))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(HubError::Config("api_url must not be empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(HubError::Config("poll_interval_secs must be positive".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(HubError::Config("request_timeout_secs must be positive".to_string()));
        }
        if self.request_timeout_secs >= self.wait_timeout_secs {
            return Err(HubError::Config(format!(
                "request_timeout_secs ({}) must be shorter than wait_timeout_secs ({})",
                self.request_timeout_secs, self.wait_timeout_secs
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}
