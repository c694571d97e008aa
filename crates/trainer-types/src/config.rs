use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::Result;

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(SessionError::Config("api base url must not be empty".to_string()));
        }
        self.polling.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Backend origin, without the `/api/v1` prefix
    pub base_url: String,
    /// Sent as a bearer token when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl ApiConfig {
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.base_url.trim_end_matches('/'),
            API_PREFIX,
            path
        )
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            auth_token: None,
        }
    }
}

/// Synchronizer delays, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    pub base_delay_ms: u64,
    pub step_ms: u64,
    pub max_delay_ms: u64,
}

impl PollingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(SessionError::Config("base polling delay must be positive".to_string()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(SessionError::Config(format!(
                "max polling delay ({}ms) is below the base delay ({}ms)",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2500,
            step_ms: 1500,
            max_delay_ms: 10_000,
        }
    }
}

const DEFAULT_API_BASE: &str = "http://localhost:8000";
const API_PREFIX: &str = "/api/v1";
