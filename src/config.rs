//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{BridgeError, Result};

/// How a reply carrying the same source id more than once is keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateSourcePolicy {
    /// First record keeps the bare id, later ones become `id-2`, `id-3`, ...
    #[default]
    Suffix,
    /// Fail the reply with a protocol error
    Reject,
}

/// Settings for a [`Client`](crate::Client).
///
/// ```rust
/// use karabo_bridge::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::from_yaml_str(
///     "endpoint: tcp://localhost:4545\ntimeout_ms: 250\n",
/// ).unwrap();
/// assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
/// assert_eq!(config.pacing(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, e.g. `tcp://host:port`
    pub endpoint: Option<String>,

    /// Receive timeout in milliseconds; `None` waits forever
    pub timeout_ms: Option<u64>,

    /// Minimum spacing between requests of a package stream
    pub pacing_ms: Option<u64>,

    pub duplicate_sources: DuplicateSourcePolicy,
}

impl ClientConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing_ms = Some(duration_ms(pacing));
        self
    }

    pub fn with_duplicate_sources(mut self, policy: DuplicateSourcePolicy) -> Self {
        self.duplicate_sources = policy;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn pacing(&self) -> Option<Duration> {
        self.pacing_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    /// Check the settings for values a client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint
            && !endpoint.contains("://")
        {
            return Err(BridgeError::config(format!(
                "endpoint '{endpoint}' has no transport scheme (expected e.g. tcp://host:port)"
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(BridgeError::config("timeout_ms must be positive; omit it to wait forever"));
        }
        Ok(())
    }

    /// Parse and validate a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| BridgeError::config(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
