use crate::uploader::RetryPolicy;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Server address (host:port) for the batch upload endpoint.
    pub server_addr: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    /// Number of concurrent upload workers spawned per report tick.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,
    #[serde(default = "default_retry_max_wait_secs")]
    pub retry_max_wait_secs: u64,
    /// Shared HMAC signing key; metrics are signed when set.
    #[serde(default)]
    pub sign_key: Option<String>,
    /// Path to a PKCS#1 RSA public key PEM; batches are encrypted when set.
    #[serde(default)]
    pub crypto_key: Option<String>,
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_report_interval_secs() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_wait_secs() -> u64 {
    10
}

fn default_retry_max_wait_secs() -> u64 {
    90
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_secs == 0 || self.report_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs and report_interval_secs must be positive");
        }
        if self.rate_limit == 0 {
            anyhow::bail!("rate_limit must be at least 1");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            count: self.retry_count,
            wait: Duration::from_secs(self.retry_wait_secs),
            max_wait: Duration::from_secs(self.retry_max_wait_secs),
        }
    }
}
