use serde::Deserialize;
use statmon_storage::StoreConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// CIDR of clients allowed to submit metrics (checked against the
    /// `X-Real-IP` header). Unset means no restriction.
    #[serde(default)]
    pub trusted_subnet: Option<String>,
    /// Shared HMAC signing key; submissions are verified when set.
    #[serde(default)]
    pub sign_key: Option<String>,
    /// Path to a PKCS#1 RSA private key PEM; batch payloads are expected
    /// encrypted when set.
    #[serde(default)]
    pub crypto_key: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
