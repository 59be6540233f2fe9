use crate::config::ServerConfig;
use anyhow::{Context, Result};
use ipnet::IpNet;
use rsa::RsaPrivateKey;
use statmon_common::crypto;
use statmon_storage::MetricStorage;
use std::path::Path;
use std::sync::Arc;

/// Shared handler state, built once at startup and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn MetricStorage>,
    pub sign_key: Option<String>,
    pub private_key: Option<Arc<RsaPrivateKey>>,
    pub trusted_subnet: Option<IpNet>,
}

impl AppState {
    /// Resolves the configured keys and subnet. Any parse failure here is
    /// fatal for the process: nothing downstream can compensate for a
    /// broken key or an unparsable CIDR.
    pub fn from_config(config: &ServerConfig, storage: Arc<dyn MetricStorage>) -> Result<Self> {
        let private_key = match &config.crypto_key {
            Some(path) => Some(Arc::new(crypto::load_private_key(Path::new(path))?)),
            None => None,
        };
        let trusted_subnet = match &config.trusted_subnet {
            Some(subnet) => Some(
                subnet
                    .parse::<IpNet>()
                    .with_context(|| format!("invalid trusted_subnet '{subnet}'"))?,
            ),
            None => None,
        };

        Ok(Self {
            storage,
            sign_key: config.sign_key.clone(),
            private_key,
            trusted_subnet,
        })
    }
}
