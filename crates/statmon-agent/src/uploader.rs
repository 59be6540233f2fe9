//! Batch serialization, authentication, and delivery with bounded retry.

use crate::snapshot::{MetricSnapshot, SnapshotDump};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use rsa::RsaPublicKey;
use statmon_common::types::{Metric, MetricValue};
use statmon_common::{crypto, sign};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::Mutex;

/// Delivery contract the uploader depends on. The HTTP JSON transport is
/// the provided implementation; an RPC transport is a drop-in substitute.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, body: Vec<u8>) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub count: u32,
    /// Initial wait between attempts; doubles per retry.
    pub wait: Duration,
    /// Cap on the per-retry wait.
    pub max_wait: Duration,
}

/// POSTs the whole batch as one JSON request to the server's `/updates/`
/// endpoint, announcing the host address via `X-Real-IP` for the server's
/// trusted-subnet check.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

/// Source address the host would use for outbound traffic. The connect
/// call only selects a route; no packet is sent.
fn local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("203.0.113.1:9").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

impl HttpTransport {
    pub fn new(server_addr: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        match local_ip() {
            Some(ip) => {
                headers.insert("X-Real-IP", HeaderValue::from_str(&ip.to_string())?);
            }
            None => tracing::warn!("could not determine host address, X-Real-IP not sent"),
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: format!("http://{server_addr}/updates/"),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, body: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("server rejected batch: HTTP {status}");
        }
        Ok(())
    }
}

/// Turns a snapshot into a signed, optionally encrypted batch and delivers
/// it with bounded retry.
///
/// Counters are sent as the delta since the last successful delivery; the
/// per-counter watermark advances only after the transport confirms, so a
/// dropped batch is re-sent (as a larger delta) on the next attempt and a
/// confirmed one is never double-counted. The watermark lock also
/// serializes deliveries: racing workers queue here, find nothing new to
/// send for the counters, and only refresh the gauges.
pub struct Uploader {
    transport: Box<dyn Transport>,
    retry: RetryPolicy,
    sign_key: Option<String>,
    public_key: Option<RsaPublicKey>,
    watermarks: Mutex<HashMap<String, i64>>,
}

impl Uploader {
    pub fn new(
        transport: Box<dyn Transport>,
        retry: RetryPolicy,
        sign_key: Option<String>,
        public_key: Option<RsaPublicKey>,
    ) -> Self {
        Self {
            transport,
            retry,
            sign_key,
            public_key,
            watermarks: Mutex::new(HashMap::new()),
        }
    }

    /// Uploads the current snapshot. One in-flight batch at a time.
    pub async fn upload(&self, snapshot: &MetricSnapshot) -> Result<()> {
        let mut watermarks = self.watermarks.lock().await;

        let dump = snapshot.dump();
        let batch = self.build_batch(&dump, &watermarks);
        if batch.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_vec(&batch).context("failed to encode batch")?;
        let body = match &self.public_key {
            // Fail closed: an encryption error never falls back to plaintext.
            Some(key) => crypto::encrypt(&body, key)?,
            None => body,
        };

        self.deliver_with_retry(body).await?;

        for (name, total) in &dump.counters {
            watermarks.insert(name.clone(), *total);
        }
        tracing::debug!(metrics = batch.len(), "batch uploaded");
        Ok(())
    }

    fn build_batch(&self, dump: &SnapshotDump, watermarks: &HashMap<String, i64>) -> Vec<Metric> {
        let mut batch = Vec::with_capacity(dump.gauges.len() + dump.counters.len());

        let mut gauges: Vec<(&String, &f64)> = dump.gauges.iter().collect();
        gauges.sort_by_key(|(name, _)| name.as_str());
        for (name, value) in gauges {
            batch.push(self.make_metric(name, MetricValue::Gauge(*value)));
        }

        let mut counters: Vec<(&String, &i64)> = dump.counters.iter().collect();
        counters.sort_by_key(|(name, _)| name.as_str());
        for (name, total) in counters {
            let delta = total - watermarks.get(name).copied().unwrap_or(0);
            if delta != 0 {
                batch.push(self.make_metric(name, MetricValue::Counter(delta)));
            }
        }

        batch
    }

    fn make_metric(&self, id: &str, value: MetricValue) -> Metric {
        let mut metric = Metric::new(id, value);
        if let Some(key) = &self.sign_key {
            metric.signature = Some(sign::sign_hex(id, &value, key));
        }
        metric
    }

    async fn deliver_with_retry(&self, body: Vec<u8>) -> Result<()> {
        let mut wait = self.retry.wait.min(self.retry.max_wait);
        let mut attempt = 0u32;
        loop {
            match self.transport.deliver(body.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retry.count => {
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        wait_secs = wait.as_secs(),
                        "upload attempt failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    wait = (wait * 2).min(self.retry.max_wait);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
