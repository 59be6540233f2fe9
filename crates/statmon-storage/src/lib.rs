//! Durable aggregation layer for incoming metrics.
//!
//! The server talks to storage only through the [`MetricStorage`] trait.
//! Two backends implement it: [`memory::MemoryRepo`] (two in-process maps
//! with JSON-file snapshot persistence) and [`relational::RelationalRepo`]
//! (two SQL tables with database-side upsert merge). The backend is picked
//! once at startup by [`open_storage`] and never re-evaluated.

pub mod entities;
pub mod error;
pub mod memory;
pub mod relational;


use async_trait::async_trait;
use error::Result;
use serde::{Deserialize, Serialize};
use statmon_common::types::{Metric, MetricKind, MetricValue, MetricsDump};
use std::path::Path;
use std::sync::Arc;

/// Contract a storage backend exposes to the server.
///
/// Implementations must be safe to share across request-handling tasks
/// (`Send + Sync`); no caller may assume exclusive access.
#[async_trait]
pub trait MetricStorage: Send + Sync {
    /// Applies a single value: gauges overwrite the stored value, counters
    /// add the incoming delta to the stored total (absent counters start
    /// at zero).
    async fn update(&self, id: &str, value: MetricValue) -> Result<()>;

    /// Applies a batch. The in-memory backend applies entries
    /// independently and stops at the first failure (entries before it
    /// stay applied); the relational backend wraps the batch in one
    /// transaction and rolls back entirely on any row failure.
    async fn update_many(&self, batch: &[Metric]) -> Result<()>;

    /// Returns the stored value, or [`StorageError::NotFound`].
    async fn read(&self, id: &str, kind: MetricKind) -> Result<MetricValue>;

    /// Full point-in-time dump for display and export. The in-memory
    /// backend takes its two kind locks independently, so the dump is not
    /// atomic across kinds.
    async fn read_all(&self) -> Result<MetricsDump>;

    /// Writes the full current state durably. No-op for backends whose
    /// rows are already durable.
    async fn save(&self) -> Result<()>;

    /// Liveness probe. A probe that does not answer within its timeout is
    /// reported as backend-unavailable, never as backend-empty.
    async fn ping(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Populates the store from a previously persisted snapshot, applying
    /// every entry through the same [`update`](Self::update) merge path so
    /// restored counters continue to accumulate. A missing file is treated
    /// as an empty snapshot.
    async fn restore_from_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no snapshot file, starting empty");
            return Ok(());
        }
        let raw = std::fs::read(path)?;
        let dump: MetricsDump = serde_json::from_slice(&raw)?;
        let mut restored = 0usize;
        for metrics in dump.values() {
            for (id, value) in metrics {
                self.update(id, *value).await?;
                restored += 1;
            }
        }
        tracing::info!(path = %path.display(), restored, "snapshot restored");
        Ok(())
    }
}

/// Storage selection and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Snapshot flush cadence in seconds. `0` means write-through: every
    /// update serializes the full state to `file` synchronously.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Snapshot file path; `None` disables file persistence entirely.
    #[serde(default = "default_store_file")]
    pub file: Option<String>,
    /// Whether to load the snapshot file at startup.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// Relational backend DSN (SQLite or PostgreSQL URL). When set, the
    /// relational backend is used and `file`/`interval_secs` only affect
    /// the optional startup restore.
    #[serde(default)]
    pub database_dsn: Option<String>,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            file: default_store_file(),
            restore: default_restore(),
            database_dsn: None,
            pool: PoolConfig::default(),
        }
    }
}

fn default_interval_secs() -> u64 {
    300
}

fn default_store_file() -> Option<String> {
    Some("/tmp/statmon-db.json".to_string())
}

fn default_restore() -> bool {
    true
}

/// Connection pool bounds for the relational backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
        }
    }
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_max_lifetime_secs() -> u64 {
    120
}

/// Opens the backend selected by the configuration: a DSN means the
/// relational backend, otherwise the in-memory one.
pub async fn open_storage(config: &StoreConfig) -> Result<Arc<dyn MetricStorage>> {
    match &config.database_dsn {
        Some(dsn) => {
            let repo = relational::RelationalRepo::connect(dsn, &config.pool).await?;
            tracing::info!("relational metric storage opened");
            Ok(Arc::new(repo))
        }
        None => {
            let repo = memory::MemoryRepo::open(config);
            tracing::info!(
                file = config.file.as_deref().unwrap_or("<none>"),
                interval_secs = config.interval_secs,
                "in-memory metric storage opened"
            );
            Ok(repo)
        }
    }
}
