//! Map-based backend with JSON snapshot persistence.

use crate::error::{Result, StorageError};
use crate::{MetricStorage, StoreConfig};
use async_trait::async_trait;
use statmon_common::types::{Metric, MetricKind, MetricValue, MetricsDump};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

/// In-process metric store.
///
/// Gauges and counters live in independent maps, each behind its own lock,
/// so gauge and counter traffic never contend with each other. Persistence
/// mode is fixed at construction: `interval_secs == 0` serializes the full
/// state to the snapshot file on every update (write-through), a positive
/// interval flushes from a background task and relies on an explicit
/// [`save`](MetricStorage::save) at shutdown for the tail window.
pub struct MemoryRepo {
    gauges: RwLock<HashMap<String, f64>>,
    counters: RwLock<HashMap<String, i64>>,
    file: Option<PathBuf>,
    write_through: bool,
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryRepo {
    /// Builds the repo and, for interval persistence, spawns the periodic
    /// flush task. The task holds only a weak reference and ends when the
    /// repo is dropped.
    pub fn open(config: &StoreConfig) -> Arc<Self> {
        let repo = Arc::new(Self {
            gauges: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            file: config.file.as_ref().map(PathBuf::from),
            write_through: config.interval_secs == 0,
        });

        if repo.file.is_some() && config.interval_secs > 0 {
            Self::spawn_flush_task(&repo, Duration::from_secs(config.interval_secs));
        }

        repo
    }

    fn spawn_flush_task(repo: &Arc<Self>, every: Duration) {
        let weak: Weak<Self> = Arc::downgrade(repo);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            // The first tick completes immediately; skip it.
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(repo) = weak.upgrade() else { break };
                if let Err(e) = repo.write_snapshot() {
                    tracing::warn!(error = %e, "periodic snapshot flush failed");
                }
            }
        });
    }

    fn dump(&self) -> MetricsDump {
        let gauges: BTreeMap<String, MetricValue> = read_lock(&self.gauges)
            .iter()
            .map(|(name, value)| (name.clone(), MetricValue::Gauge(*value)))
            .collect();
        let counters: BTreeMap<String, MetricValue> = read_lock(&self.counters)
            .iter()
            .map(|(name, total)| (name.clone(), MetricValue::Counter(*total)))
            .collect();

        let mut dump = MetricsDump::new();
        dump.insert(MetricKind::Gauge, gauges);
        dump.insert(MetricKind::Counter, counters);
        dump
    }

    fn write_snapshot(&self) -> Result<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let encoded = serde_json::to_vec(&self.dump())?;
        std::fs::write(path, encoded)?;
        Ok(())
    }
}

#[async_trait]
impl MetricStorage for MemoryRepo {
    async fn update(&self, id: &str, value: MetricValue) -> Result<()> {
        if id.is_empty() {
            return Err(StorageError::InvalidMetric("metric id is empty".to_string()));
        }

        match value {
            MetricValue::Gauge(v) => {
                write_lock(&self.gauges).insert(id.to_string(), v);
            }
            MetricValue::Counter(delta) => {
                *write_lock(&self.counters).entry(id.to_string()).or_insert(0) += delta;
            }
        }

        if self.write_through {
            self.write_snapshot()?;
        }
        Ok(())
    }

    async fn update_many(&self, batch: &[Metric]) -> Result<()> {
        // Entries are applied independently; a failure mid-batch leaves the
        // already-applied prefix in place.
        for metric in batch {
            self.update(&metric.id, metric.value).await?;
        }
        Ok(())
    }

    async fn read(&self, id: &str, kind: MetricKind) -> Result<MetricValue> {
        let value = match kind {
            MetricKind::Gauge => read_lock(&self.gauges).get(id).copied().map(MetricValue::Gauge),
            MetricKind::Counter => read_lock(&self.counters)
                .get(id)
                .copied()
                .map(MetricValue::Counter),
        };
        value.ok_or_else(|| StorageError::NotFound {
            kind,
            id: id.to_string(),
        })
    }

    async fn read_all(&self) -> Result<MetricsDump> {
        Ok(self.dump())
    }

    async fn save(&self) -> Result<()> {
        self.write_snapshot()
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.write_snapshot()
    }
}
