use std::collections::HashMap;
use std::sync::RwLock;

/// Thread-safe accumulator of the current gauge and counter values.
///
/// Created once per collector-loop start and owned by it for the process
/// lifetime. Samplers mutate it under the write lock; the uploader takes a
/// consistent point-in-time copy under the read lock. Counters only ever
/// grow, they are never reset.
pub struct MetricSnapshot {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// Consistent copy of the snapshot taken under one read-lock acquisition.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDump {
    pub gauges: HashMap<String, f64>,
    pub counters: HashMap<String, i64>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Stores a tick's worth of gauge readings under a single lock
    /// acquisition, so readers never observe a half-applied tick.
    pub fn merge_gauges(&self, gauges: impl IntoIterator<Item = (String, f64)>) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (name, value) in gauges {
            inner.gauges.insert(name, value);
        }
    }

    pub fn add_counter(&self, name: &str, delta: i64) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *inner.counters.entry(name.to_string()).or_insert(0) += delta;
    }

    pub fn dump(&self) -> SnapshotDump {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        SnapshotDump {
            gauges: inner.gauges.clone(),
            counters: inner.counters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_monotonically() {
        let snapshot = MetricSnapshot::new();
        snapshot.add_counter("poll_count", 1);
        snapshot.add_counter("poll_count", 1);
        snapshot.add_counter("poll_count", 1);
        assert_eq!(snapshot.dump().counters["poll_count"], 3);
    }

    #[test]
    fn gauges_replace_previous_values() {
        let snapshot = MetricSnapshot::new();
        snapshot.merge_gauges([("memory.used".to_string(), 10.0)]);
        snapshot.merge_gauges([("memory.used".to_string(), 20.0)]);
        let dump = snapshot.dump();
        assert_eq!(dump.gauges["memory.used"], 20.0);
        assert_eq!(dump.gauges.len(), 1);
    }

    #[test]
    fn dump_is_a_copy() {
        let snapshot = MetricSnapshot::new();
        snapshot.add_counter("c", 1);
        let dump = snapshot.dump();
        snapshot.add_counter("c", 1);
        assert_eq!(dump.counters["c"], 1);
        assert_eq!(snapshot.dump().counters["c"], 2);
    }
}
