//! Host samplers feeding the metric snapshot.
//!
//! The standard set is a fixed, statically declared table of gauge
//! accessors over one [`HostStats`] reading; adding a metric means adding a
//! row to [`STANDARD_GAUGES`].

use crate::snapshot::MetricSnapshot;
use anyhow::Result;
use rand::Rng;
use sysinfo::System;

/// Counter incremented once per sampling tick.
pub const POLL_COUNT: &str = "agent.poll_count";
/// Random gauge refreshed every tick, used as a liveness/uniqueness probe.
pub const RANDOM_PROBE: &str = "agent.random_probe";

/// One reading of the standard host statistics.
pub struct HostStats {
    pub mem_used: f64,
    pub mem_available: f64,
    pub swap_total: f64,
    pub swap_used: f64,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
    pub uptime_secs: f64,
}

pub const STANDARD_GAUGES: &[(&str, fn(&HostStats) -> f64)] = &[
    ("memory.used", |s| s.mem_used),
    ("memory.available", |s| s.mem_available),
    ("memory.swap_total", |s| s.swap_total),
    ("memory.swap_used", |s| s.swap_used),
    ("system.load_1", |s| s.load_1),
    ("system.load_5", |s| s.load_5),
    ("system.load_15", |s| s.load_15),
    ("system.uptime", |s| s.uptime_secs),
];

/// Sampler for the standard metric set.
pub struct RuntimeSampler {
    system: System,
}

impl RuntimeSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Refreshes the standard gauges plus the poll counter and the random
    /// probe. Synchronous, side-effect-only, never fails.
    pub fn refresh(&mut self, snapshot: &MetricSnapshot) {
        self.system.refresh_memory();
        let load = System::load_average();
        let stats = HostStats {
            mem_used: self.system.used_memory() as f64,
            mem_available: self.system.available_memory() as f64,
            swap_total: self.system.total_swap() as f64,
            swap_used: self.system.used_swap() as f64,
            load_1: load.one,
            load_5: load.five,
            load_15: load.fifteen,
            uptime_secs: System::uptime() as f64,
        };

        let mut gauges: Vec<(String, f64)> = STANDARD_GAUGES
            .iter()
            .map(|(name, accessor)| (name.to_string(), accessor(&stats)))
            .collect();
        gauges.push((RANDOM_PROBE.to_string(), rand::thread_rng().gen::<f64>()));

        snapshot.merge_gauges(gauges);
        snapshot.add_counter(POLL_COUNT, 1);
    }
}

/// Sampler for the auxiliary host-level set: per-core CPU utilisation and
/// total/free memory.
pub struct HostSampler {
    system: System,
}

impl HostSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// May fail when platform sampling is unavailable; previously sampled
    /// extra gauges are left untouched in that case.
    pub fn refresh_extra(&mut self, snapshot: &MetricSnapshot) -> Result<()> {
        self.system.refresh_memory();
        self.system.refresh_cpu_all();

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            anyhow::bail!("cpu sampling unavailable on this platform");
        }

        let mut gauges = vec![
            ("memory.total".to_string(), self.system.total_memory() as f64),
            ("memory.free".to_string(), self.system.free_memory() as f64),
        ];
        for (i, cpu) in cpus.iter().enumerate() {
            gauges.push((format!("cpu.core{i}.usage"), f64::from(cpu.cpu_usage())));
        }

        snapshot.merge_gauges(gauges);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_populates_standard_set() {
        let snapshot = MetricSnapshot::new();
        let mut sampler = RuntimeSampler::new();
        sampler.refresh(&snapshot);

        let dump = snapshot.dump();
        for (name, _) in STANDARD_GAUGES {
            assert!(dump.gauges.contains_key(*name), "missing gauge {name}");
        }
        assert!(dump.gauges.contains_key(RANDOM_PROBE));
        assert_eq!(dump.counters[POLL_COUNT], 1);
    }

    #[test]
    fn poll_count_grows_by_one_per_tick() {
        let snapshot = MetricSnapshot::new();
        let mut sampler = RuntimeSampler::new();
        sampler.refresh(&snapshot);
        sampler.refresh(&snapshot);
        sampler.refresh(&snapshot);
        assert_eq!(snapshot.dump().counters[POLL_COUNT], 3);
    }

    #[test]
    fn random_probe_varies_between_ticks() {
        let snapshot = MetricSnapshot::new();
        let mut sampler = RuntimeSampler::new();

        sampler.refresh(&snapshot);
        let first = snapshot.dump().gauges[RANDOM_PROBE];
        sampler.refresh(&snapshot);
        let second = snapshot.dump().gauges[RANDOM_PROBE];

        // Equal draws from a continuous distribution are practically
        // impossible; a collision here means the probe is not refreshed.
        assert_ne!(first, second);
    }

    #[test]
    fn refresh_extra_reports_cpu_cores() {
        let snapshot = MetricSnapshot::new();
        let mut sampler = HostSampler::new();

        if sampler.refresh_extra(&snapshot).is_ok() {
            let dump = snapshot.dump();
            assert!(dump.gauges.contains_key("memory.total"));
            assert!(dump.gauges.contains_key("memory.free"));
            assert!(dump.gauges.contains_key("cpu.core0.usage"));
        }
    }
}
