//! The collector loop: two independent timers, a tick-scoped sampling
//! barrier, bounded upload fan-out, and graceful draining.

use crate::config::AgentConfig;
use crate::sampler::{HostSampler, RuntimeSampler};
use crate::snapshot::MetricSnapshot;
use crate::uploader::{HttpTransport, Uploader};
use anyhow::Result;
use statmon_common::crypto;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::signal;
use tokio::task::JoinSet;
use tokio::time::{interval, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    Running,
    Draining,
    Stopped,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct CollectorApp {
    config: AgentConfig,
    snapshot: Arc<MetricSnapshot>,
    runtime_sampler: Arc<Mutex<RuntimeSampler>>,
    host_sampler: Arc<Mutex<HostSampler>>,
    uploader: Arc<Uploader>,
    state: LoopState,
}

impl CollectorApp {
    /// Builds the loop. Key and transport initialization errors are fatal:
    /// without a destination the process cannot proceed.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let public_key = match &config.crypto_key {
            Some(path) => Some(crypto::load_public_key(Path::new(path))?),
            None => None,
        };
        let transport = HttpTransport::new(&config.server_addr)?;
        let uploader = Uploader::new(
            Box::new(transport),
            config.retry_policy(),
            config.sign_key.clone(),
            public_key,
        );

        Ok(Self {
            config,
            snapshot: Arc::new(MetricSnapshot::new()),
            runtime_sampler: Arc::new(Mutex::new(RuntimeSampler::new())),
            host_sampler: Arc::new(Mutex::new(HostSampler::new())),
            uploader: Arc::new(uploader),
            state: LoopState::Idle,
        })
    }

    fn set_state(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, "collector state change");
        self.state = next;
    }

    pub async fn run(mut self) -> Result<()> {
        self.set_state(LoopState::Running);
        tracing::info!(
            poll_secs = self.config.poll_interval_secs,
            report_secs = self.config.report_interval_secs,
            workers = self.config.rate_limit,
            "collector loop running"
        );

        let mut poll_tick = interval(Duration::from_secs(self.config.poll_interval_secs));
        let mut report_tick = interval(Duration::from_secs(self.config.report_interval_secs));
        let mut uploads: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = poll_tick.tick() => {
                    self.sample_tick().await;
                }
                _ = report_tick.tick() => {
                    self.spawn_upload_workers(&mut uploads);
                }
                Some(result) = uploads.join_next(), if !uploads.is_empty() => {
                    if result.is_err() {
                        tracing::error!("upload worker panicked");
                    }
                }
                _ = signal::ctrl_c() => {
                    self.set_state(LoopState::Draining);
                    tracing::info!("shutdown signal received, draining");
                    break;
                }
            }
        }

        // Wait out workers that are already in flight, then deliver the
        // last observed state synchronously (at-least-once on success).
        while let Some(result) = uploads.join_next().await {
            if result.is_err() {
                tracing::error!("upload worker panicked");
            }
        }
        if let Err(e) = self.uploader.upload(&self.snapshot).await {
            tracing::warn!(error = %e, "final upload failed");
        }

        self.set_state(LoopState::Stopped);
        tracing::info!("collector loop stopped");
        Ok(())
    }

    /// One sampling tick: the standard and extra jobs run concurrently and
    /// both must finish before the loop continues (the tick barrier), so
    /// an upload never observes a half-sampled tick.
    async fn sample_tick(&self) {
        let standard = {
            let sampler = self.runtime_sampler.clone();
            let snapshot = self.snapshot.clone();
            tokio::task::spawn_blocking(move || lock(&sampler).refresh(&snapshot))
        };
        let extra = {
            let sampler = self.host_sampler.clone();
            let snapshot = self.snapshot.clone();
            tokio::task::spawn_blocking(move || lock(&sampler).refresh_extra(&snapshot))
        };

        let (standard, extra) = tokio::join!(standard, extra);
        if standard.is_err() {
            tracing::error!("standard sampling job panicked");
        }
        match extra {
            // Extra failures are logged and never abort the standard job.
            Ok(Err(e)) => tracing::warn!(error = %e, "extra sampling failed"),
            Err(_) => tracing::error!("extra sampling job panicked"),
            Ok(Ok(())) => {}
        }
    }

    /// Fans out up to `rate_limit` attempts for the current snapshot
    /// without blocking the select loop. The uploader serializes actual
    /// deliveries, so overlapping attempts are safe.
    fn spawn_upload_workers(&self, uploads: &mut JoinSet<()>) {
        for _ in 0..self.config.rate_limit {
            let uploader = self.uploader.clone();
            let snapshot = self.snapshot.clone();
            uploads.spawn(async move {
                if let Err(e) = uploader.upload(&snapshot).await {
                    tracing::warn!(error = %e, "metrics upload failed");
                }
            });
        }
    }
}
