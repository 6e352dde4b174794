use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub started_at: Option<DateTime<Utc>>,
    pub stages: BTreeMap<String, StageMetrics>,
    pub commands_run: u64,
    pub total_duration_ms: f64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct StageMetrics {
    pub status: String,
    pub duration_ms: f64,
}

/// Shared handle; clones record into the same snapshot.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_run(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot {
                started_at: Some(Utc::now()),
                ..MetricsSnapshot::default()
            };
        }
    }

    pub fn start_stage(&self, stage_name: &str) -> StageTimer {
        StageTimer {
            stage: stage_name.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            status: "aborted".to_string(),
        }
    }

    pub fn record_command(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.commands_run += 1;
        }
    }

    pub fn record_total_duration(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

/// Records the stage duration when dropped.
pub struct StageTimer {
    stage: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    status: String,
}

impl StageTimer {
    pub fn finish(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            guard.stages.insert(
                self.stage.clone(),
                StageMetrics {
                    status: self.status.clone(),
                    duration_ms,
                },
            );
        }
        debug!(
            stage = self.stage.as_str(),
            status = self.status.as_str(),
            duration_ms,
            "Stage duration recorded"
        );
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        total_duration_ms = snapshot.total_duration_ms,
        stage_count = snapshot.stages.len(),
        commands_run = snapshot.commands_run,
        "Packaging metrics summary"
    );
    for (stage, metrics) in &snapshot.stages {
        info!(
            stage = stage.as_str(),
            status = metrics.status.as_str(),
            duration_ms = metrics.duration_ms,
            "Stage metrics"
        );
    }
}
