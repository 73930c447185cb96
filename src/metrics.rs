//! Run-wide counters for pipeline and provider activity.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for one analysis run.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Results pushed into stage output streams
    pub results_produced: AtomicU64,

    /// Records written to the terminal result artifact
    pub results_written: AtomicU64,

    /// Stages started
    pub stages_started: AtomicU64,

    /// Stages finished (normally or after a failure)
    pub stages_finished: AtomicU64,

    /// Extractor invocations (cache hits do not count)
    pub extractor_runs: AtomicU64,

    /// Extractor invocations that returned an error
    pub extractor_failures: AtomicU64,

    /// Extractor invocations cancelled by the per-target timeout
    pub extractor_timeouts: AtomicU64,

    /// Model cache hits
    pub cache_hits: AtomicU64,

    /// Model cache misses (entry not present)
    pub cache_misses: AtomicU64,

    /// Corrupted cache entries (treated as misses)
    pub cache_corrupted: AtomicU64,

    /// Model cache writes
    pub cache_writes: AtomicU64,

    /// Start time
    start_time: Option<Instant>,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    /// Record a result pushed into a stage output stream.
    pub fn add_result_produced(&self) {
        self.results_produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a record written to the terminal artifact.
    pub fn add_result_written(&self) {
        self.results_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a started stage.
    pub fn add_stage_started(&self) {
        self.stages_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished stage.
    pub fn add_stage_finished(&self) {
        self.stages_finished.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an extractor invocation.
    pub fn add_extractor_run(&self) {
        self.extractor_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed extractor invocation.
    pub fn add_extractor_failure(&self) {
        self.extractor_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an extractor invocation cancelled by the timeout.
    pub fn add_extractor_timeout(&self) {
        self.extractor_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a model cache hit.
    pub fn add_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a model cache miss.
    pub fn add_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a corrupted cache entry.
    pub fn add_cache_corrupted(&self) {
        self.cache_corrupted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a model cache write.
    pub fn add_cache_write(&self) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            results_produced: self.results_produced.load(Ordering::Relaxed),
            results_written: self.results_written.load(Ordering::Relaxed),
            stages_started: self.stages_started.load(Ordering::Relaxed),
            stages_finished: self.stages_finished.load(Ordering::Relaxed),
            extractor_runs: self.extractor_runs.load(Ordering::Relaxed),
            extractor_failures: self.extractor_failures.load(Ordering::Relaxed),
            extractor_timeouts: self.extractor_timeouts.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_corrupted: self.cache_corrupted.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub results_produced: u64,
    pub results_written: u64,
    pub stages_started: u64,
    pub stages_finished: u64,
    pub extractor_runs: u64,
    pub extractor_failures: u64,
    pub extractor_timeouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_corrupted: u64,
    pub cache_writes: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path);
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache_total = self.cache_hits + self.cache_misses + self.cache_corrupted;
        let cache_hit_rate = if cache_total > 0 {
            self.cache_hits as f64 / cache_total as f64 * 100.0
        } else {
            0.0
        };

        write!(
            f,
            "Stages: {}/{} finished | Results: {} produced, {} written | \
             Extractors: {} runs, {} failures, {} timeouts | \
             Cache: {} hits, {} misses, {} corrupted ({:.0}% hit rate) | \
             Elapsed: {:.1}s",
            self.stages_finished,
            self.stages_started,
            self.results_produced,
            self.results_written,
            self.extractor_runs,
            self.extractor_failures,
            self.extractor_timeouts,
            self.cache_hits,
            self.cache_misses,
            self.cache_corrupted,
            cache_hit_rate,
            self.elapsed.as_secs_f64(),
        )
    }
}
