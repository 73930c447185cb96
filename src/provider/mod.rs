//! Extractor supervision: worker pools, timeouts, and cache mediation.
//!
//! A [`ModelProvider`] runs one extractor over a list of targets. Targets
//! are queued on a shared work channel and drained by a pool of worker
//! tasks; each target goes through cache read, timed extraction, and cache
//! write before its model is emitted on the result stream. Extraction
//! failures are recorded on a separate exception stream and never terminate
//! the run.

mod build;
mod cache;
mod code;
mod variability;

pub use build::BuildModelProvider;
pub use cache::{CacheLookup, ModelCache};
pub use code::CodeModelProvider;
pub use variability::VariabilityModelProvider;

use crate::error::ExtractorError;
use crate::metrics::Metrics;
use crate::model::Model;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// An extractor: produces a raw model from one target. Opaque to the core.
#[async_trait]
pub trait Extractor<M>: Send + Sync + 'static {
    /// Display name used in logs and exception records.
    fn name(&self) -> &str;

    /// Extract the model for one target.
    async fn extract(&self, target: &Path) -> Result<M>;
}

/// Supervision parameters for one provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSettings {
    /// Per-target timeout in milliseconds (0 = none).
    pub timeout_ms: u64,

    /// Try the cache before invoking the extractor.
    pub cache_read: bool,

    /// Write successful extractions to the cache.
    pub cache_write: bool,

    /// Number of parallel extraction workers.
    pub workers: usize,
}

/// Wire-up taken by `start()`: the producer ends plus the target list.
struct Pending<M> {
    result_tx: mpsc::Sender<Arc<M>>,
    exception_tx: mpsc::UnboundedSender<ExtractorError>,
    targets: Vec<PathBuf>,
}

/// Supervises one extractor and exposes its output as a stream.
///
/// The extractor runs at most once, no matter how many stages observe the
/// provider. With one worker, results follow target enumeration order; with
/// more, completion order.
pub struct ModelProvider<M: Model> {
    extractor: Arc<dyn Extractor<M>>,
    cache: Option<Arc<ModelCache<M>>>,
    settings: ProviderSettings,
    metrics: Arc<Metrics>,
    pending: std::sync::Mutex<Option<Pending<M>>>,
    results: tokio::sync::Mutex<mpsc::Receiver<Arc<M>>>,
    exceptions: tokio::sync::Mutex<mpsc::UnboundedReceiver<ExtractorError>>,
}

impl<M: Model> ModelProvider<M> {
    /// Create a provider over `targets`.
    pub fn new(
        extractor: Arc<dyn Extractor<M>>,
        targets: Vec<PathBuf>,
        settings: ProviderSettings,
        cache: Option<ModelCache<M>>,
        capacity: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (result_tx, result_rx) = mpsc::channel(capacity);
        let (exception_tx, exception_rx) = mpsc::unbounded_channel();

        Self {
            extractor,
            cache: cache.map(Arc::new),
            settings,
            metrics,
            pending: std::sync::Mutex::new(Some(Pending {
                result_tx,
                exception_tx,
                targets,
            })),
            results: tokio::sync::Mutex::new(result_rx),
            exceptions: tokio::sync::Mutex::new(exception_rx),
        }
    }

    /// Begin extraction. Idempotent; the first call spawns the worker pool.
    pub fn start(&self) {
        let pending = self.pending.lock().expect("provider state poisoned").take();
        let Some(pending) = pending else { return };

        let (work_tx, work_rx) = async_channel::bounded(pending.targets.len().max(1));
        for target in pending.targets {
            // Channel is sized to hold every target.
            let _ = work_tx.try_send(target);
        }
        work_tx.close();

        tracing::debug!(
            extractor = self.extractor.name(),
            workers = self.settings.workers.max(1),
            "starting extraction"
        );

        for _ in 0..self.settings.workers.max(1) {
            tokio::spawn(run_worker(
                work_rx.clone(),
                pending.result_tx.clone(),
                pending.exception_tx.clone(),
                self.extractor.clone(),
                self.cache.clone(),
                self.settings,
                self.metrics.clone(),
            ));
        }
        // The original senders drop here; the streams close once the last
        // worker exits.
    }

    /// Next extracted model, or `None` once all targets are processed.
    /// Implies [`start`](Self::start).
    pub async fn next_result(&self) -> Option<Arc<M>> {
        self.start();
        self.results.lock().await.recv().await
    }

    /// Next recorded extractor error, or `None` once extraction is done and
    /// the log is drained. Never duplicates results.
    pub async fn next_exception(&self) -> Option<ExtractorError> {
        self.start();
        self.exceptions.lock().await.recv().await
    }

    /// Drain the exceptions recorded so far without starting extraction.
    /// Used for end-of-run reporting; a provider nothing observed stays
    /// idle and reports nothing.
    pub fn take_exceptions(&self) -> Vec<ExtractorError> {
        if self.pending.lock().expect("provider state poisoned").is_some() {
            return Vec::new();
        }

        let mut drained = Vec::new();
        if let Ok(mut exceptions) = self.exceptions.try_lock() {
            while let Ok(error) = exceptions.try_recv() {
                drained.push(error);
            }
        }
        drained
    }
}

/// One worker: pull targets until the queue is empty.
async fn run_worker<M: Model>(
    work: async_channel::Receiver<PathBuf>,
    results: mpsc::Sender<Arc<M>>,
    exceptions: mpsc::UnboundedSender<ExtractorError>,
    extractor: Arc<dyn Extractor<M>>,
    cache: Option<Arc<ModelCache<M>>>,
    settings: ProviderSettings,
    metrics: Arc<Metrics>,
) {
    while let Ok(target) = work.recv().await {
        if settings.cache_read {
            if let Some(cache) = &cache {
                if let CacheLookup::Hit(model) = cache.read(&target).await {
                    tracing::debug!(target = %target.display(), "model served from cache");
                    if results.send(Arc::new(model)).await.is_err() {
                        tracing::debug!("result receiver dropped, stopping extraction worker");
                        return;
                    }
                    continue;
                }
            }
        }

        metrics.add_extractor_run();
        let outcome = if settings.timeout_ms > 0 {
            let deadline = Duration::from_millis(settings.timeout_ms);
            match tokio::time::timeout(deadline, extractor.extract(&target)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    metrics.add_extractor_timeout();
                    let _ = exceptions.send(ExtractorError::Timeout {
                        extractor: extractor.name().to_string(),
                        target,
                        timeout_ms: settings.timeout_ms,
                    });
                    continue;
                }
            }
        } else {
            extractor.extract(&target).await
        };

        match outcome {
            Ok(model) => {
                if settings.cache_write {
                    if let Some(cache) = &cache {
                        // Best effort: a failed cache write does not fail
                        // the target.
                        if let Err(e) = cache.write(&target, &model).await {
                            tracing::error!(
                                target = %target.display(),
                                error = %e,
                                "failed to write model cache"
                            );
                        }
                    }
                }
                if results.send(Arc::new(model)).await.is_err() {
                    tracing::debug!("result receiver dropped, stopping extraction worker");
                    return;
                }
            }
            Err(e) => {
                metrics.add_extractor_failure();
                let _ = exceptions.send(ExtractorError::Failed {
                    extractor: extractor.name().to_string(),
                    target,
                    source: e,
                });
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::model::{SourceFile, VariabilityModel};
    use tempfile::TempDir;

    /// Code-style extractor producing one SourceFile per target, sleeping on
    /// a designated slow target.
    struct SlowOnTarget {
        slow: PathBuf,
        delay: Duration,
    }

    #[async_trait]
    impl Extractor<SourceFile> for SlowOnTarget {
        fn name(&self) -> &str {
            "slow-on-target"
        }

        async fn extract(&self, target: &Path) -> Result<SourceFile> {
            if target == self.slow {
                tokio::time::sleep(self.delay).await;
            }
            Ok(SourceFile::new(target))
        }
    }

    #[tokio::test]
    async fn test_single_worker_preserves_target_order() {
        let extractor = Arc::new(SlowOnTarget {
            slow: PathBuf::from("never"),
            delay: Duration::ZERO,
        });
        let targets: Vec<PathBuf> = ["a.c", "b.c", "c.c"].iter().map(PathBuf::from).collect();

        let provider =
            ModelProvider::new(extractor, targets.clone(), settings(), None, 100, Metrics::new());

        let mut seen = Vec::new();
        while let Some(file) = provider.next_result().await {
            seen.push(file.path.clone());
        }
        assert_eq!(seen, targets);
        assert_eq!(provider.next_exception().await.map(|e| e.to_string()), None);
    }

    #[tokio::test]
    async fn test_extractor_runs_once_per_target() {
        let extractor = CountingExtractor::new(VariabilityModel::from_names(["A"]));
        let provider = ModelProvider::new(
            extractor.clone(),
            vec![PathBuf::from("/src")],
            settings(),
            None,
            100,
            Metrics::new(),
        );

        provider.start();
        provider.start();

        assert!(provider.next_result().await.is_some());
        assert!(provider.next_result().await.is_none());
        assert_eq!(extractor.count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_records_exception_and_continues() {
        let extractor = Arc::new(SlowOnTarget {
            slow: PathBuf::from("slow.c"),
            delay: Duration::from_secs(60),
        });
        let targets: Vec<PathBuf> = ["a.c", "slow.c", "b.c"].iter().map(PathBuf::from).collect();
        let mut config = settings();
        config.timeout_ms = 50;

        let metrics = Metrics::new();
        let provider = ModelProvider::new(extractor, targets, config, None, 100, metrics.clone());

        let mut seen = Vec::new();
        while let Some(file) = provider.next_result().await {
            seen.push(file.path.clone());
        }
        assert_eq!(seen, vec![PathBuf::from("a.c"), PathBuf::from("b.c")]);

        let exception = provider.next_exception().await.expect("one exception");
        assert!(exception.is_timeout());
        assert_eq!(exception.target(), Path::new("slow.c"));
        assert!(provider.next_exception().await.is_none());
        assert_eq!(metrics.snapshot().extractor_timeouts, 1);
    }

    #[tokio::test]
    async fn test_failure_goes_to_exception_stream_only() {
        let provider = ModelProvider::new(
            Arc::new(FailingExtractor),
            vec![PathBuf::from("/src")],
            settings(),
            None,
            100,
            Metrics::new(),
        );

        assert!(provider.next_result().await.is_none());
        let exception = provider.next_exception().await.expect("one exception");
        assert!(!exception.is_timeout());
        assert_eq!(exception.extractor(), "failing");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_extractor() {
        let dir = TempDir::new().unwrap();
        let metrics = Metrics::new();
        let target = PathBuf::from("/src/linux");

        let model = VariabilityModel::from_names(["Var_A"]);
        let warm: ModelCache<VariabilityModel> =
            ModelCache::new(dir.path(), "variability", metrics.clone());
        warm.write(&target, &model).await.unwrap();

        let extractor = CountingExtractor::new(VariabilityModel::default());
        let mut config = settings();
        config.cache_read = true;

        let provider = ModelProvider::new(
            extractor.clone(),
            vec![target],
            config,
            Some(ModelCache::new(dir.path(), "variability", metrics.clone())),
            100,
            metrics,
        );

        let result = provider.next_result().await.expect("cached model");
        assert_eq!(*result, model);
        assert_eq!(extractor.count(), 0);
    }

    #[tokio::test]
    async fn test_cache_write_populates_next_run() {
        let dir = TempDir::new().unwrap();
        let metrics = Metrics::new();
        let target = PathBuf::from("/src/linux");
        let model = VariabilityModel::from_names(["Var_A", "Var_B"]);

        let mut config = settings();
        config.cache_write = true;

        let provider = ModelProvider::new(
            CountingExtractor::new(model.clone()),
            vec![target.clone()],
            config,
            Some(ModelCache::new(dir.path(), "variability", metrics.clone())),
            100,
            metrics.clone(),
        );
        assert!(provider.next_result().await.is_some());
        assert!(provider.next_result().await.is_none());

        // Second run with a failing extractor still succeeds from the cache.
        let mut config = settings();
        config.cache_read = true;

        let second = ModelProvider::new(
            Arc::new(FailingExtractor),
            vec![target],
            config,
            Some(ModelCache::new(dir.path(), "variability", metrics.clone())),
            100,
            metrics,
        );
        let result = second.next_result().await.expect("cached model");
        assert_eq!(*result, model);
        assert!(second.next_exception().await.is_none());
    }
}
