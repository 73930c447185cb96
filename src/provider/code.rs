//! Provider for the code model: one parsed source file per target.

use crate::config::Config;
use crate::error::ExtractorError;
use crate::metrics::Metrics;
use crate::model::SourceFile;
use crate::provider::{Extractor, ModelCache, ModelProvider, ProviderSettings};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Supervises the code model extractor over the source files of the target
/// tree, with a configurable worker pool.
pub struct CodeModelProvider {
    inner: Arc<ModelProvider<SourceFile>>,
}

impl CodeModelProvider {
    /// Create the provider from the `code` section of the config.
    ///
    /// Targets are enumerated eagerly; an unreadable source tree is a setup
    /// error, not an extractor error.
    pub fn new(
        extractor: Arc<dyn Extractor<SourceFile>>,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let targets = enumerate_targets(&config.source_tree, &config.code.files)?;
        tracing::info!("code model: {} targets under {}", targets.len(), config.source_tree.display());

        let settings = ProviderSettings {
            timeout_ms: config.code.timeout_ms,
            cache_read: config.code.cache_read,
            cache_write: config.code.cache_write,
            workers: config.code.threads,
        };
        let cache = ModelCache::new(&config.cache_dir, "code", metrics.clone());

        Ok(Self {
            inner: Arc::new(ModelProvider::new(
                extractor,
                targets,
                settings,
                Some(cache),
                config.analysis.result_capacity,
                metrics,
            )),
        })
    }

    /// Begin extraction. Idempotent.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Next parsed source file, or `None` once all targets are processed.
    pub async fn next_result(&self) -> Option<Arc<SourceFile>> {
        self.inner.next_result().await
    }

    /// Next recorded extractor error, or `None` once the log is drained.
    pub async fn next_exception(&self) -> Option<ExtractorError> {
        self.inner.next_exception().await
    }

    /// The generic provider, for wiring into the pipeline as a source.
    pub(crate) fn shared(&self) -> Arc<ModelProvider<SourceFile>> {
        self.inner.clone()
    }
}

/// Walk the source tree and collect files matching the configured suffixes,
/// sorted for a deterministic enumeration order.
fn enumerate_targets(root: &Path, suffixes: &[String]) -> Result<Vec<PathBuf>> {
    let mut targets = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read source tree at {}", dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
            } else if matches_suffix(&path, suffixes) {
                targets.push(path);
            }
        }
    }

    targets.sort();
    Ok(targets)
}

fn matches_suffix(path: &Path, suffixes: &[String]) -> bool {
    if suffixes.is_empty() {
        return true;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    suffixes.iter().any(|s| name.ends_with(s.as_str()))
}
