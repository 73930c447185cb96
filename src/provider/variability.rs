//! Provider for the variability model.

use crate::config::Config;
use crate::error::ExtractorError;
use crate::metrics::Metrics;
use crate::model::VariabilityModel;
use crate::provider::{Extractor, ModelCache, ModelProvider, ProviderSettings};
use std::sync::Arc;

/// Supervises the variability model extractor: one target (the source
/// tree), one worker, at most one result.
pub struct VariabilityModelProvider {
    inner: Arc<ModelProvider<VariabilityModel>>,
}

impl VariabilityModelProvider {
    /// Create the provider from the `variability` section of the config.
    pub fn new(
        extractor: Arc<dyn Extractor<VariabilityModel>>,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> Self {
        let settings = ProviderSettings {
            timeout_ms: config.variability.timeout_ms,
            cache_read: config.variability.cache_read,
            cache_write: config.variability.cache_write,
            workers: 1,
        };
        let cache = ModelCache::new(&config.cache_dir, "variability", metrics.clone());

        Self {
            inner: Arc::new(ModelProvider::new(
                extractor,
                vec![config.source_tree.clone()],
                settings,
                Some(cache),
                config.analysis.result_capacity,
                metrics,
            )),
        }
    }

    /// Begin extraction. Idempotent.
    pub fn start(&self) {
        self.inner.start();
    }

    /// The extracted model, or `None` if extraction produced nothing.
    pub async fn result(&self) -> Option<Arc<VariabilityModel>> {
        self.inner.next_result().await
    }

    /// The recorded extractor error, if any.
    pub async fn exception(&self) -> Option<ExtractorError> {
        self.inner.next_exception().await
    }

    /// The generic provider, for wiring into the pipeline as a source.
    pub(crate) fn shared(&self) -> Arc<ModelProvider<VariabilityModel>> {
        self.inner.clone()
    }
}
