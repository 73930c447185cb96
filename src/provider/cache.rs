//! Serialized model cache, one JSON file per model kind and target.
//!
//! A missing entry is a [`CacheLookup::Miss`], never an error. A corrupted
//! entry (present but unparseable) is logged at WARN and also surfaced as a
//! miss, so a damaged cache degrades to re-extraction instead of failing the
//! run. Failed extractions are never cached.

use crate::metrics::Metrics;
use crate::model::Model;
use anyhow::{Context, Result};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of a cache read.
#[derive(Debug)]
pub enum CacheLookup<M> {
    /// The entry was present and parsed.
    Hit(M),
    /// No usable entry for this key.
    Miss,
}

impl<M> CacheLookup<M> {
    /// Whether this lookup found a usable entry.
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Filesystem cache for one model kind.
pub struct ModelCache<M> {
    dir: PathBuf,
    kind: &'static str,
    metrics: Arc<Metrics>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> ModelCache<M> {
    /// Create a cache for `kind` rooted at `dir`.
    pub fn new(dir: &Path, kind: &'static str, metrics: Arc<Metrics>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            kind,
            metrics,
            _marker: PhantomData,
        }
    }

    /// Cache file for a target key: `<kind>.<sanitized-target>.json`.
    pub fn entry_path(&self, target: &Path) -> PathBuf {
        let sanitized = target
            .to_string_lossy()
            .replace(['/', '\\'], ".")
            .trim_matches('.')
            .to_string();
        self.dir.join(format!("{}.{}.json", self.kind, sanitized))
    }

    /// Look up the entry for `target`.
    pub async fn read(&self, target: &Path) -> CacheLookup<M> {
        let path = self.entry_path(target);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.metrics.add_cache_miss();
                return CacheLookup::Miss;
            }
            Err(e) => {
                tracing::warn!(
                    cache = %path.display(),
                    error = %e,
                    "cache entry unreadable, treating as miss"
                );
                self.metrics.add_cache_miss();
                return CacheLookup::Miss;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(model) => {
                self.metrics.add_cache_hit();
                CacheLookup::Hit(model)
            }
            Err(e) => {
                tracing::warn!(
                    cache = %path.display(),
                    error = %e,
                    "cache entry corrupted, treating as miss"
                );
                self.metrics.add_cache_corrupted();
                CacheLookup::Miss
            }
        }
    }

    /// Write the entry for `target`. Per-key extraction is single-flight, so
    /// the same key is never written concurrently.
    pub async fn write(&self, target: &Path, model: &M) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create cache dir {}", self.dir.display()))?;

        let path = self.entry_path(target);
        let tmp = path.with_extension("part");
        let json = serde_json::to_vec(model)?;

        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to publish {}", path.display()))?;

        self.metrics.add_cache_write();
        tracing::debug!(cache = %path.display(), "model cached");
        Ok(())
    }
}
