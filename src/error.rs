//! Error types surfaced on provider exception streams.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// An error produced by an extractor for a single target.
///
/// These never travel on a result stream. Providers record them on a separate
/// exception stream; a consumer that ignores them simply sees fewer results.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// The extractor returned an error for this target.
    #[error("{extractor} failed for {}: {source}", target.display())]
    Failed {
        /// Name of the extractor that failed.
        extractor: String,
        /// The target the extractor was invoked on.
        target: PathBuf,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// The extractor did not finish within the configured timeout.
    #[error("{extractor} timed out after {timeout_ms} ms for {}", target.display())]
    Timeout {
        /// Name of the extractor that timed out.
        extractor: String,
        /// The target the extractor was invoked on.
        target: PathBuf,
        /// The configured timeout in milliseconds.
        timeout_ms: u64,
    },
}

impl ExtractorError {
    /// The target this error was recorded for.
    pub fn target(&self) -> &Path {
        match self {
            ExtractorError::Failed { target, .. } => target,
            ExtractorError::Timeout { target, .. } => target,
        }
    }

    /// Name of the extractor that produced this error.
    pub fn extractor(&self) -> &str {
        match self {
            ExtractorError::Failed { extractor, .. } => extractor,
            ExtractorError::Timeout { extractor, .. } => extractor,
        }
    }

    /// Whether this error was caused by the per-target timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExtractorError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = ExtractorError::Timeout {
            extractor: "kconfig".to_string(),
            target: PathBuf::from("/src/linux"),
            timeout_ms: 5000,
        };

        let msg = format!("{}", err);
        assert!(msg.contains("kconfig"));
        assert!(msg.contains("5000 ms"));
        assert!(msg.contains("/src/linux"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_failed_accessors() {
        let err = ExtractorError::Failed {
            extractor: "srcml".to_string(),
            target: PathBuf::from("drivers/usb/core.c"),
            source: anyhow::anyhow!("parse error"),
        };

        assert_eq!(err.extractor(), "srcml");
        assert_eq!(err.target(), Path::new("drivers/usb/core.c"));
        assert!(!err.is_timeout());
    }
}
