//! Configuration for the analysis pipeline.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for an analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the source tree to analyze
    pub source_tree: PathBuf,

    /// Destination directory for result artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Root directory for model cache files
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Log level for the run
    #[serde(default)]
    pub log_level: LogLevel,

    /// Number of Tokio worker threads (null = num CPUs)
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Analysis pipeline configuration
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Variability model provider configuration
    #[serde(default)]
    pub variability: ProviderConfig,

    /// Build model provider configuration
    #[serde(default)]
    pub build: ProviderConfig,

    /// Code model provider configuration
    #[serde(default)]
    pub code: CodeProviderConfig,
}

/// Log level, mapped onto the tracing levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// The corresponding tracing level.
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Analysis pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Registered stage names forming the linear pipeline; the last is the
    /// terminal stage
    #[serde(default = "default_pipeline")]
    pub pipeline: Vec<String>,

    /// Stage names whose intermediate results are mirrored to a per-stage
    /// artifact
    #[serde(default)]
    pub log_components: Vec<String>,

    /// Back-pressure capacity of each stage's result queue
    #[serde(default = "default_result_capacity")]
    pub result_capacity: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pipeline: default_pipeline(),
            log_components: Vec::new(),
            result_capacity: default_result_capacity(),
        }
    }
}

/// Configuration for a single-result model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registered name of the extractor to run
    #[serde(default = "default_extractor")]
    pub extractor: String,

    /// Per-target extraction timeout in milliseconds (0 = no timeout)
    #[serde(default)]
    pub timeout_ms: u64,

    /// Try the cache before invoking the extractor
    #[serde(default)]
    pub cache_read: bool,

    /// Write successful extractions to the cache
    #[serde(default)]
    pub cache_write: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            extractor: default_extractor(),
            timeout_ms: 0,
            cache_read: false,
            cache_write: false,
        }
    }
}

/// Configuration for the multi-target code model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeProviderConfig {
    /// Registered name of the extractor to run
    #[serde(default = "default_extractor")]
    pub extractor: String,

    /// Per-target extraction timeout in milliseconds (0 = no timeout)
    #[serde(default)]
    pub timeout_ms: u64,

    /// Try the cache before invoking the extractor
    #[serde(default)]
    pub cache_read: bool,

    /// Write successful extractions to the cache
    #[serde(default)]
    pub cache_write: bool,

    /// Number of parallel extraction workers
    #[serde(default = "default_code_threads")]
    pub threads: usize,

    /// File name suffixes selecting code targets under the source tree
    #[serde(default = "default_code_files")]
    pub files: Vec<String>,
}

impl Default for CodeProviderConfig {
    fn default() -> Self {
        Self {
            extractor: default_extractor(),
            timeout_ms: 0,
            cache_read: false,
            cache_write: false,
            threads: default_code_threads(),
            files: default_code_files(),
        }
    }
}

/// On-disk formats the configuration can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Pick the parser from a file extension. Everything that is not
    /// `.json` goes through the YAML parser, which also accepts JSON
    /// content under unrecognized extensions.
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

impl Config {
    /// Load the configuration from a file, choosing the parser by
    /// extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        Self::parse(&contents, ConfigFormat::for_path(path))
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    /// Parse a YAML configuration string.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Self::parse(text, ConfigFormat::Yaml)
    }

    /// Parse a JSON configuration string.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::parse(text, ConfigFormat::Json)
    }

    fn parse(text: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(text)?,
            ConfigFormat::Json => serde_json::from_str(text)?,
        };
        Ok(config)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize configuration")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.source_tree.as_os_str().is_empty() {
            anyhow::bail!("source_tree must not be empty");
        }
        if self.analysis.pipeline.is_empty() {
            anyhow::bail!("analysis.pipeline must name at least one stage");
        }
        if self.analysis.result_capacity == 0 {
            anyhow::bail!("analysis.result_capacity must be > 0");
        }
        if self.code.threads == 0 {
            anyhow::bail!("code.threads must be > 0");
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}
fn default_pipeline() -> Vec<String> {
    vec!["empty".to_string()]
}
fn default_result_capacity() -> usize {
    100
}
fn default_extractor() -> String {
    "empty".to_string()
}
fn default_code_threads() -> usize {
    1
}
fn default_code_files() -> Vec<String> {
    vec![".c".to_string(), ".h".to_string()]
}
