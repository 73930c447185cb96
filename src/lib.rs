//! varmine: a concurrent analysis pipeline for highly configurable software.
//!
//! The pipeline orchestrates three model providers (variability model,
//! build model, code model) and a DAG of streaming analysis stages,
//! passing typed results between them through bounded queues.
//!
//! # Architecture
//!
//! - **Analysis**: the stage runtime ([`analysis::AnalysisComponent`]),
//!   fan-out and barrier helpers, and the pipeline assembler
//! - **Providers**: extractor supervision with worker pools, per-target
//!   timeouts, and cache mediation
//! - **Models**: opaque typed payloads with a serialization hook
//! - **Writer**: line-oriented result artifacts, published atomically
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use varmine::{Config, run_analysis};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(Path::new("config.yaml"))?;
//!     run_analysis(config).await?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod configurator;
pub mod error;
pub mod metrics;
pub mod model;
pub mod provider;
pub mod writer;

pub use analysis::{AnalysisComponent, JoinComponent, PipelineAnalysis, SplitComponent, StageHandle};
pub use config::Config;
pub use configurator::{PipelineConfigurator, RunSummary};
pub use error::ExtractorError;
pub use metrics::Metrics;
pub use provider::Extractor;

use anyhow::Result;

/// Run the configured analysis pipeline with the built-in registries.
pub async fn run_analysis(config: Config) -> Result<RunSummary> {
    PipelineConfigurator::new().run(config).await
}
