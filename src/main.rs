//! varmine CLI
//!
//! Runs a configured analysis pipeline over a source tree.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use varmine::{run_analysis, Config};

#[derive(Parser)]
#[command(name = "varmine")]
#[command(about = "Analyze highly configurable software", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Override the output directory
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis pipeline (default if no command specified)
    Run,

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Run) => {
            run_command(cli.config, cli.output_dir)?;
        }

        Some(Commands::Validate) => {
            init_logging(tracing::Level::INFO);
            validate_command(cli.config)?;
        }

        Some(Commands::GenerateConfig { output }) => {
            init_logging(tracing::Level::INFO);
            generate_config_command(output)?;
        }
    }

    Ok(())
}

fn init_logging(level: tracing::Level) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn run_command(config_path: PathBuf, output_dir: Option<PathBuf>) -> Result<()> {
    let mut config = Config::from_file(&config_path)?;

    // Apply overrides
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }

    config.validate()?;
    init_logging(config.log_level.as_tracing_level());

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(threads) = config.worker_threads {
        runtime.worker_threads(threads);
    }

    let summary = runtime.build()?.block_on(run_analysis(config))?;

    tracing::info!("analysis complete: {}", summary);
    for artifact in &summary.artifacts {
        tracing::info!("  {}", artifact.display());
    }

    Ok(())
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# varmine configuration

# === TARGET: What to analyze ===

# Root of the source tree
source_tree: "/path/to/source"

# Destination for result artifacts
output_dir: "output"

# Root for model cache files
cache_dir: "cache"

# Log level: error, warn, info, debug, trace
log_level: info

# Tokio worker threads (null = num CPUs)
# worker_threads: 8

# === ANALYSIS: The stage pipeline ===
analysis:
  # Registered stage names, piped in order; the last is the terminal stage.
  # Built-ins: empty, variables, source_files
  pipeline: [empty]

  # Stage names whose intermediate results are mirrored to a per-stage file
  log_components: []

  # Back-pressure capacity of each stage's result queue
  result_capacity: 100

# === PROVIDERS: Extractor supervision ===
variability:
  # Registered extractor name
  extractor: empty

  # Per-target timeout in milliseconds (0 = none)
  timeout_ms: 0

  # Serve the model from cache when present / cache successful extractions
  cache_read: false
  cache_write: false

build:
  extractor: empty
  timeout_ms: 0
  cache_read: false
  cache_write: false

code:
  extractor: empty
  timeout_ms: 0
  cache_read: false
  cache_write: false

  # Parallel extraction workers
  threads: 1

  # File name suffixes selecting code targets under the source tree
  files: [".c", ".h"]
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_default() {
        // No subcommand - should default to Run
        let cli = Cli::try_parse_from(["varmine"]);
        assert!(cli.is_ok());
        assert!(cli.unwrap().command.is_none());
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::try_parse_from(["varmine", "-c", "other.yaml"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_parse_validate() {
        let cli = Cli::try_parse_from(["varmine", "validate", "-c", "test.json"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_generated_config_parses() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        generate_config_command(path.clone()).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.analysis.pipeline, vec!["empty"]);
    }
}
