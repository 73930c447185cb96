//! Wires configured extractors, providers, and stages into a runnable
//! pipeline.

use crate::analysis::{AnalysisContext, PipelineAnalysis, StageRegistry};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::model::{BuildModel, SourceFile, VariabilityModel};
use crate::provider::{
    BuildModelProvider, CodeModelProvider, Extractor, VariabilityModelProvider,
};
use crate::writer::TextWriterFactory;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type ExtractorFactory<M> = Box<dyn Fn(&Config) -> Result<Arc<dyn Extractor<M>>> + Send + Sync>;

/// Outcome of one analysis run.
#[derive(Debug)]
pub struct RunSummary {
    /// Artifacts present in the output directory after the run.
    pub artifacts: Vec<PathBuf>,

    /// Extractor errors recorded across all providers.
    pub extractor_errors: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} artifacts, {} extractor errors",
            self.artifacts.len(),
            self.extractor_errors
        )
    }
}

/// Resolves configured names to extractors and stages, builds the
/// providers, and runs the configured pipeline.
///
/// Concrete extractors are external collaborators: they are registered here
/// by name and looked up from the `*.extractor` config values. The
/// `empty` extractors (producing empty models) are built in, so a config
/// without extractors still runs end to end.
pub struct PipelineConfigurator {
    vm_extractors: HashMap<String, ExtractorFactory<VariabilityModel>>,
    bm_extractors: HashMap<String, ExtractorFactory<BuildModel>>,
    cm_extractors: HashMap<String, ExtractorFactory<SourceFile>>,
    stages: StageRegistry,
}

impl PipelineConfigurator {
    /// A configurator with the built-in extractors and stages registered.
    pub fn new() -> Self {
        let mut configurator = Self {
            vm_extractors: HashMap::new(),
            bm_extractors: HashMap::new(),
            cm_extractors: HashMap::new(),
            stages: StageRegistry::with_builtins(),
        };

        configurator.register_variability_extractor("empty", |_| {
            Ok(Arc::new(EmptyVariabilityExtractor) as Arc<dyn Extractor<VariabilityModel>>)
        });
        configurator.register_build_extractor("empty", |_| {
            Ok(Arc::new(EmptyBuildExtractor) as Arc<dyn Extractor<BuildModel>>)
        });
        configurator.register_code_extractor("empty", |_| {
            Ok(Arc::new(EmptyCodeExtractor) as Arc<dyn Extractor<SourceFile>>)
        });

        configurator
    }

    /// Register a variability model extractor factory under `name`.
    pub fn register_variability_extractor<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Config) -> Result<Arc<dyn Extractor<VariabilityModel>>> + Send + Sync + 'static,
    {
        self.vm_extractors.insert(name.to_string(), Box::new(factory));
    }

    /// Register a build model extractor factory under `name`.
    pub fn register_build_extractor<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Config) -> Result<Arc<dyn Extractor<BuildModel>>> + Send + Sync + 'static,
    {
        self.bm_extractors.insert(name.to_string(), Box::new(factory));
    }

    /// Register a code model extractor factory under `name`.
    pub fn register_code_extractor<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Config) -> Result<Arc<dyn Extractor<SourceFile>>> + Send + Sync + 'static,
    {
        self.cm_extractors.insert(name.to_string(), Box::new(factory));
    }

    /// The stage registry, for registering additional analysis stages.
    pub fn stages_mut(&mut self) -> &mut StageRegistry {
        &mut self.stages
    }

    /// Run the configured pipeline to completion.
    pub async fn run(&self, config: Config) -> Result<RunSummary> {
        config.validate()?;
        if !config.source_tree.exists() {
            bail!(
                "source_tree {} does not exist",
                config.source_tree.display()
            );
        }

        let metrics = Metrics::new();
        let ctx = AnalysisContext::new(&config, Arc::new(TextWriterFactory), metrics.clone());

        tracing::info!("instantiating extractors");
        let vm_extractor = resolve(&self.vm_extractors, &config.variability.extractor, "variability")?(&config)?;
        let bm_extractor = resolve(&self.bm_extractors, &config.build.extractor, "build")?(&config)?;
        let cm_extractor = resolve(&self.cm_extractors, &config.code.extractor, "code")?(&config)?;

        let vm = VariabilityModelProvider::new(vm_extractor, &config, metrics.clone());
        let bm = BuildModelProvider::new(bm_extractor, &config, metrics.clone());
        let cm = CodeModelProvider::new(cm_extractor, &config, metrics.clone())?;

        let mut analysis =
            PipelineAnalysis::new(ctx, vm.shared(), bm.shared(), cm.shared());

        tracing::info!(
            "assembling pipeline: {}",
            config.analysis.pipeline.join(" -> ")
        );
        let terminal = self
            .stages
            .build_pipeline(&mut analysis, &config.analysis.pipeline)?;

        let artifacts = analysis.run(terminal).await?;

        let mut extractor_errors = 0;
        for error in vm
            .shared()
            .take_exceptions()
            .into_iter()
            .chain(bm.shared().take_exceptions())
            .chain(cm.shared().take_exceptions())
        {
            tracing::warn!("{}", error);
            extractor_errors += 1;
        }

        tracing::info!("{}", metrics.snapshot());

        Ok(RunSummary {
            artifacts,
            extractor_errors,
        })
    }
}

impl Default for PipelineConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve<'a, M>(
    registry: &'a HashMap<String, ExtractorFactory<M>>,
    name: &str,
    kind: &str,
) -> Result<&'a ExtractorFactory<M>> {
    registry.get(name).ok_or_else(|| {
        let mut known: Vec<&str> = registry.keys().map(String::as_str).collect();
        known.sort();
        anyhow::anyhow!(
            "unknown {} extractor '{}' (registered: {})",
            kind,
            name,
            known.join(", ")
        )
    })
}

/// Built-in extractor producing an empty variability model.
struct EmptyVariabilityExtractor;

#[async_trait]
impl Extractor<VariabilityModel> for EmptyVariabilityExtractor {
    fn name(&self) -> &str {
        "empty"
    }

    async fn extract(&self, _target: &Path) -> Result<VariabilityModel> {
        Ok(VariabilityModel::default())
    }
}

/// Built-in extractor producing an empty build model.
struct EmptyBuildExtractor;

#[async_trait]
impl Extractor<BuildModel> for EmptyBuildExtractor {
    fn name(&self) -> &str {
        "empty"
    }

    async fn extract(&self, _target: &Path) -> Result<BuildModel> {
        Ok(BuildModel::default())
    }
}

/// Built-in extractor producing a source file with no elements.
struct EmptyCodeExtractor;

#[async_trait]
impl Extractor<SourceFile> for EmptyCodeExtractor {
    fn name(&self) -> &str {
        "empty"
    }

    async fn extract(&self, target: &Path) -> Result<SourceFile> {
        Ok(SourceFile::new(target))
    }
}
