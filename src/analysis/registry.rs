//! Named stage registry backing the configured pipeline.
//!
//! `analysis.pipeline` names stages by their registered key; the registry
//! instantiates them in order, piping each stage's output into the next.
//! The last named stage is the terminal stage. This is the declarative
//! counterpart to assembling a pipeline in code.

use crate::analysis::component::{AnalysisComponent, ResultSink, StageHandle};
use crate::analysis::pipeline::PipelineAnalysis;
use crate::model::{BuildModel, SourceFile, VariabilityModel};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// What a stage factory gets to work with: the assembler (for model
/// sources and stage wrapping) and the previous stage's output, if any.
pub struct StageContext<'a> {
    /// The assembler being populated.
    pub analysis: &'a mut PipelineAnalysis,

    /// Output of the previously instantiated stage; `None` for the first.
    pub input: Option<StageHandle<String>>,
}

/// Factory for one registered stage.
pub type StageFactory =
    Box<dyn Fn(StageContext<'_>) -> Result<StageHandle<String>> + Send + Sync>;

/// String-keyed stage factories.
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the built-in stages registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register("empty", |mut ctx: StageContext<'_>| {
            let stage = EmptyAnalysis {
                vm: ctx.analysis.vm_component(),
                bm: ctx.analysis.bm_component(),
                cm: ctx.analysis.cm_component(),
                input: ctx.input.take(),
            };
            Ok(ctx.analysis.stage(stage))
        });

        registry.register("variables", |ctx: StageContext<'_>| {
            if ctx.input.is_some() {
                bail!("stage 'variables' reads the variability model and takes no upstream input");
            }
            let analysis = ctx.analysis;
            let stage = VariableNames {
                vm: analysis.vm_component(),
            };
            Ok(analysis.stage(stage))
        });

        registry.register("source_files", |ctx: StageContext<'_>| {
            if ctx.input.is_some() {
                bail!("stage 'source_files' reads the code model and takes no upstream input");
            }
            let analysis = ctx.analysis;
            let stage = SourceFilePaths {
                cm: analysis.cm_component(),
            };
            Ok(analysis.stage(stage))
        });

        registry
    }

    /// Register a stage factory under `name`.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(StageContext<'_>) -> Result<StageHandle<String>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Names registered, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Instantiate the named stages as a linear pipeline; returns the
    /// terminal stage.
    pub fn build_pipeline(
        &self,
        analysis: &mut PipelineAnalysis,
        names: &[String],
    ) -> Result<StageHandle<String>> {
        let mut current: Option<StageHandle<String>> = None;

        for name in names {
            let Some(factory) = self.factories.get(name) else {
                bail!(
                    "unknown analysis stage '{}' (registered: {})",
                    name,
                    self.names().join(", ")
                );
            };
            current = Some(factory(StageContext {
                analysis: &mut *analysis,
                input: current.take(),
            })?);
        }

        match current {
            Some(terminal) => Ok(terminal),
            None => bail!("analysis.pipeline must name at least one stage"),
        }
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Starts all three model sources, logs what they produced, emits nothing.
struct EmptyAnalysis {
    vm: StageHandle<Arc<VariabilityModel>>,
    bm: StageHandle<Arc<BuildModel>>,
    cm: StageHandle<Arc<SourceFile>>,
    input: Option<StageHandle<String>>,
}

#[async_trait]
impl AnalysisComponent for EmptyAnalysis {
    type Output = String;

    fn result_name(&self) -> String {
        "EmptyAnalysis".to_string()
    }

    async fn execute(self: Box<Self>, _sink: &mut ResultSink<String>) -> Result<()> {
        let mut vm = self.vm;
        let mut bm = self.bm;
        let mut cm = self.cm;

        if let Some(mut input) = self.input {
            while input.next_result().await.is_some() {}
        }

        match vm.next_result().await {
            Some(model) => {
                tracing::info!("got a variability model with {} variables", model.len())
            }
            None => tracing::info!("got no variability model"),
        }
        while vm.next_result().await.is_some() {}

        match bm.next_result().await {
            Some(model) => tracing::info!("got a build model with {} files", model.len()),
            None => tracing::info!("got no build model"),
        }
        while bm.next_result().await.is_some() {}

        let mut num_files = 0;
        while cm.next_result().await.is_some() {
            num_files += 1;
        }
        tracing::info!("got {} source files in the code model", num_files);

        Ok(())
    }
}

/// Emits the name of every variable in the variability model.
struct VariableNames {
    vm: StageHandle<Arc<VariabilityModel>>,
}

#[async_trait]
impl AnalysisComponent for VariableNames {
    type Output = String;

    fn result_name(&self) -> String {
        "VariableNames".to_string()
    }

    async fn execute(self: Box<Self>, sink: &mut ResultSink<String>) -> Result<()> {
        let mut vm = self.vm;
        while let Some(model) = vm.next_result().await {
            for name in model.variable_names() {
                sink.add_result(name.to_string()).await?;
            }
        }
        Ok(())
    }
}

/// Emits the path of every source file in the code model.
struct SourceFilePaths {
    cm: StageHandle<Arc<SourceFile>>,
}

#[async_trait]
impl AnalysisComponent for SourceFilePaths {
    type Output = String;

    fn result_name(&self) -> String {
        "SourceFilePaths".to_string()
    }

    async fn execute(self: Box<Self>, sink: &mut ResultSink<String>) -> Result<()> {
        let mut cm = self.cm;
        while let Some(file) = cm.next_result().await {
            sink.add_result(file.path.display().to_string()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::component::test_support::test_context;
    use crate::metrics::Metrics;
    use crate::provider::test_support::{settings, CountingExtractor};
    use crate::provider::ModelProvider;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn analysis_over(vm_model: VariabilityModel, dir: &std::path::Path) -> PipelineAnalysis {
        let ctx = test_context(dir, &[]);
        let vm = Arc::new(ModelProvider::new(
            CountingExtractor::new(vm_model),
            vec![PathBuf::from("/src")],
            settings(),
            None,
            100,
            Metrics::new(),
        ));
        let bm = Arc::new(ModelProvider::new(
            CountingExtractor::new(BuildModel::default()),
            Vec::new(),
            settings(),
            None,
            100,
            Metrics::new(),
        ));
        let cm = Arc::new(ModelProvider::new(
            CountingExtractor::new(SourceFile::new("unused.c")),
            Vec::new(),
            settings(),
            None,
            100,
            Metrics::new(),
        ));
        PipelineAnalysis::new(ctx, vm, bm, cm)
    }

    #[tokio::test]
    async fn test_variables_pipeline() {
        let dir = TempDir::new().unwrap();
        let mut analysis =
            analysis_over(VariabilityModel::from_names(["Var_A", "Var_B"]), dir.path());

        let registry = StageRegistry::with_builtins();
        let mut terminal = registry
            .build_pipeline(&mut analysis, &["variables".to_string()])
            .unwrap();

        assert_eq!(terminal.name(), "VariableNames");
        assert_eq!(terminal.next_result().await.as_deref(), Some("Var_A"));
        assert_eq!(terminal.next_result().await.as_deref(), Some("Var_B"));
        assert_eq!(terminal.next_result().await, None);
    }

    #[tokio::test]
    async fn test_unknown_stage_is_setup_error() {
        let dir = TempDir::new().unwrap();
        let mut analysis = analysis_over(VariabilityModel::default(), dir.path());

        let registry = StageRegistry::with_builtins();
        let err = registry
            .build_pipeline(&mut analysis, &["nonsense".to_string()])
            .unwrap_err();

        assert!(err.to_string().contains("unknown analysis stage"));
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_setup_error() {
        let dir = TempDir::new().unwrap();
        let mut analysis = analysis_over(VariabilityModel::default(), dir.path());

        let registry = StageRegistry::with_builtins();
        assert!(registry.build_pipeline(&mut analysis, &[]).is_err());
    }

    #[test]
    fn test_builtin_names() {
        let registry = StageRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["empty", "source_files", "variables"]);
    }
}
