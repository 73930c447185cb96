//! The pipeline assembler: shared model sources and the run protocol.

use crate::analysis::component::{
    AnalysisComponent, AnalysisContext, ResultSink, StageHandle,
};
use crate::analysis::split::SplitComponent;
use crate::model::{BuildModel, Model, SourceFile, VariabilityModel};
use crate::provider::ModelProvider;
use crate::writer::{artifact_path, Record};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Assembles and runs one analysis DAG.
///
/// The three model sources are exposed through accessors that return a fresh
/// consumer view per call; the first demand for a source installs a fan-out
/// over it, so any number of stages can observe the same extraction. The
/// DAG is built by constructing stages bottom-up from already-constructed
/// inputs, which makes cycles unrepresentable.
pub struct PipelineAnalysis {
    ctx: Arc<AnalysisContext>,
    vm: SharedSource<VariabilityModel>,
    bm: SharedSource<BuildModel>,
    cm: SharedSource<SourceFile>,
}

impl PipelineAnalysis {
    /// Create an assembler over the three model providers.
    pub fn new(
        ctx: Arc<AnalysisContext>,
        vm: Arc<ModelProvider<VariabilityModel>>,
        bm: Arc<ModelProvider<BuildModel>>,
        cm: Arc<ModelProvider<SourceFile>>,
    ) -> Self {
        Self {
            ctx,
            vm: SharedSource::new("VariabilityModelSource", vm),
            bm: SharedSource::new("BuildModelSource", bm),
            cm: SharedSource::new("CodeModelSource", cm),
        }
    }

    /// The per-run stage context.
    pub fn context(&self) -> &Arc<AnalysisContext> {
        &self.ctx
    }

    /// A new consumer view of the variability model source.
    pub fn vm_component(&mut self) -> StageHandle<Arc<VariabilityModel>> {
        self.vm.component(&self.ctx)
    }

    /// A new consumer view of the build model source.
    pub fn bm_component(&mut self) -> StageHandle<Arc<BuildModel>> {
        self.bm.component(&self.ctx)
    }

    /// A new consumer view of the code model source.
    pub fn cm_component(&mut self) -> StageHandle<Arc<SourceFile>> {
        self.cm.component(&self.ctx)
    }

    /// Wrap a component into a stage of this pipeline.
    pub fn stage<C>(&self, component: C) -> StageHandle<C::Output>
    where
        C: AnalysisComponent,
    {
        StageHandle::new(component, self.ctx.clone())
    }

    /// Run the pipeline rooted at `terminal` and write its results.
    ///
    /// The terminal stage's records go to
    /// `<name>_result_<timestamp>.<ext>` in the output directory, published
    /// atomically once the stream ends. Returns every artifact found in the
    /// output directory afterwards.
    pub async fn run<T: Record>(&self, mut terminal: StageHandle<T>) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.ctx.output_dir).with_context(|| {
            format!(
                "output directory {} is not usable",
                self.ctx.output_dir.display()
            )
        })?;

        let path = artifact_path(
            &self.ctx.output_dir,
            terminal.name(),
            "result",
            self.ctx.writer_factory.extension(),
        );
        let mut writer = self.ctx.writer_factory.create(&path)?;

        tracing::info!("running analysis {}", terminal.name());

        while let Some(value) = terminal.next_result().await {
            match writer.write_record(&value.to_record()) {
                Ok(()) => self.ctx.metrics.add_result_written(),
                Err(e) => tracing::error!(error = %e, "failed to write result record"),
            }
        }

        match writer.finish() {
            Ok(published) => {
                tracing::info!("results written to {}", published.display());
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to publish result artifact");
            }
        }

        self.list_artifacts()
    }

    /// Enumerate the artifacts in the output directory for reporting.
    fn list_artifacts(&self) -> Result<Vec<PathBuf>> {
        let mut artifacts = Vec::new();
        for entry in std::fs::read_dir(&self.ctx.output_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                artifacts.push(entry.path());
            }
        }
        artifacts.sort();
        Ok(artifacts)
    }
}

/// A provider-backed source, shared among consumers through a fan-out.
struct SharedSource<M: Model + Record + Clone> {
    name: &'static str,
    state: SourceState<M>,
}

enum SourceState<M: Model + Record + Clone> {
    Unused(Option<Arc<ModelProvider<M>>>),
    Split(SplitComponent<Arc<M>>),
}

impl<M: Model + Record + Clone> SharedSource<M> {
    fn new(name: &'static str, provider: Arc<ModelProvider<M>>) -> Self {
        Self {
            name,
            state: SourceState::Unused(Some(provider)),
        }
    }

    /// Return a fresh consumer branch, installing the fan-out on first use.
    fn component(&mut self, ctx: &Arc<AnalysisContext>) -> StageHandle<Arc<M>> {
        if let SourceState::Unused(provider) = &mut self.state {
            let provider = provider.take().expect("source provider taken twice");
            let source = StageHandle::new(
                SourceComponent {
                    name: self.name,
                    provider,
                },
                ctx.clone(),
            );
            self.state = SourceState::Split(SplitComponent::new(source, ctx));
        }

        match &self.state {
            SourceState::Split(split) => split.create_output_component(),
            SourceState::Unused(_) => unreachable!("fan-out installed above"),
        }
    }
}

/// Leaf pseudo-stage pumping a provider's results into the DAG.
struct SourceComponent<M: Model + Record + Clone> {
    name: &'static str,
    provider: Arc<ModelProvider<M>>,
}

#[async_trait]
impl<M: Model + Record + Clone> AnalysisComponent for SourceComponent<M> {
    type Output = Arc<M>;

    fn result_name(&self) -> String {
        self.name.to_string()
    }

    fn is_internal_helper(&self) -> bool {
        true
    }

    async fn execute(self: Box<Self>, sink: &mut ResultSink<Arc<M>>) -> Result<()> {
        self.provider.start();
        while let Some(model) = self.provider.next_result().await {
            sink.add_result(model).await?;
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
    use tempfile::TempDir;

    fn provider_over(
        model: VariabilityModel,
    ) -> (
        Arc<CountingExtractor<VariabilityModel>>,
        Arc<ModelProvider<VariabilityModel>>,
    ) {
        let extractor = CountingExtractor::new(model);
        let provider = Arc::new(ModelProvider::new(
            extractor.clone(),
            vec![PathBuf::from("/src")],
            settings(),
            None,
            100,
            Metrics::new(),
        ));
        (extractor, provider)
    }

    fn idle_provider<M: Model + Clone>(model: M) -> Arc<ModelProvider<M>> {
        Arc::new(ModelProvider::new(
            CountingExtractor::new(model),
            Vec::new(),
            settings(),
            None,
            100,
            Metrics::new(),
        ))
    }

    #[tokio::test]
    async fn test_shared_source_extracts_once() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), &[]);

        let (extractor, vm) = provider_over(VariabilityModel::from_names(["Var_A", "Var_B"]));
        let mut analysis = PipelineAnalysis::new(
            ctx,
            vm,
            idle_provider(crate::model::BuildModel::default()),
            idle_provider(SourceFile::new("unused.c")),
        );

        let mut first = analysis.vm_component();
        let mut second = analysis.vm_component();

        let from_first = first.next_result().await.expect("model on first view");
        let from_second = second.next_result().await.expect("model on second view");
        assert_eq!(from_first.len(), 2);
        assert!(Arc::ptr_eq(&from_first, &from_second));

        assert!(first.next_result().await.is_none());
        assert!(second.next_result().await.is_none());
        assert_eq!(extractor.count(), 1);
    }

    #[tokio::test]
    async fn test_run_writes_terminal_artifact() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), &[]);

        let (_, vm) = provider_over(VariabilityModel::default());
        let analysis = PipelineAnalysis::new(
            ctx,
            vm,
            idle_provider(crate::model::BuildModel::default()),
            idle_provider(SourceFile::new("unused.c")),
        );

        let terminal = analysis.stage(crate::analysis::component::test_support::FixedStage::new(
            "Simple",
            &["Result1", "Result2"],
        ));
        let artifacts = analysis.run(terminal).await.unwrap();

        assert_eq!(artifacts.len(), 1);
        let name = artifacts[0].file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("Simple_result_"));
        assert_eq!(
            std::fs::read_to_string(&artifacts[0]).unwrap(),
            "Result1\nResult2\n"
        );
    }
}
