//! The stage runtime: typed streaming workers connected by bounded queues.
//!
//! A stage is an [`AnalysisComponent`]: a work function producing zero or
//! more results of one element type. Starting a stage spawns its work
//! function as a task feeding a bounded channel; downstream stages read the
//! channel through a [`StageHandle`] until it signals end-of-stream.
//!
//! End-of-stream is the explicit `None` from [`StageHandle::next_result`];
//! payloads are owned values and can never be confused with the end marker.

use crate::metrics::Metrics;
use crate::writer::{artifact_path, Record, RecordWriter, WriterFactory};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Back-pressure capacity of a stage's result queue unless configured.
pub const DEFAULT_RESULT_CAPACITY: usize = 100;

/// Shared per-run context handed to every stage.
pub struct AnalysisContext {
    /// Destination for result artifacts.
    pub output_dir: PathBuf,

    /// Stage names whose results are mirrored to an intermediate artifact.
    pub log_components: HashSet<String>,

    /// Capacity of each stage's result queue.
    pub result_capacity: usize,

    /// Writer factory for result and intermediate artifacts.
    pub writer_factory: Arc<dyn WriterFactory>,

    /// Run-wide metrics.
    pub metrics: Arc<Metrics>,
}

impl AnalysisContext {
    /// Build the context from a configuration.
    pub fn new(
        config: &crate::config::Config,
        writer_factory: Arc<dyn WriterFactory>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            output_dir: config.output_dir.clone(),
            log_components: config.analysis.log_components.iter().cloned().collect(),
            result_capacity: config.analysis.result_capacity,
            writer_factory,
            metrics,
        })
    }
}

/// Returned by [`ResultSink::add_result`] when every consumer is gone.
///
/// Treated as a normal early stop, not a stage failure.
#[derive(Debug, Error)]
#[error("all consumers of the result stream are gone")]
pub struct StreamClosed;

/// A typed streaming worker in the analysis DAG.
#[async_trait]
pub trait AnalysisComponent: Send + 'static {
    /// Element type of the output stream.
    type Output: Record;

    /// Stable display name; defaults to the implementation's type name.
    fn result_name(&self) -> String {
        short_type_name(std::any::type_name_of_val(self)).to_string()
    }

    /// Helpers (split, join, sources) are not surfaced to intermediate
    /// logging.
    fn is_internal_helper(&self) -> bool {
        false
    }

    /// The work function. Results go to `sink`; returning closes the output
    /// stream. An error is logged and closes the stream early.
    async fn execute(self: Box<Self>, sink: &mut ResultSink<Self::Output>) -> Result<()>;
}

/// Strip module path and generic parameters from a full type name.
fn short_type_name(full: &str) -> &str {
    let no_generics = full.split('<').next().unwrap_or(full);
    no_generics.rsplit("::").next().unwrap_or(no_generics)
}

/// Producer side of a stage's result stream.
///
/// Owned by the stage runner and lent to the work function; once the work
/// function returns, the sink is closed and no further result can be added.
pub struct ResultSink<T: Record> {
    tx: mpsc::Sender<T>,
    intermediate: IntermediateLog,
    metrics: Arc<Metrics>,
}

/// Lazily opened mirror of a stage's results to a per-stage artifact.
enum IntermediateLog {
    Disabled,
    Pending {
        ctx: Arc<AnalysisContext>,
        stage: String,
    },
    Open(Box<dyn RecordWriter>),
}

impl<T: Record> ResultSink<T> {
    fn new(tx: mpsc::Sender<T>, intermediate: IntermediateLog, metrics: Arc<Metrics>) -> Self {
        Self {
            tx,
            intermediate,
            metrics,
        }
    }

    /// Enqueue a result, blocking while the queue is at capacity.
    ///
    /// Fails with [`StreamClosed`] once every consumer handle is dropped.
    pub async fn add_result(&mut self, value: T) -> Result<()> {
        self.log_intermediate(&value);
        self.metrics.add_result_produced();
        self.tx.send(value).await.map_err(|_| StreamClosed)?;
        Ok(())
    }

    fn log_intermediate(&mut self, value: &T) {
        if matches!(self.intermediate, IntermediateLog::Pending { .. }) {
            let taken = std::mem::replace(&mut self.intermediate, IntermediateLog::Disabled);
            if let IntermediateLog::Pending { ctx, stage } = taken {
                let path = artifact_path(
                    &ctx.output_dir,
                    &stage,
                    "intermediate_result",
                    ctx.writer_factory.extension(),
                );
                self.intermediate = match ctx.writer_factory.create(&path) {
                    Ok(writer) => IntermediateLog::Open(writer),
                    Err(e) => {
                        tracing::error!(
                            stage = %stage,
                            error = %e,
                            "failed to open intermediate result file"
                        );
                        IntermediateLog::Disabled
                    }
                };
            }
        }

        if let IntermediateLog::Open(writer) = &mut self.intermediate {
            if let Err(e) = writer.write_record(&value.to_record()) {
                tracing::error!(error = %e, "failed to write intermediate result");
            }
        }
    }

    /// Publish the intermediate artifact, if one was opened.
    fn close(&mut self) {
        let log = std::mem::replace(&mut self.intermediate, IntermediateLog::Disabled);
        if let IntermediateLog::Open(writer) = log {
            match writer.finish() {
                Ok(path) => tracing::debug!("intermediate results written to {}", path.display()),
                Err(e) => tracing::error!(error = %e, "failed to publish intermediate results"),
            }
        }
    }
}

/// Lifecycle of a stage as seen through its handle.
enum HandleState<T> {
    /// Work function not yet spawned.
    Created(Box<dyn FnOnce() -> mpsc::Receiver<T> + Send>),
    /// Worker running (or finished with results still queued).
    Started(mpsc::Receiver<T>),
    /// End-of-stream observed; stays here forever.
    Finished,
}

/// Consumer side of a stage: lifecycle control plus the result stream.
///
/// Exactly one handle exists per stream; fan-out to several consumers goes
/// through [`SplitComponent`](crate::analysis::SplitComponent).
pub struct StageHandle<T> {
    name: String,
    helper: bool,
    state: HandleState<T>,
}

impl<T> std::fmt::Debug for StageHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandle")
            .field("name", &self.name)
            .field("helper", &self.helper)
            .finish_non_exhaustive()
    }
}

impl<T: Record> StageHandle<T> {
    /// Wrap a component; its work function is spawned on first demand.
    pub fn new<C>(component: C, ctx: Arc<AnalysisContext>) -> Self
    where
        C: AnalysisComponent<Output = T>,
    {
        let name = component.result_name();
        let helper = component.is_internal_helper();

        let spawn_name = name.clone();
        let spawn = Box::new(move || {
            let (tx, rx) = mpsc::channel(ctx.result_capacity);

            let intermediate = if !helper && ctx.log_components.contains(&spawn_name) {
                IntermediateLog::Pending {
                    ctx: ctx.clone(),
                    stage: spawn_name.clone(),
                }
            } else {
                IntermediateLog::Disabled
            };

            let sink = ResultSink::new(tx, intermediate, ctx.metrics.clone());
            tokio::spawn(run_stage(Box::new(component), sink, spawn_name, ctx));
            rx
        });

        Self {
            name,
            helper,
            state: HandleState::Created(spawn),
        }
    }

    /// A handle over an already-running stream (split branches, sources).
    pub(crate) fn from_lazy(
        name: String,
        helper: bool,
        spawn: Box<dyn FnOnce() -> mpsc::Receiver<T> + Send>,
    ) -> Self {
        Self {
            name,
            helper,
            state: HandleState::Created(spawn),
        }
    }

    /// Stable display name of the stage.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this stage is an internal helper.
    pub fn is_internal_helper(&self) -> bool {
        self.helper
    }

    /// Start the stage's work function. Idempotent; returns immediately.
    pub fn start(&mut self) {
        if matches!(self.state, HandleState::Created(_)) {
            let state = std::mem::replace(&mut self.state, HandleState::Finished);
            if let HandleState::Created(spawn) = state {
                self.state = HandleState::Started(spawn());
            }
        }
    }

    /// Next result, or `None` once the stream has ended.
    ///
    /// Implies [`start`](Self::start). Results arrive in production order;
    /// after end-of-stream every further call returns `None`.
    pub async fn next_result(&mut self) -> Option<T> {
        self.start();
        match &mut self.state {
            HandleState::Started(rx) => {
                let value = rx.recv().await;
                if value.is_none() {
                    self.state = HandleState::Finished;
                }
                value
            }
            HandleState::Finished => None,
            HandleState::Created(_) => unreachable!("start() transitions out of Created"),
        }
    }
}

/// Drive one stage to completion: run the work function, record the outcome,
/// close the output stream.
async fn run_stage<T: Record>(
    component: Box<dyn AnalysisComponent<Output = T>>,
    mut sink: ResultSink<T>,
    name: String,
    ctx: Arc<AnalysisContext>,
) {
    ctx.metrics.add_stage_started();
    tracing::debug!(stage = %name, "stage started");

    match component.execute(&mut sink).await {
        Ok(()) => tracing::debug!(stage = %name, "stage finished"),
        Err(e) if e.is::<StreamClosed>() => {
            tracing::debug!(stage = %name, "stage stopped, consumers are gone");
        }
        Err(e) => {
            tracing::error!(stage = %name, error = format!("{:#}", e), "stage failed");
        }
    }

    sink.close();
    ctx.metrics.add_stage_finished();
    // Dropping the sink here closes the stream; end-of-stream is observed
    // only after the intermediate artifact has been published.
}
