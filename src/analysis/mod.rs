//! The analysis DAG: stage runtime, fan-out, barrier, and assembler.

mod component;
mod join;
mod pipeline;
mod registry;
mod split;


pub use component::{
    AnalysisComponent, AnalysisContext, ResultSink, StageHandle, StreamClosed,
    DEFAULT_RESULT_CAPACITY,
};
pub use join::JoinComponent;
pub use pipeline::PipelineAnalysis;
pub use registry::{StageContext, StageFactory, StageRegistry};
pub use split::SplitComponent;
