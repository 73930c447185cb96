//! Barrier stage awaiting the completion of parallel sub-pipelines.

use crate::analysis::component::{AnalysisComponent, ResultSink, StageHandle};
use crate::writer::Record;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;

/// Drains N input stages to end-of-stream and emits nothing.
///
/// A branching pipeline joins its branch ends here so the graph has a single
/// root; the join completing means every branch has completed. Inputs may
/// have different element types.
#[derive(Default)]
pub struct JoinComponent {
    drains: Vec<BoxFuture<'static, ()>>,
}

impl JoinComponent {
    /// Create a join with no inputs yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input stage to await.
    pub fn add_input<T: Record>(&mut self, mut input: StageHandle<T>) {
        self.drains.push(Box::pin(async move {
            while input.next_result().await.is_some() {}
        }));
    }

    /// Number of inputs added so far.
    pub fn len(&self) -> usize {
        self.drains.len()
    }

    /// Whether no inputs have been added.
    pub fn is_empty(&self) -> bool {
        self.drains.is_empty()
    }
}

#[async_trait]
impl AnalysisComponent for JoinComponent {
    type Output = ();

    fn result_name(&self) -> String {
        "JoinComponent".to_string()
    }

    fn is_internal_helper(&self) -> bool {
        true
    }

    async fn execute(self: Box<Self>, _sink: &mut ResultSink<()>) -> Result<()> {
        // Drain concurrently: the branches share one upstream copier, so a
        // sequential drain could stall it on a saturated sibling queue.
        futures::future::join_all(self.drains).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::component::test_support::{test_context, FixedStage};
    use crate::analysis::split::SplitComponent;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_join_completes_after_all_inputs() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), &[]);

        let a = StageHandle::new(FixedStage::new("A", &["1", "2"]), ctx.clone());
        let b = StageHandle::new(FixedStage::new("B", &["3"]), ctx.clone());

        let mut join = JoinComponent::new();
        join.add_input(a);
        join.add_input(b);
        assert_eq!(join.len(), 2);

        let mut handle = StageHandle::new(join, ctx);
        assert_eq!(handle.next_result().await, None);
    }

    #[tokio::test]
    async fn test_join_over_split_branches() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), &[]);

        // More values than a branch queue of capacity 100 would be needed to
        // prove the concurrent drain, but even this wires the full shape:
        // source -> split -> two branches -> join.
        let values: Vec<String> = (0..10).map(|i| format!("v{}", i)).collect();
        let value_refs: Vec<&str> = values.iter().map(String::as_str).collect();

        let input = StageHandle::new(FixedStage::new("Source", &value_refs), ctx.clone());
        let split = SplitComponent::new(input, &ctx);

        let mut join = JoinComponent::new();
        join.add_input(split.create_output_component());
        join.add_input(split.create_output_component());

        let mut handle = StageHandle::new(join, ctx);
        assert_eq!(handle.next_result().await, None);
        assert!(handle.is_internal_helper());
        assert_eq!(handle.name(), "JoinComponent");
    }
}
