//! Fan-out of one result stream to any number of consumer branches.

use crate::analysis::component::{AnalysisContext, StageHandle};
use crate::writer::Record;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Delivers every result of an input stage to N consumer branches.
///
/// Each call to [`create_output_component`](Self::create_output_component)
/// returns a new branch that observes a copy of every value, in production
/// order. Back-pressure is per branch: a saturated branch stalls the copier
/// (and so, transitively, the input stage) until the branch is drained.
///
/// The copier starts when the first branch is demanded; branches must be
/// created before that. All branches close when the input stream ends.
pub struct SplitComponent<T> {
    core: Arc<SplitCore<T>>,
    capacity: usize,
}

struct SplitCore<T> {
    state: Mutex<CoreState<T>>,
}

enum CoreState<T> {
    /// Collecting branches; the input has not been started yet.
    Gathering {
        input: StageHandle<T>,
        branches: Vec<mpsc::Sender<T>>,
    },
    /// Copier task running; no further branches can join.
    Started,
}

impl<T: Record + Clone> SplitComponent<T> {
    /// Wrap an input stage for fan-out.
    pub fn new(input: StageHandle<T>, ctx: &AnalysisContext) -> Self {
        Self {
            core: Arc::new(SplitCore {
                state: Mutex::new(CoreState::Gathering {
                    input,
                    branches: Vec::new(),
                }),
            }),
            capacity: ctx.result_capacity,
        }
    }

    /// Create another consumer branch of the input stream.
    ///
    /// Branches created after the copier has started receive an immediate
    /// end-of-stream; this is a wiring bug and is logged as such.
    pub fn create_output_component(&self) -> StageHandle<T> {
        let (tx, rx) = mpsc::channel(self.capacity);

        let mut state = self.core.state.lock().expect("split state poisoned");
        match &mut *state {
            CoreState::Gathering { branches, .. } => {
                branches.push(tx);
            }
            CoreState::Started => {
                tracing::warn!("split branch created after the split started; it will be empty");
                drop(tx);
            }
        }
        drop(state);

        let core = self.core.clone();
        StageHandle::from_lazy(
            "SplitOutputComponent".to_string(),
            true,
            Box::new(move || {
                core.ensure_started();
                rx
            }),
        )
    }
}

impl<T: Record + Clone> SplitCore<T> {
    /// Start the copier task on first branch demand.
    fn ensure_started(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("split state poisoned");
        if matches!(*state, CoreState::Gathering { .. }) {
            let taken = std::mem::replace(&mut *state, CoreState::Started);
            drop(state);

            if let CoreState::Gathering {
                mut input,
                branches,
            } = taken
            {
                tokio::spawn(async move {
                    while let Some(value) = input.next_result().await {
                        for branch in &branches {
                            // A dropped branch just stops receiving; the
                            // remaining branches still get every value.
                            let _ = branch.send(value.clone()).await;
                        }
                    }
                    // Dropping the senders closes every branch.
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::component::test_support::{test_context, FixedStage};
    use tempfile::TempDir;

    async fn drain(handle: &mut StageHandle<String>) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some(v) = handle.next_result().await {
            seen.push(v);
        }
        seen
    }

    #[tokio::test]
    async fn test_both_branches_see_all_values_in_order() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), &[]);

        let input = StageHandle::new(FixedStage::new("Source", &["a", "b", "c"]), ctx.clone());
        let split = SplitComponent::new(input, &ctx);

        let mut first = split.create_output_component();
        let mut second = split.create_output_component();

        // Interleaved reads: both branches advance through the same sequence.
        assert_eq!(first.next_result().await.as_deref(), Some("a"));
        assert_eq!(second.next_result().await.as_deref(), Some("a"));
        assert_eq!(second.next_result().await.as_deref(), Some("b"));
        assert_eq!(first.next_result().await.as_deref(), Some("b"));

        assert_eq!(drain(&mut first).await, vec!["c"]);
        assert_eq!(drain(&mut second).await, vec!["c"]);
    }

    #[tokio::test]
    async fn test_sequential_branch_reads() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), &[]);

        let input = StageHandle::new(FixedStage::new("Source", &["x", "y"]), ctx.clone());
        let split = SplitComponent::new(input, &ctx);

        let mut first = split.create_output_component();
        let mut second = split.create_output_component();

        // Reading the first branch to the end is fine as long as the other
        // branch's queue can hold the values in the meantime.
        assert_eq!(drain(&mut first).await, vec!["x", "y"]);
        assert_eq!(drain(&mut second).await, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_dropped_branch_does_not_stall_others() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), &[]);

        let input = StageHandle::new(FixedStage::new("Source", &["1", "2", "3"]), ctx.clone());
        let split = SplitComponent::new(input, &ctx);

        let dropped = split.create_output_component();
        let mut kept = split.create_output_component();
        drop(dropped);

        assert_eq!(drain(&mut kept).await, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_late_branch_is_empty() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), &[]);

        let input = StageHandle::new(FixedStage::new("Source", &["v"]), ctx.clone());
        let split = SplitComponent::new(input, &ctx);

        let mut first = split.create_output_component();
        assert_eq!(drain(&mut first).await, vec!["v"]);

        let mut late = split.create_output_component();
        assert_eq!(late.next_result().await, None);
    }

    #[tokio::test]
    async fn test_branches_are_helpers() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(dir.path(), &[]);

        let input = StageHandle::new(FixedStage::new("Source", &[]), ctx.clone());
        let split = SplitComponent::new(input, &ctx);

        let branch = split.create_output_component();
        assert!(branch.is_internal_helper());
        assert_eq!(branch.name(), "SplitOutputComponent");
    }
}
