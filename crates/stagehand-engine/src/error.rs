use stagehand_types::{ClearContext, TaskError};

/// Why a bridged future settled without its task completing.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// The task was cleared before natural completion. Carries the full
    /// cancel context: who cleared it, why, and what (if anything)
    /// replaced it.
    #[error("task cleared: {}", .0.describe())]
    Cancelled(ClearContext),

    /// The task completed, but its payload reported a failure.
    #[error("task failed: {0}")]
    Failed(TaskError),

    /// A replacement storm exceeded the forward cap; this waiter rejects
    /// instead of chasing the chain further.
    #[error("replacement chain reached depth {depth}, cap {cap}")]
    Overflow { depth: usize, cap: usize },

    /// The coordinator went away without completing or clearing the task.
    #[error("task abandoned by its coordinator")]
    Abandoned,
}
