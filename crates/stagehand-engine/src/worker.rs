use std::sync::Arc;

use stagehand_registry::Destructor;
use stagehand_types::{CoordinatorError, TaskId, TaskKind};

use crate::coordinator::Coordinator;
use crate::options::TaskOptions;

/// What a worker handle's terminate attempt reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminateOutcome {
    Terminated,
    /// The handle offers no way to stop the underlying unit of work.
    /// Clearing such a worker is a programmer error — the coordinator
    /// surfaces `MissingDestructor` and removes the entry anyway.
    Unsupported,
}

/// A long-lived unit of work the caller supplies and the coordinator only
/// tracks and tears down.
pub trait Worker: Send + Sync {
    fn terminate(&self) -> TerminateOutcome;
}

impl<V: Clone + Send + 'static> Coordinator<V> {
    /// Track a caller-supplied worker. Worker tasks are interval-like:
    /// they stay registered until cleared, and clearing terminates them.
    pub fn worker<W>(&self, handle: Arc<W>, opts: TaskOptions) -> TaskId
    where
        W: Worker + 'static,
    {
        let mut opts = opts;
        let mut waiters = Vec::new();
        if let Some(incumbent) = self.try_share(TaskKind::Worker, &mut opts, &mut waiters) {
            return incumbent;
        }
        let id = self.alloc_id();
        let destructor: Destructor = Box::new(move |_, ctx| match handle.terminate() {
            TerminateOutcome::Terminated => Ok(()),
            TerminateOutcome::Unsupported => Err(CoordinatorError::MissingDestructor {
                kind: TaskKind::Worker,
                name: ctx.name.clone().unwrap_or_else(|| "worker".to_owned()),
            }),
        });
        self.install_new(id, TaskKind::Worker, true, opts, waiters, Some(destructor))
    }
}

#[cfg(test)]
mod tests {
    use stagehand_types::JoinPolicy;

    use crate::test_support::NamedWorker;

    use super::*;

    #[tokio::test]
    async fn clearing_a_worker_terminates_it_exactly_once() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let worker = Arc::new(NamedWorker::new());
        let id = coordinator.worker(worker.clone(), TaskOptions::new());

        assert_eq!(coordinator.clear_worker(id).unwrap(), 1);
        assert_eq!(worker.terminations(), 1);
        assert_eq!(coordinator.clear_worker(id).unwrap(), 0);
        assert_eq!(worker.terminations(), 1);
    }

    #[tokio::test]
    async fn unsupported_worker_surfaces_missing_destructor_but_is_removed() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let id = coordinator.worker(
            Arc::new(NamedWorker::unsupported()),
            TaskOptions::new().name("renderer"),
        );

        let err = coordinator.clear_worker(id).unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::MissingDestructor {
                kind: TaskKind::Worker,
                name: "renderer".to_owned(),
            }
        );
        // Leaking is worse than shouting: the entry is gone regardless.
        assert!(coordinator.snapshot().kinds.is_empty());
    }

    #[tokio::test]
    async fn relabeled_worker_terminates_the_displaced_one() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let first = Arc::new(NamedWorker::new());
        let second = Arc::new(NamedWorker::new());
        coordinator.worker(first.clone(), TaskOptions::new().label("render"));
        coordinator.worker(second.clone(), TaskOptions::new().label("render"));

        assert_eq!(first.terminations(), 1);
        assert_eq!(second.terminations(), 0);
    }

    #[tokio::test]
    async fn share_join_keeps_the_incumbent_worker() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let first = Arc::new(NamedWorker::new());
        let second = Arc::new(NamedWorker::new());
        let a = coordinator.worker(
            first.clone(),
            TaskOptions::new().label("render").join(JoinPolicy::Share),
        );
        let b = coordinator.worker(
            second.clone(),
            TaskOptions::new().label("render").join(JoinPolicy::Share),
        );

        assert_eq!(a, b);
        assert_eq!(first.terminations(), 0);
        coordinator.clear_worker(a).unwrap();
        assert_eq!(first.terminations(), 1);
        // The late arrival's handle was never adopted.
        assert_eq!(second.terminations(), 0);
    }
}
