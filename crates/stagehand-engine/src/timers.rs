use std::time::Duration;

use stagehand_registry::CompleteHook;
use stagehand_types::{TaskId, TaskKind, TaskResult};
use tokio::time::MissedTickBehavior;

use crate::coordinator::{Coordinator, Inner};
use crate::options::{TaskContext, TaskOptions};

/// How many scheduler passes an idle task lets drain before it runs.
const IDLE_YIELD_BUDGET: usize = 32;

impl<V: Clone + Send + 'static> Coordinator<V> {
    /// Run a payload on the next tick of the runtime.
    pub fn set_immediate<F>(&self, payload: F, opts: TaskOptions) -> TaskId
    where
        F: FnOnce(&TaskContext) -> TaskResult<V> + Send + 'static,
    {
        self.set_immediate_with(payload, opts, Vec::new())
    }

    pub(crate) fn set_immediate_with<F>(
        &self,
        payload: F,
        opts: TaskOptions,
        waiters: Vec<CompleteHook<V>>,
    ) -> TaskId
    where
        F: FnOnce(&TaskContext) -> TaskResult<V> + Send + 'static,
    {
        let weak = self.weak_inner();
        self.register_spawned(
            TaskKind::Immediate,
            false,
            opts,
            waiters,
            None,
            move |ctx| async move {
                tokio::task::yield_now().await;
                Inner::complete_single(&weak, TaskKind::Immediate, &ctx, payload);
            },
        )
    }

    /// Run a payload once after `delay`. A zero delay fires on the next
    /// scheduler pass.
    pub fn set_timeout<F>(&self, delay: Duration, payload: F, opts: TaskOptions) -> TaskId
    where
        F: FnOnce(&TaskContext) -> TaskResult<V> + Send + 'static,
    {
        self.set_timeout_with(delay, payload, opts, Vec::new())
    }

    pub(crate) fn set_timeout_with<F>(
        &self,
        delay: Duration,
        payload: F,
        opts: TaskOptions,
        waiters: Vec<CompleteHook<V>>,
    ) -> TaskId
    where
        F: FnOnce(&TaskContext) -> TaskResult<V> + Send + 'static,
    {
        let weak = self.weak_inner();
        self.register_spawned(
            TaskKind::Timeout,
            false,
            opts,
            waiters,
            None,
            move |ctx| async move {
                tokio::time::sleep(delay).await;
                Inner::complete_single(&weak, TaskKind::Timeout, &ctx, payload);
            },
        )
    }

    /// Run a payload every `period`. Interval tasks never self-remove;
    /// they run until cleared.
    pub fn set_interval<F>(&self, period: Duration, mut payload: F, opts: TaskOptions) -> TaskId
    where
        F: FnMut(&TaskContext) + Send + 'static,
    {
        // tokio rejects a zero interval period.
        let period = period.max(Duration::from_millis(1));
        let weak = self.weak_inner();
        self.register_spawned(
            TaskKind::Interval,
            true,
            opts,
            Vec::new(),
            None,
            move |ctx| async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // Consume the immediate first tick; the first fire lands
                // one full period after registration.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if !inner
                        .registry()
                        .is_live(TaskKind::Interval, ctx.group.as_ref(), ctx.id)
                    {
                        return;
                    }
                    drop(inner);
                    payload(&ctx);
                }
            },
        )
    }

    /// Run a payload on the next frame-clock tick.
    pub fn request_frame<F>(&self, payload: F, opts: TaskOptions) -> TaskId
    where
        F: FnOnce(&TaskContext) -> TaskResult<V> + Send + 'static,
    {
        self.request_frame_with(payload, opts, Vec::new())
    }

    pub(crate) fn request_frame_with<F>(
        &self,
        payload: F,
        opts: TaskOptions,
        waiters: Vec<CompleteHook<V>>,
    ) -> TaskId
    where
        F: FnOnce(&TaskContext) -> TaskResult<V> + Send + 'static,
    {
        let mut frames = self.inner().frame_clock().subscribe();
        let weak = self.weak_inner();
        self.register_spawned(
            TaskKind::Frame,
            false,
            opts,
            waiters,
            None,
            move |ctx| async move {
                if frames.changed().await.is_err() {
                    // Clock gone: the coordinator dropped mid-flight.
                    return;
                }
                Inner::complete_single(&weak, TaskKind::Frame, &ctx, payload);
            },
        )
    }

    /// Run a payload once the runtime has drained its queue, no later than
    /// `deadline` when one is given.
    pub fn request_idle<F>(
        &self,
        payload: F,
        deadline: Option<Duration>,
        opts: TaskOptions,
    ) -> TaskId
    where
        F: FnOnce(&TaskContext) -> TaskResult<V> + Send + 'static,
    {
        self.request_idle_with(payload, deadline, opts, Vec::new())
    }

    pub(crate) fn request_idle_with<F>(
        &self,
        payload: F,
        deadline: Option<Duration>,
        opts: TaskOptions,
        waiters: Vec<CompleteHook<V>>,
    ) -> TaskId
    where
        F: FnOnce(&TaskContext) -> TaskResult<V> + Send + 'static,
    {
        let weak = self.weak_inner();
        self.register_spawned(
            TaskKind::Idle,
            false,
            opts,
            waiters,
            None,
            move |ctx| async move {
                let drain = async {
                    for _ in 0..IDLE_YIELD_BUDGET {
                        tokio::task::yield_now().await;
                    }
                };
                match deadline {
                    Some(cap) => {
                        tokio::select! {
                            _ = drain => {}
                            _ = tokio::time::sleep(cap) => {}
                        }
                    }
                    None => drain.await,
                }
                Inner::complete_single(&weak, TaskKind::Idle, &ctx, payload);
            },
        )
    }
}
