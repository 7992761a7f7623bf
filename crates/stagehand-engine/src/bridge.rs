use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex as StdMutex;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use stagehand_registry::{CompleteHook, FORWARD_CAP, Selector};
use stagehand_types::{ClearContext, Key, TaskId, TaskKind, TaskResult};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

use crate::coordinator::{Coordinator, Inner};
use crate::error::BridgeError;
use crate::listener::Emitter;
use crate::options::{SharedClearHook, TaskOptions};

/// Probe period for [`Coordinator::wait`].
const WAIT_PROBE: Duration = Duration::from_millis(15);

type Settlement<V> = Result<Option<V>, BridgeError>;

/// One-shot settlement slot shared between a completion waiter and a clear
/// hook. Whichever fires first takes the sender; the loser's call is a
/// no-op, which is what makes forwarded hook pairs safe to fire twice
/// across different links.
pub(crate) struct BridgeSlot<V> {
    slot: Arc<StdMutex<Option<oneshot::Sender<Settlement<V>>>>>,
}

impl<V: Clone + Send + 'static> BridgeSlot<V> {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Settlement<V>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(StdMutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Completion waiter: resolves with the task's outcome.
    pub(crate) fn complete_hook(&self) -> CompleteHook<V> {
        let slot = Arc::clone(&self.slot);
        Box::new(move |outcome: &TaskResult<V>| {
            if let Some(tx) = slot.lock().unwrap().take() {
                let settlement = match outcome {
                    Ok(value) => Ok(value.clone()),
                    Err(error) => Err(BridgeError::Failed(error.clone())),
                };
                let _ = tx.send(settlement);
            }
        })
    }

    /// Cancel hook: rejects with the clear context, or with overflow when
    /// a replacement chain reached the forward cap.
    pub(crate) fn clear_hook(&self) -> SharedClearHook {
        let slot = Arc::clone(&self.slot);
        Arc::new(move |ctx: &ClearContext| {
            if let Some(tx) = slot.lock().unwrap().take() {
                let settlement = if ctx.replaced_by.is_some() && ctx.forward_depth >= FORWARD_CAP {
                    Err(BridgeError::Overflow {
                        depth: ctx.forward_depth,
                        cap: FORWARD_CAP,
                    })
                } else {
                    Err(BridgeError::Cancelled(ctx.clone()))
                };
                let _ = tx.send(settlement);
            }
        })
    }
}

/// A registered task in future form.
///
/// Resolves with the task's completion value, rejects with the cancel
/// context if the task is cleared, and follows `Replace` forwarding to
/// whatever superseded the task.
pub struct Bridged<V> {
    id: TaskId,
    rx: oneshot::Receiver<Settlement<V>>,
}

impl<V> Bridged<V> {
    pub(crate) fn new(id: TaskId, rx: oneshot::Receiver<Settlement<V>>) -> Self {
        Self { id, rx }
    }

    /// The underlying registration, usable with the matching clear call.
    pub fn task_id(&self) -> TaskId {
        self.id
    }
}

impl<V> Future for Bridged<V> {
    type Output = Settlement<V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|message| {
            match message {
                Ok(settlement) => settlement,
                Err(_) => Err(BridgeError::Abandoned),
            }
        })
    }
}

impl<V: Clone + Send + 'static> Coordinator<V> {
    fn bridge_parts(opts: TaskOptions) -> (TaskOptions, Vec<CompleteHook<V>>, oneshot::Receiver<Settlement<V>>) {
        let (slot, rx) = BridgeSlot::new();
        let mut opts = opts;
        opts.on_clear.push(slot.clear_hook());
        (opts, vec![slot.complete_hook()], rx)
    }

    /// One-shot timer in future form.
    pub fn sleep(&self, delay: Duration, opts: TaskOptions) -> Bridged<V> {
        let (opts, waiters, rx) = Self::bridge_parts(opts);
        let id = self.set_timeout_with(delay, |_| Ok(None), opts, waiters);
        Bridged::new(id, rx)
    }

    /// Next-tick callback in future form.
    pub fn next_tick(&self, opts: TaskOptions) -> Bridged<V> {
        let (opts, waiters, rx) = Self::bridge_parts(opts);
        let id = self.set_immediate_with(|_| Ok(None), opts, waiters);
        Bridged::new(id, rx)
    }

    /// Idle slot in future form.
    pub fn idle(&self, deadline: Option<Duration>, opts: TaskOptions) -> Bridged<V> {
        let (opts, waiters, rx) = Self::bridge_parts(opts);
        let id = self.request_idle_with(|_| Ok(None), deadline, opts, waiters);
        Bridged::new(id, rx)
    }

    /// Next frame tick in future form.
    pub fn frame(&self, opts: TaskOptions) -> Bridged<V> {
        let (opts, waiters, rx) = Self::bridge_parts(opts);
        let id = self.request_frame_with(|_| Ok(None), opts, waiters);
        Bridged::new(id, rx)
    }

    /// Track an arbitrary future under the registry: it becomes clearable
    /// and joins like any request.
    pub fn promise<Fut>(&self, fut: Fut, opts: TaskOptions) -> Bridged<V>
    where
        Fut: Future<Output = TaskResult<V>> + Send + 'static,
    {
        let (opts, waiters, rx) = Self::bridge_parts(opts);
        let weak = self.weak_inner();
        let id = self.register_spawned(
            TaskKind::Request,
            false,
            opts,
            waiters,
            None,
            move |ctx| async move {
                let outcome = fut.await;
                Inner::complete_single(&weak, TaskKind::Request, &ctx, move |_| outcome);
            },
        );
        Bridged::new(id, rx)
    }

    /// Resolve once a predicate turns true, probing every 15 ms. Clearing
    /// the underlying interval rejects the future.
    pub fn wait<P>(&self, predicate: P, opts: TaskOptions) -> Bridged<V>
    where
        P: Fn() -> bool + Send + 'static,
    {
        let (opts, waiters, rx) = Self::bridge_parts(opts);
        let weak = self.weak_inner();
        let id = self.register_spawned(
            TaskKind::Interval,
            false,
            opts,
            waiters,
            None,
            move |ctx| async move {
                let mut probe = tokio::time::interval(WAIT_PROBE);
                probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    // The first tick completes immediately, so an
                    // already-true predicate resolves without waiting a
                    // full probe period.
                    probe.tick().await;
                    if predicate() {
                        Inner::complete_single(&weak, TaskKind::Interval, &ctx, |_| Ok(None));
                        return;
                    }
                }
            },
        );
        Bridged::new(id, rx)
    }

    /// Resolve on the first fire of any of the given events, then drop the
    /// sibling subscriptions.
    pub fn promisify_once<E>(&self, emitter: &Arc<E>, events: &str, opts: TaskOptions) -> Bridged<V>
    where
        E: Emitter<V> + 'static,
    {
        let (slot, rx) = BridgeSlot::new();
        let weak = self.downgrade();
        let siblings: Arc<OnceLock<Vec<(Option<Key>, TaskId)>>> = Arc::new(OnceLock::new());
        let silent: crate::listener::ListenerHandler<V> = Arc::new(|_, _| {});

        let mut ids = Vec::new();
        for event in events.split_whitespace() {
            let mut event_opts = opts.clone();
            event_opts.on_clear.push(slot.clear_hook());

            let weak_cleanup = weak.clone();
            let siblings_cleanup = Arc::clone(&siblings);
            let cleanup: CompleteHook<V> = Box::new(move |_| {
                let Some(coordinator) = weak_cleanup.upgrade() else {
                    return;
                };
                let Some(entries) = siblings_cleanup.get() else {
                    return;
                };
                for (group, id) in entries {
                    let mut selector = Selector::from(*id);
                    if let Some(group) = group {
                        selector = selector.in_group(group.clone());
                    }
                    let _ = coordinator.off(selector);
                }
            });

            let id = self.listen_one(
                emitter,
                event,
                silent.clone(),
                event_opts,
                true,
                vec![slot.complete_hook(), cleanup],
            );
            let group = opts.group.clone().or_else(|| Some(Key::from(event)));
            ids.push((group, id));
        }

        let first = ids
            .first()
            .map(|(_, id)| *id)
            .unwrap_or_else(|| self.alloc_id());
        let _ = siblings.set(ids);
        Bridged::new(first, rx)
    }
}
