use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use stagehand_registry::{
    ClearHook, CompleteHook, Destructor, FORWARD_CAP, Link, Registry, RegistrySnapshot, Selector,
    fire_clear_hooks,
};
use stagehand_types::{
    ClearContext, ClearOrigin, CoordinatorError, JoinPolicy, Key, TaskId, TaskKind, TaskResult,
};
use tokio::sync::oneshot;

use crate::config::CoordinatorConfig;
use crate::frame::FrameClock;
use crate::options::{TaskContext, TaskOptions};

/// Owner-scoped coordinator for deferred work.
///
/// One coordinator per host object; coordinators share nothing with each
/// other. All registry state sits behind one mutex with short critical
/// sections — the lock is never held across `.await` or while user
/// payloads, hooks, or destructors run, which is what makes re-entrant
/// registration from inside a callback safe.
///
/// Must be created and used inside a tokio runtime: the wrapped primitives
/// are spawned tasks.
pub struct Coordinator<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Coordinator<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Weak handle for callbacks that live inside emitters or spawned tasks.
///
/// Holding the coordinator strongly from a handler the coordinator itself
/// retains (through a link's destructor) would cycle; composite recipes
/// downgrade instead.
pub struct WeakCoordinator<V> {
    inner: Weak<Inner<V>>,
}

impl<V> Clone for WeakCoordinator<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<V: Clone + Send + 'static> WeakCoordinator<V> {
    pub fn upgrade(&self) -> Option<Coordinator<V>> {
        self.inner.upgrade().map(|inner| Coordinator { inner })
    }
}

pub(crate) struct Inner<V> {
    owner: Arc<str>,
    ids: AtomicU64,
    registry: Mutex<Registry<V>>,
    frame: OnceLock<FrameClock>,
    frame_period: Duration,
}

impl<V: Clone + Send + 'static> Inner<V> {
    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry<V>> {
        self.registry.lock().expect("registry lock poisoned")
    }

    pub(crate) fn frame_clock(&self) -> &FrameClock {
        self.frame
            .get_or_init(|| FrameClock::start(self.frame_period))
    }

    /// Natural-completion path shared by every single-shot wrapper.
    ///
    /// The link leaves the registry *before* the payload runs, so a
    /// same-label re-registration from inside the callback sees an empty
    /// slot. A link already gone means the task was cleared: return with
    /// no side effect.
    pub(crate) fn complete_single(
        weak: &Weak<Inner<V>>,
        kind: TaskKind,
        ctx: &TaskContext,
        payload: impl FnOnce(&TaskContext) -> TaskResult<V>,
    ) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let link = inner.registry().take(kind, ctx.group.as_ref(), ctx.id);
        let Some(link) = link else {
            return;
        };
        let outcome = payload(ctx);
        tracing::trace!(owner = %inner.owner, %kind, id = %ctx.id, "task completed");
        link.fire_complete(&outcome);
    }

    /// Process one removed link: forward or fire its hooks, then run its
    /// destructor. Runs with no registry borrow outstanding.
    ///
    /// Forwarding applies when the link was displaced under a `Replace`
    /// join and the chain is still under the cap: its waiters and clear
    /// hooks move onto the successor and nothing fires now. At the cap
    /// the hooks fire instead, carrying the over-limit depth, and bridges
    /// reject rather than chase the chain. The destructor runs in every
    /// case — forwarding hands off waiters, not the primitive.
    pub(crate) fn finish_removed(
        &self,
        group: Option<&Key>,
        link: Link<V>,
        origin: ClearOrigin,
        reason: Option<String>,
        replaced_by: Option<TaskId>,
    ) -> Result<(), CoordinatorError> {
        let mut link = link;
        let ctx = link.clear_context(group, origin, reason, replaced_by);
        let kind = link.kind;
        let join = link.join;
        let destructor = link.take_destructor();

        let mut pending = Some(link);
        if let Some(successor) = replaced_by {
            if join == JoinPolicy::Replace && ctx.forward_depth < FORWARD_CAP {
                let absorbed = self.registry().absorb(
                    kind,
                    group,
                    successor,
                    pending.take().expect("link taken once"),
                    ctx.forward_depth,
                );
                match absorbed {
                    Ok(()) => {
                        tracing::trace!(
                            owner = %self.owner,
                            %kind,
                            id = %ctx.id,
                            %successor,
                            depth = ctx.forward_depth,
                            "forwarded waiters to successor"
                        );
                    }
                    Err(returned) => pending = Some(returned),
                }
            }
        }

        if let Some(link) = pending {
            let (hooks, _) = link.into_clear_parts();
            fire_clear_hooks(hooks, &ctx);
        }

        let result = match destructor {
            Some(destroy) => destroy(ctx.id, &ctx),
            None => Ok(()),
        };
        if let Err(error) = &result {
            tracing::warn!(owner = %self.owner, %error, task = %ctx.describe(), "destructor failed");
        }
        tracing::debug!(owner = %self.owner, task = %ctx.describe(), ?origin, "task cleared");
        result
    }
}

impl<V: Clone + Send + 'static> Coordinator<V> {
    /// Coordinator with default configuration and the given owner tag.
    pub fn new(owner: impl Into<String>) -> Self {
        CoordinatorConfig::default().owner(owner).build()
    }

    pub(crate) fn from_config(owner: String, frame_period: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                owner: owner.into(),
                ids: AtomicU64::new(1),
                registry: Mutex::new(Registry::new()),
                frame: OnceLock::new(),
                frame_period,
            }),
        }
    }

    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn downgrade(&self) -> WeakCoordinator<V> {
        WeakCoordinator {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Serializable summary of every live scope.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.inner.registry().snapshot()
    }

    pub(crate) fn inner(&self) -> &Arc<Inner<V>> {
        &self.inner
    }

    pub(crate) fn weak_inner(&self) -> Weak<Inner<V>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn alloc_id(&self) -> TaskId {
        TaskId::new(self.inner.ids.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn task_context(&self, id: TaskId, opts: &TaskOptions) -> TaskContext {
        TaskContext {
            owner: Arc::clone(&self.inner.owner),
            id,
            label: opts.label.clone(),
            group: opts.group.clone(),
        }
    }

    /// `Share` reconciliation: a live incumbent under the label wins, the
    /// caller's payload is dropped, and its hooks attach to the incumbent.
    pub(crate) fn try_share(
        &self,
        kind: TaskKind,
        opts: &mut TaskOptions,
        extra_complete: &mut Vec<CompleteHook<V>>,
    ) -> Option<TaskId> {
        if opts.join != JoinPolicy::Share {
            return None;
        }
        let label = opts.label.clone()?;
        let group = opts.group.clone();
        let mut registry = self.inner.registry();
        let incumbent = registry.live_for_label(kind, group.as_ref(), &label)?;
        let clear_hooks: Vec<ClearHook> = opts
            .on_clear
            .drain(..)
            .map(|hook| Box::new(move |ctx: &ClearContext| hook(ctx)) as ClearHook)
            .collect();
        registry.adopt_hooks(
            kind,
            group.as_ref(),
            incumbent,
            std::mem::take(extra_complete),
            clear_hooks,
        );
        tracing::debug!(owner = %self.inner.owner, %kind, %incumbent, "joined incumbent task");
        Some(incumbent)
    }

    /// Install a fresh link and cascade-clear any displaced label holder.
    ///
    /// The cascade runs after the install, with the new link already
    /// holding the label, so hooks observing the registry see the
    /// successor in place.
    pub(crate) fn install_new(
        &self,
        id: TaskId,
        kind: TaskKind,
        interval: bool,
        opts: TaskOptions,
        extra_complete: Vec<CompleteHook<V>>,
        destructor: Option<Destructor>,
    ) -> TaskId {
        let TaskOptions {
            join,
            label,
            group,
            name,
            on_clear,
        } = opts;
        let mut link = Link::new(id, kind).with_join(join).with_interval(interval);
        if let Some(name) = name {
            link = link.with_name(name);
        }
        if let Some(label) = label {
            link = link.with_label(label);
        }
        for hook in extra_complete {
            link.push_complete(hook);
        }
        for hook in on_clear {
            link.push_clear(Box::new(move |ctx: &ClearContext| hook(ctx)));
        }
        if let Some(destructor) = destructor {
            link.set_destructor(destructor);
        }

        let displaced = self.inner.registry().install(group.as_ref(), link);
        tracing::debug!(owner = %self.inner.owner, %kind, %id, "task registered");
        if let Some(displaced) = displaced {
            let _ = self.inner.finish_removed(
                group.as_ref(),
                displaced,
                ClearOrigin::Replacement,
                None,
                Some(id),
            );
        }
        id
    }

    /// Attach the destructor once the primitive is running. If a clear
    /// raced the start and the link is already gone, the destructor runs
    /// here — the clear found nothing to destroy, and exactly-once
    /// destruction is on us.
    pub(crate) fn arm_destructor(
        &self,
        kind: TaskKind,
        group: Option<&Key>,
        id: TaskId,
        ctx: &TaskContext,
        destructor: Destructor,
    ) {
        let orphaned = self
            .inner
            .registry()
            .set_destructor(kind, group, id, destructor);
        if let Err(destroy) = orphaned {
            let ctx = ClearContext {
                id,
                kind,
                label: ctx.label.clone(),
                group: group.cloned(),
                name: None,
                origin: ClearOrigin::Clear,
                reason: None,
                replaced_by: None,
                forward_depth: 0,
            };
            let _ = destroy(id, &ctx);
        }
    }

    /// Generic registration for primitives backed by a spawned task.
    ///
    /// The task is gated: it does not run until the link is installed with
    /// its destructor, so a fire can never observe a half-registered task
    /// and an abort can never miss the handle.
    pub(crate) fn register_spawned<Fut>(
        &self,
        kind: TaskKind,
        interval: bool,
        mut opts: TaskOptions,
        mut extra_complete: Vec<CompleteHook<V>>,
        extra_destroy: Option<Box<dyn FnOnce(&ClearContext) + Send>>,
        make: impl FnOnce(TaskContext) -> Fut,
    ) -> TaskId
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(incumbent) = self.try_share(kind, &mut opts, &mut extra_complete) {
            return incumbent;
        }
        let id = self.alloc_id();
        let ctx = self.task_context(id, &opts);
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let fut = make(ctx);
        let handle = tokio::spawn(async move {
            if armed_rx.await.is_err() {
                return;
            }
            fut.await;
        });
        let destructor: Destructor = Box::new(move |_, ctx| {
            if let Some(destroy) = extra_destroy {
                destroy(ctx);
            }
            handle.abort();
            Ok(())
        });
        let id = self.install_new(id, kind, interval, opts, extra_complete, Some(destructor));
        let _ = armed_tx.send(());
        id
    }

    fn clear_in(
        &self,
        kind: TaskKind,
        selector: Selector,
        origin: ClearOrigin,
    ) -> Result<usize, CoordinatorError> {
        let removed = self.inner.registry().resolve_clear(kind, &selector);
        let count = removed.len();
        let mut first_error = None;
        for (group, link) in removed {
            if let Err(error) = self.inner.finish_removed(
                group.as_ref(),
                link,
                origin,
                selector.reason.clone(),
                None,
            ) {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            None => Ok(count),
            Some(error) => Err(error),
        }
    }

    pub fn clear_immediate(&self, sel: impl Into<Selector>) -> Result<usize, CoordinatorError> {
        self.clear_in(TaskKind::Immediate, sel.into(), ClearOrigin::Clear)
    }

    pub fn clear_timeout(&self, sel: impl Into<Selector>) -> Result<usize, CoordinatorError> {
        self.clear_in(TaskKind::Timeout, sel.into(), ClearOrigin::Clear)
    }

    pub fn clear_interval(&self, sel: impl Into<Selector>) -> Result<usize, CoordinatorError> {
        self.clear_in(TaskKind::Interval, sel.into(), ClearOrigin::Clear)
    }

    pub fn clear_frame(&self, sel: impl Into<Selector>) -> Result<usize, CoordinatorError> {
        self.clear_in(TaskKind::Frame, sel.into(), ClearOrigin::Clear)
    }

    pub fn clear_idle(&self, sel: impl Into<Selector>) -> Result<usize, CoordinatorError> {
        self.clear_in(TaskKind::Idle, sel.into(), ClearOrigin::Clear)
    }

    pub fn clear_worker(&self, sel: impl Into<Selector>) -> Result<usize, CoordinatorError> {
        self.clear_in(TaskKind::Worker, sel.into(), ClearOrigin::Clear)
    }

    pub fn clear_request(&self, sel: impl Into<Selector>) -> Result<usize, CoordinatorError> {
        self.clear_in(TaskKind::Request, sel.into(), ClearOrigin::Clear)
    }

    pub fn clear_proxy(&self, sel: impl Into<Selector>) -> Result<usize, CoordinatorError> {
        self.clear_in(TaskKind::Proxy, sel.into(), ClearOrigin::Clear)
    }

    /// Remove listener registrations: the listener family's clear call.
    ///
    /// A bare id searches every event group under the kind — listener ids
    /// live in per-event groups, and callers rarely hold the group.
    pub fn off(&self, sel: impl Into<Selector>) -> Result<usize, CoordinatorError> {
        let selector = sel.into();
        if let (Some(id), None, None) = (selector.id, &selector.label, &selector.group) {
            let removed = self.inner.registry().take_anywhere(TaskKind::Listener, id);
            return match removed {
                Some((group, link)) => self
                    .inner
                    .finish_removed(
                        group.as_ref(),
                        link,
                        ClearOrigin::Clear,
                        selector.reason,
                        None,
                    )
                    .map(|()| 1),
                None => Ok(0),
            };
        }
        self.clear_in(TaskKind::Listener, selector, ClearOrigin::Clear)
    }

    /// Clear everything under one kind: root scope plus every group.
    pub fn clear_kind(&self, kind: TaskKind) -> Result<usize, CoordinatorError> {
        let removed = self.inner.registry().drain_kind(kind);
        let count = removed.len();
        let mut first_error = None;
        for (group, link) in removed {
            if let Err(error) =
                self.inner
                    .finish_removed(group.as_ref(), link, ClearOrigin::ClearKind, None, None)
            {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            None => Ok(count),
            Some(error) => Err(error),
        }
    }

    /// Tear down every live task, kind by kind in teardown order:
    /// listeners first, then the timer family, then worker/request/proxy.
    pub fn clear_all(&self) -> Result<usize, CoordinatorError> {
        let mut cleared = 0;
        let mut first_error = None;
        for kind in TaskKind::TEARDOWN_ORDER {
            let removed = self.inner.registry().drain_kind(kind);
            cleared += removed.len();
            for (group, link) in removed {
                if let Err(error) = self.inner.finish_removed(
                    group.as_ref(),
                    link,
                    ClearOrigin::ClearAll,
                    None,
                    None,
                ) {
                    first_error.get_or_insert(error);
                }
            }
        }
        match first_error {
            None => Ok(cleared),
            Some(error) => Err(error),
        }
    }

    /// Tear down matching tasks across every kind, in teardown order.
    /// The selector's group may be a regex pattern.
    pub fn clear_all_matching(&self, selector: Selector) -> Result<usize, CoordinatorError> {
        let mut cleared = 0;
        let mut first_error = None;
        for kind in TaskKind::TEARDOWN_ORDER {
            match self.clear_in(kind, selector.clone(), ClearOrigin::ClearAll) {
                Ok(count) => cleared += count,
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }
        match first_error {
            None => Ok(cleared),
            Some(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use crate::test_support::{CountingEmitter, NamedWorker};
    use crate::options::ListenerOptions;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn owner_tag_reaches_payload_contexts() {
        let coordinator: Coordinator<u32> = Coordinator::new("editor");
        let seen: Arc<StdMutex<Option<String>>> = Arc::new(StdMutex::new(None));
        let seen_c = seen.clone();
        coordinator.set_immediate(
            move |ctx| {
                *seen_c.lock().unwrap() = Some(ctx.owner.to_string());
                Ok(None)
            },
            TaskOptions::new(),
        );
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        assert_eq!(seen.lock().unwrap().as_deref(), Some("editor"));
    }

    #[tokio::test(start_paused = true)]
    async fn pattern_group_clear_sweeps_matching_groups_only() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let dur = std::time::Duration::from_secs(60);
        coordinator.set_timeout(dur, |_| Ok(None), TaskOptions::new().group("drag:1"));
        coordinator.set_timeout(dur, |_| Ok(None), TaskOptions::new().group("drag:2"));
        coordinator.set_timeout(dur, |_| Ok(None), TaskOptions::new().group("poll"));

        let pattern = regex::Regex::new("^drag:").unwrap();
        let cleared = coordinator
            .clear_timeout(Selector::group(pattern))
            .unwrap();
        assert_eq!(cleared, 2);
        assert_eq!(coordinator.snapshot().kinds["Timeout"].groups["poll"].live, 1);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn clear_all_runs_listener_teardown_before_timer_teardown() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let order: Arc<StdMutex<Vec<&'static str>>> = Arc::new(StdMutex::new(Vec::new()));
        let emitter = Arc::new(CountingEmitter::new(false));

        let order_c = order.clone();
        coordinator.set_timeout(
            std::time::Duration::from_secs(60),
            |_| Ok(None),
            TaskOptions::new().on_clear(move |_| order_c.lock().unwrap().push("timer")),
        );
        let order_c = order.clone();
        coordinator.on(
            &emitter,
            "ping",
            |_, _| {},
            ListenerOptions::new().on_clear(move |_| order_c.lock().unwrap().push("listener")),
        );

        let cleared = coordinator.clear_all().unwrap();
        assert_eq!(cleared, 2);
        assert_eq!(*order.lock().unwrap(), vec!["listener", "timer"]);
        assert_eq!(emitter.detached(), 1);
    }

    #[tokio::test]
    async fn clear_all_reports_the_first_destructor_failure_but_clears_everything() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        coordinator.worker(
            Arc::new(NamedWorker::unsupported()),
            TaskOptions::new().name("stuck"),
        );
        coordinator.worker(Arc::new(NamedWorker::new()), TaskOptions::new());

        let err = coordinator.clear_all().unwrap_err();
        assert_eq!(
            err,
            CoordinatorError::MissingDestructor {
                kind: TaskKind::Worker,
                name: "stuck".to_owned(),
            }
        );
        assert!(coordinator.snapshot().kinds.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_all_matching_honors_label_and_group_filters() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let dur = std::time::Duration::from_secs(60);
        coordinator.set_timeout(dur, |_| Ok(None), TaskOptions::new().label("keep"));
        coordinator.set_timeout(dur, |_| Ok(None), TaskOptions::new().label("drop"));
        coordinator.set_interval(
            std::time::Duration::from_secs(1),
            |_| {},
            TaskOptions::new().label("drop").group("g"),
        );

        let cleared = coordinator
            .clear_all_matching(Selector::label("drop"))
            .unwrap();
        // Label filters resolve against the root scope; the grouped
        // interval keeps running.
        assert_eq!(cleared, 1);

        let cleared = coordinator
            .clear_all_matching(Selector::label("drop").in_group("g"))
            .unwrap();
        assert_eq!(cleared, 1);

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.kinds["Timeout"].root.labels, vec!["keep"]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_kind_sweeps_root_and_every_group() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let dur = std::time::Duration::from_secs(60);
        coordinator.set_timeout(dur, |_| Ok(None), TaskOptions::new());
        coordinator.set_timeout(dur, |_| Ok(None), TaskOptions::new().group("g1"));
        coordinator.set_timeout(dur, |_| Ok(None), TaskOptions::new().group("g2"));
        coordinator.set_interval(std::time::Duration::from_secs(1), |_| {}, TaskOptions::new());

        assert_eq!(coordinator.clear_kind(TaskKind::Timeout).unwrap(), 3);
        let snapshot = coordinator.snapshot();
        assert!(!snapshot.kinds.contains_key("Timeout"));
        assert_eq!(snapshot.kinds["Interval"].root.live, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn re_entrant_same_label_registration_succeeds_with_a_fresh_id() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let inner_id: Arc<StdMutex<Option<TaskId>>> = Arc::new(StdMutex::new(None));
        let fired = Arc::new(AtomicUsize::new(0));

        let coord = coordinator.clone();
        let inner_id_c = inner_id.clone();
        let fired_c = fired.clone();
        let outer = coordinator.set_timeout(
            std::time::Duration::from_millis(5),
            move |ctx| {
                // The slot is empty by the time the payload runs, so the
                // same label registers cleanly.
                let fired_c = fired_c.clone();
                let id = coord.set_timeout(
                    std::time::Duration::from_millis(5),
                    move |_| {
                        fired_c.fetch_add(1, AtomicOrdering::SeqCst);
                        Ok(None)
                    },
                    TaskOptions::new().label(ctx.label.clone().unwrap()),
                );
                *inner_id_c.lock().unwrap() = Some(id);
                Ok(None)
            },
            TaskOptions::new().label("again"),
        );

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let inner = inner_id.lock().unwrap().unwrap();
        assert_ne!(inner, outer);
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reflects_live_scopes() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        coordinator.set_timeout(
            std::time::Duration::from_secs(60),
            |_| Ok(None),
            TaskOptions::new().label("save"),
        );
        coordinator.set_interval(
            std::time::Duration::from_secs(1),
            |_| {},
            TaskOptions::new().group("poll"),
        );

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.kinds["Timeout"].root.labels, vec!["save"]);
        assert_eq!(snapshot.kinds["Interval"].groups["poll"].live, 1);
    }
}
