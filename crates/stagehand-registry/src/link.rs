use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, Utc};
use stagehand_types::{
    ClearContext, ClearOrigin, CoordinatorError, JoinPolicy, Key, TaskId, TaskKind, TaskResult,
};

/// Completion continuation. Invoked once, by reference to the shared
/// outcome, when the wrapped payload finishes naturally.
pub type CompleteHook<V> = Box<dyn FnOnce(&TaskResult<V>) + Send>;

/// Cancel hook. Invoked at most once, with the context describing the clear.
pub type ClearHook = Box<dyn FnOnce(&ClearContext) + Send>;

/// Destroys the underlying primitive (aborts the task, detaches the
/// handler, terminates the worker). `Err` means the primitive offered no
/// destructor; the registry entry is gone either way.
pub type Destructor =
    Box<dyn FnOnce(TaskId, &ClearContext) -> Result<(), CoordinatorError> + Send>;

/// The in-registry record for one live task.
///
/// Group membership is implicit: a link belongs to whichever `LocalCache`
/// holds it. Hook vectors are ordered; they fire in registration order.
pub struct Link<V> {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Display name for diagnostics and `MissingDestructor` messages.
    pub name: Option<String>,
    pub label: Option<Key>,
    pub join: JoinPolicy,
    /// Interval-like tasks never self-remove on callback fire.
    pub interval: bool,
    pub registered_at: DateTime<Utc>,
    on_complete: Vec<CompleteHook<V>>,
    on_clear: Vec<ClearHook>,
    destructor: Option<Destructor>,
    /// Length of the replacement chain this link has absorbed. Bounds
    /// forwarding: see [`crate::store::FORWARD_CAP`].
    hops: usize,
}

impl<V> Link<V> {
    pub fn new(id: TaskId, kind: TaskKind) -> Self {
        Self {
            id,
            kind,
            name: None,
            label: None,
            join: JoinPolicy::default(),
            interval: false,
            registered_at: Utc::now(),
            on_complete: Vec::new(),
            on_clear: Vec::new(),
            destructor: None,
            hops: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_label(mut self, label: Key) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_join(mut self, join: JoinPolicy) -> Self {
        self.join = join;
        self
    }

    pub fn with_interval(mut self, interval: bool) -> Self {
        self.interval = interval;
        self
    }

    pub fn push_complete(&mut self, hook: CompleteHook<V>) {
        self.on_complete.push(hook);
    }

    pub fn push_clear(&mut self, hook: ClearHook) {
        self.on_clear.push(hook);
    }

    pub fn set_destructor(&mut self, destructor: Destructor) {
        self.destructor = Some(destructor);
    }

    /// Detach the destructor so it can run after hook forwarding consumed
    /// the link. The destructor always runs on the clear path, forwarded or
    /// not.
    pub fn take_destructor(&mut self) -> Option<Destructor> {
        self.destructor.take()
    }

    /// Replacement chain length absorbed so far.
    pub fn hops(&self) -> usize {
        self.hops
    }

    /// Move another link's hooks onto this one, in their original order.
    ///
    /// This is the forwarding primitive: the absorbed link's waiters resolve
    /// with this link's completion, and its cancel hooks fire if this link
    /// is cleared in turn. `depth` is the chain length behind the absorbed
    /// link, successor (this link) included.
    pub fn absorb_hooks(&mut self, from: &mut Link<V>, depth: usize) {
        self.on_complete.append(&mut from.on_complete);
        self.on_clear.append(&mut from.on_clear);
        self.hops = self.hops.max(depth);
    }

    /// Adopt hook vectors from a `Share` join or a bridge attach.
    pub fn adopt(&mut self, complete: Vec<CompleteHook<V>>, clear: Vec<ClearHook>) {
        self.on_complete.extend(complete);
        self.on_clear.extend(clear);
    }

    /// Fire completion continuations in registration order, consuming the
    /// link. The destructor is dropped unrun: natural completion and
    /// destruction are mutually exclusive exits.
    pub fn fire_complete(mut self, outcome: &TaskResult<V>) {
        for hook in self.on_complete.drain(..) {
            hook(outcome);
        }
    }

    /// Detach the hook vectors and destructor for a clear, consuming the
    /// link. Completion hooks are dropped: they only run on natural
    /// completion.
    pub fn into_clear_parts(self) -> (Vec<ClearHook>, Option<Destructor>) {
        (self.on_clear, self.destructor)
    }

    /// Build the context delivered to this link's clear hooks and destructor.
    pub fn clear_context(
        &self,
        group: Option<&Key>,
        origin: ClearOrigin,
        reason: Option<String>,
        replaced_by: Option<TaskId>,
    ) -> ClearContext {
        ClearContext {
            id: self.id,
            kind: self.kind,
            label: self.label.clone(),
            group: group.cloned(),
            name: self.name.clone(),
            origin,
            reason,
            replaced_by,
            forward_depth: if replaced_by.is_some() {
                self.hops + 1
            } else {
                0
            },
        }
    }
}

/// Run clear hooks in registration order, containing panics.
///
/// A panic in one hook must not prevent later hooks or the destructor from
/// running. Panic payloads are reported through `tracing::error` after the
/// sweep; nothing is rethrown, so the clear path stays infallible.
pub fn fire_clear_hooks(hooks: Vec<ClearHook>, ctx: &ClearContext) {
    let mut panics = Vec::new();
    for hook in hooks {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(ctx))) {
            panics.push(payload);
        }
    }
    for payload in panics {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        tracing::error!(task = %ctx.describe(), %message, "clear hook panicked");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use stagehand_types::ClearOrigin;

    use super::*;

    fn link(tag: u64) -> Link<u32> {
        Link::new(TaskId::new(tag), TaskKind::Timeout)
    }

    #[test]
    fn fire_complete_runs_hooks_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut l = link(1);
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            l.push_complete(Box::new(move |_| order.lock().unwrap().push(tag)));
        }

        l.fire_complete(&Ok(Some(7)));

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn absorb_hooks_moves_both_vectors_and_raises_hops() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut from = link(1);
        let fired_c = fired.clone();
        from.push_complete(Box::new(move |_| {
            fired_c.fetch_add(1, Ordering::SeqCst);
        }));
        let fired_c = fired.clone();
        from.push_clear(Box::new(move |_| {
            fired_c.fetch_add(10, Ordering::SeqCst);
        }));

        let mut succ = link(2);
        succ.absorb_hooks(&mut from, 3);
        assert_eq!(succ.hops(), 3);

        // The absorbed waiter resolves with the successor's completion.
        succ.fire_complete(&Ok(None));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn absorb_hooks_never_lowers_hops() {
        let mut succ = link(2);
        succ.absorb_hooks(&mut link(1), 5);
        succ.absorb_hooks(&mut link(3), 2);
        assert_eq!(succ.hops(), 5);
    }

    #[test]
    fn clear_context_counts_forward_depth_only_on_replacement() {
        let mut l = link(4);
        l.absorb_hooks(&mut link(1), 2);

        let plain = l.clear_context(None, ClearOrigin::Clear, None, None);
        assert_eq!(plain.forward_depth, 0);

        let replaced = l.clear_context(
            None,
            ClearOrigin::Replacement,
            None,
            Some(TaskId::new(9)),
        );
        assert_eq!(replaced.forward_depth, 3);
        assert_eq!(replaced.replaced_by, Some(TaskId::new(9)));
    }

    #[test_log::test]
    fn panicking_clear_hook_does_not_stop_later_hooks() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut l = link(5);
        l.push_clear(Box::new(|_| panic!("first hook exploded")));
        let fired_c = fired.clone();
        l.push_clear(Box::new(move |_| {
            fired_c.fetch_add(1, Ordering::SeqCst);
        }));

        let ctx = l.clear_context(None, ClearOrigin::Clear, None, None);
        let (hooks, _) = l.into_clear_parts();
        fire_clear_hooks(hooks, &ctx);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
