use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use stagehand_registry::{CompleteHook, Destructor};
use stagehand_types::{CoordinatorError, Key, TaskId, TaskKind};

use crate::coordinator::Coordinator;
use crate::options::{ListenerOptions, TaskContext};

/// Handler shape emitters dispatch to: each fire carries an optional event
/// value.
pub type EmitterHandler<V> = Arc<dyn Fn(Option<V>) + Send + Sync>;

/// User-facing listener handler: owner context plus the event value.
pub type ListenerHandler<V> = Arc<dyn Fn(&TaskContext, Option<&V>) + Send + Sync>;

/// Token an emitter mints per attached handler; the coordinator hands it
/// back to detach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerToken(pub u64);

/// What an emitter's detach attempt reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetachOutcome {
    Detached,
    /// The handler was already gone (native once, or detached earlier).
    NotFound,
    /// The emitter offers no way to remove handlers. Clearing such a
    /// listener surfaces `MissingDestructor`; the entry is removed anyway.
    Unsupported,
}

/// The event-source shape listener registrations require: a way to attach
/// a handler, a way to detach it, and optionally native single-shot
/// support.
pub trait Emitter<V>: Send + Sync {
    fn attach(&self, event: &str, handler: EmitterHandler<V>) -> HandlerToken;

    /// Native one-shot attach. Emitters without it return `None` and the
    /// coordinator wraps the handler to detach itself on first fire.
    fn attach_once(&self, event: &str, handler: EmitterHandler<V>) -> Option<HandlerToken> {
        let _ = (event, handler);
        None
    }

    fn detach(&self, event: &str, token: HandlerToken) -> DetachOutcome;
}

impl<V: Clone + Send + 'static> Coordinator<V> {
    /// Subscribe a handler to one or more space-separated events.
    ///
    /// Each event produces an independent registration, grouped under the
    /// event name unless the options force a group. Returns one id per
    /// event, in input order.
    pub fn on<E, F>(
        &self,
        emitter: &Arc<E>,
        events: &str,
        handler: F,
        opts: ListenerOptions,
    ) -> Vec<TaskId>
    where
        E: Emitter<V> + 'static,
        F: Fn(&TaskContext, Option<&V>) + Send + Sync + 'static,
    {
        let handler: ListenerHandler<V> = Arc::new(handler);
        events
            .split_whitespace()
            .map(|event| {
                self.listen_one(
                    emitter,
                    event,
                    handler.clone(),
                    opts.base.clone(),
                    opts.single,
                    Vec::new(),
                )
            })
            .collect()
    }

    /// Subscribe for a single fire per event: `on` with `single` forced.
    pub fn once<E, F>(
        &self,
        emitter: &Arc<E>,
        events: &str,
        handler: F,
        opts: ListenerOptions,
    ) -> Vec<TaskId>
    where
        E: Emitter<V> + 'static,
        F: Fn(&TaskContext, Option<&V>) + Send + Sync + 'static,
    {
        self.on(emitter, events, handler, opts.single(true))
    }

    pub(crate) fn listen_one<E>(
        &self,
        emitter: &Arc<E>,
        event: &str,
        handler: ListenerHandler<V>,
        opts: crate::options::TaskOptions,
        single: bool,
        mut waiters: Vec<CompleteHook<V>>,
    ) -> TaskId
    where
        E: Emitter<V> + 'static,
    {
        let mut opts = opts;
        if opts.group.is_none() {
            opts.group = Some(Key::from(event));
        }
        if let Some(incumbent) = self.try_share(TaskKind::Listener, &mut opts, &mut waiters) {
            return incumbent;
        }

        let id = self.alloc_id();
        let ctx = self.task_context(id, &opts);
        let group = opts.group.clone();
        // Install before attaching so a fire arriving mid-registration
        // finds its link.
        self.install_new(id, TaskKind::Listener, !single, opts, waiters, None);

        let token_cell: Arc<OnceLock<HandlerToken>> = Arc::new(OnceLock::new());
        let weak = self.weak_inner();
        let event_owned = event.to_owned();

        let wrapped: EmitterHandler<V>;
        let wrapped_detaches = Arc::new(AtomicBool::new(false));
        if single {
            let emitter_weak = Arc::downgrade(emitter);
            let token_cell_fire = token_cell.clone();
            let detaches = wrapped_detaches.clone();
            let fire_ctx = ctx.clone();
            let fire_event = event_owned.clone();
            wrapped = Arc::new(move |value: Option<V>| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let link =
                    inner
                        .registry()
                        .take(TaskKind::Listener, fire_ctx.group.as_ref(), fire_ctx.id);
                // Already cleared: the handler is inert.
                let Some(link) = link else {
                    return;
                };
                handler(&fire_ctx, value.as_ref());
                if detaches.load(Ordering::SeqCst) {
                    if let (Some(emitter), Some(token)) =
                        (emitter_weak.upgrade(), token_cell_fire.get())
                    {
                        emitter.detach(&fire_event, *token);
                    }
                }
                link.fire_complete(&Ok(value));
            });
        } else {
            let fire_ctx = ctx.clone();
            wrapped = Arc::new(move |value: Option<V>| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.registry().is_live(
                    TaskKind::Listener,
                    fire_ctx.group.as_ref(),
                    fire_ctx.id,
                ) {
                    return;
                }
                drop(inner);
                handler(&fire_ctx, value.as_ref());
            });
        }

        let token = if single {
            match emitter.attach_once(event, wrapped.clone()) {
                Some(token) => token,
                None => {
                    wrapped_detaches.store(true, Ordering::SeqCst);
                    emitter.attach(event, wrapped)
                }
            }
        } else {
            emitter.attach(event, wrapped)
        };
        let _ = token_cell.set(token);

        let detach_emitter = Arc::clone(emitter);
        let destructor: Destructor = Box::new(move |_, ctx| {
            let Some(token) = token_cell.get() else {
                return Ok(());
            };
            match detach_emitter.detach(&event_owned, *token) {
                DetachOutcome::Unsupported => Err(CoordinatorError::MissingDestructor {
                    kind: TaskKind::Listener,
                    name: ctx.name.clone().unwrap_or_else(|| event_owned.clone()),
                }),
                _ => Ok(()),
            }
        });
        self.arm_destructor(TaskKind::Listener, group.as_ref(), id, &ctx, destructor);
        id
    }
}
