//! Shared doubles for the adapter tests: a counting emitter and a worker
//! handle with switchable capabilities.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::listener::{DetachOutcome, Emitter, EmitterHandler, HandlerToken};
use crate::worker::{TerminateOutcome, Worker};

struct Registered {
    token: HandlerToken,
    handler: EmitterHandler<u32>,
    once: bool,
}

/// Emitter double that counts attach/detach traffic and dispatches
/// synchronously. `native_once` switches native one-shot support on;
/// `undetachable` builds one whose detach always reports `Unsupported`.
pub struct CountingEmitter {
    native_once: bool,
    detachable: bool,
    next_token: AtomicU64,
    handlers: StdMutex<HashMap<String, Vec<Registered>>>,
    attaches: AtomicUsize,
    native_once_attaches: AtomicUsize,
    detaches: AtomicUsize,
}

impl CountingEmitter {
    pub fn new(native_once: bool) -> Self {
        Self {
            native_once,
            detachable: true,
            next_token: AtomicU64::new(1),
            handlers: StdMutex::new(HashMap::new()),
            attaches: AtomicUsize::new(0),
            native_once_attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
        }
    }

    pub fn undetachable() -> Self {
        Self {
            detachable: false,
            ..Self::new(false)
        }
    }

    /// Dispatch an event. The handler list is snapshotted first, so
    /// handlers may re-enter attach/detach mid-dispatch.
    pub fn emit(&self, event: &str, value: Option<u32>) {
        let batch: Vec<EmitterHandler<u32>> = {
            let mut handlers = self.handlers.lock().unwrap();
            let Some(registered) = handlers.get_mut(event) else {
                return;
            };
            let batch = registered
                .iter()
                .map(|r| r.handler.clone())
                .collect();
            registered.retain(|r| !r.once);
            batch
        };
        for handler in batch {
            handler(value);
        }
    }

    pub fn attached(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn native_once_attaches(&self) -> usize {
        self.native_once_attaches.load(Ordering::SeqCst)
    }

    pub fn detached(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn live_handlers(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .unwrap()
            .get(event)
            .map_or(0, Vec::len)
    }

    fn insert(&self, event: &str, handler: EmitterHandler<u32>, once: bool) -> HandlerToken {
        let token = HandlerToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.handlers
            .lock()
            .unwrap()
            .entry(event.to_owned())
            .or_default()
            .push(Registered {
                token,
                handler,
                once,
            });
        token
    }
}

impl Emitter<u32> for CountingEmitter {
    fn attach(&self, event: &str, handler: EmitterHandler<u32>) -> HandlerToken {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        self.insert(event, handler, false)
    }

    fn attach_once(&self, event: &str, handler: EmitterHandler<u32>) -> Option<HandlerToken> {
        if !self.native_once {
            return None;
        }
        self.attaches.fetch_add(1, Ordering::SeqCst);
        self.native_once_attaches.fetch_add(1, Ordering::SeqCst);
        Some(self.insert(event, handler, true))
    }

    fn detach(&self, event: &str, token: HandlerToken) -> DetachOutcome {
        if !self.detachable {
            return DetachOutcome::Unsupported;
        }
        self.detaches.fetch_add(1, Ordering::SeqCst);
        let mut handlers = self.handlers.lock().unwrap();
        let Some(registered) = handlers.get_mut(event) else {
            return DetachOutcome::NotFound;
        };
        let before = registered.len();
        registered.retain(|r| r.token != token);
        if registered.len() < before {
            DetachOutcome::Detached
        } else {
            DetachOutcome::NotFound
        }
    }
}

/// Worker double counting terminations; `unsupported` builds one with no
/// way to stop it.
pub struct NamedWorker {
    supported: bool,
    terminations: AtomicUsize,
}

impl NamedWorker {
    pub fn new() -> Self {
        Self {
            supported: true,
            terminations: AtomicUsize::new(0),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            terminations: AtomicUsize::new(0),
        }
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl Worker for NamedWorker {
    fn terminate(&self) -> TerminateOutcome {
        if !self.supported {
            return TerminateOutcome::Unsupported;
        }
        self.terminations.fetch_add(1, Ordering::SeqCst);
        TerminateOutcome::Terminated
    }
}
