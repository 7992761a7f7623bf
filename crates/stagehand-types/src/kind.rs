use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of primitive a task belongs to.
///
/// Every kind shares the same registry shape and lifecycle; the engine
/// supplies per-kind start and destroy behavior. Extensible: a new wrapped
/// primitive is a new variant here plus an adapter, not a new lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    // ── Callback family ──
    /// Next-tick callback.
    Immediate,
    /// One-shot timer.
    Timeout,
    /// Recurring timer. Never self-removes on fire.
    Interval,
    /// One frame-clock tick.
    Frame,
    /// Idle slot with an optional deadline.
    Idle,

    // ── Caller-supplied primitives ──
    /// Long-lived worker handle. Cleared by terminating the worker.
    Worker,
    /// In-flight abortable request.
    Request,
    /// Identity-wrapped callback; clearing makes it inert.
    Proxy,
    /// Event subscription on an emitter. Persistent unless single-shot.
    Listener,
}

impl TaskKind {
    /// Cross-kind teardown order for full clears.
    ///
    /// Listeners go first so their unsubscriptions run before timers they
    /// may depend on, then the timer family, then worker/request/proxy.
    pub const TEARDOWN_ORDER: [TaskKind; 9] = [
        TaskKind::Listener,
        TaskKind::Immediate,
        TaskKind::Timeout,
        TaskKind::Interval,
        TaskKind::Frame,
        TaskKind::Idle,
        TaskKind::Worker,
        TaskKind::Request,
        TaskKind::Proxy,
    ];

    /// Returns the variant name as a static string for error messages and logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Immediate => "Immediate",
            Self::Timeout => "Timeout",
            Self::Interval => "Interval",
            Self::Frame => "Frame",
            Self::Idle => "Idle",
            Self::Worker => "Worker",
            Self::Request => "Request",
            Self::Proxy => "Proxy",
            Self::Listener => "Listener",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
