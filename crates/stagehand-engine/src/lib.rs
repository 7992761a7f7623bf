//! Owner-scoped coordination of deferred work over tokio.
//!
//! The [`Coordinator`] wraps timers, frame and idle callbacks, workers,
//! requests, proxied callbacks, and event listeners behind one registry
//! with labeled deduplication, grouping, join policies, and bulk
//! cancellation. Single-shot primitives also come in future form through
//! the promise bridge ([`Bridged`]).

mod bridge;
mod config;
mod coordinator;
mod drag;
mod error;
mod frame;
mod listener;
mod options;
mod proxy;
mod request;
mod timers;
mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::Bridged;
pub use config::{CoordinatorConfig, DEFAULT_FRAME_PERIOD};
pub use coordinator::{Coordinator, WeakCoordinator};
pub use drag::{DragHandler, DragOptions};
pub use error::BridgeError;
pub use listener::{DetachOutcome, Emitter, EmitterHandler, HandlerToken, ListenerHandler};
pub use options::{ListenerOptions, SharedClearHook, TaskContext, TaskOptions};
pub use proxy::{ProxyFn, ProxyOptions};
pub use request::{Fetch, RequestFuture};
pub use worker::{TerminateOutcome, Worker};

pub use stagehand_registry::{FORWARD_CAP, GroupSelector, RegistrySnapshot, Selector};
pub use stagehand_types::{
    ClearContext, ClearOrigin, CoordinatorError, JoinPolicy, Key, TaskError, TaskErrorKind,
    TaskId, TaskKind, TaskResult,
};
