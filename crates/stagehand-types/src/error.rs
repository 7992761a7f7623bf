use crate::kind::TaskKind;

/// Failures the coordinator itself can raise.
///
/// Cancellation is never one of them; it travels as a
/// [`ClearContext`](crate::context::ClearContext) value. Replacement-chain
/// overflow is not one either: it only ever reaches callers as the
/// rejection of a bridged future.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// A worker or emitter offered no way to destroy its primitive. The
    /// registry entry is removed regardless: leaking is worse than shouting.
    #[error("missing destructor for {kind} task '{name}'")]
    MissingDestructor { kind: TaskKind, name: String },
}
