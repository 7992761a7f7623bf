use serde::{Deserialize, Serialize};

/// How a late arrival at an occupied label is reconciled with the incumbent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinPolicy {
    /// The incoming task wins; the prior label holder is cleared. Its clear
    /// context names the successor, but nothing is forwarded.
    #[default]
    Preempt,
    /// The incumbent wins. The late caller adopts the incumbent's id, its
    /// payload is dropped, and its completion waiters attach to the
    /// incumbent.
    Share,
    /// The incoming task supersedes the incumbent, and the incumbent's
    /// waiters and clear hooks are forwarded onto the successor.
    Replace,
}
