use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one live task within a coordinator.
///
/// Ids are allocated from a per-coordinator monotonic counter, so ordering
/// by id equals ordering by registration. Bulk iteration relies on this:
/// a `BTreeMap<TaskId, Link>` walks links in creation order with no
/// auxiliary index.
///
/// Display: `"t42"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
