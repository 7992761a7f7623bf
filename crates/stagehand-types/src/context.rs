use serde::{Deserialize, Serialize};

use crate::key::Key;
use crate::kind::TaskKind;
use crate::task_id::TaskId;

/// Which path removed a link from the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearOrigin {
    /// A targeted clear call (by id, label, or group).
    Clear,
    /// A whole-kind sweep.
    ClearKind,
    /// The cross-kind teardown sweep.
    ClearAll,
    /// Cascade clear of a displaced label holder.
    Replacement,
}

/// Describes which link was cleared, why, and what (if anything) replaced it.
///
/// Delivered to every clear hook, to the kind's destructor, and as the
/// rejection carried by bridged futures. Never thrown: cancellation is a
/// value, not an error raised by the coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearContext {
    pub id: TaskId,
    pub kind: TaskKind,
    pub label: Option<Key>,
    pub group: Option<Key>,
    /// Display name of the cleared task, for diagnostics.
    pub name: Option<String>,
    pub origin: ClearOrigin,
    /// Caller-supplied reason, passed through verbatim.
    pub reason: Option<String>,
    /// The successor's id when this clear displaced a label holder.
    pub replaced_by: Option<TaskId>,
    /// Length of the replacement chain behind this link, successor included.
    /// Zero outside replacement cascades.
    pub forward_depth: usize,
}

impl ClearContext {
    /// Shorthand used in log lines: `"Timeout t3 (label=save)"`.
    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) => format!("{} {} (label={label})", self.kind, self.id),
            None => format!("{} {}", self.kind, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn describe_includes_label_when_present() {
        let ctx = ClearContext {
            id: TaskId::new(3),
            kind: TaskKind::Timeout,
            label: Some(Key::from("save")),
            group: None,
            name: None,
            origin: ClearOrigin::Clear,
            reason: None,
            replaced_by: None,
            forward_depth: 0,
        };
        assert_eq!(ctx.describe(), "Timeout t3 (label=save)");

        let unlabeled = ClearContext { label: None, ..ctx };
        assert_eq!(unlabeled.describe(), "Timeout t3");
    }
}
