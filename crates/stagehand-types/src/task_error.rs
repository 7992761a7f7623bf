use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical category for a task payload failure.
///
/// Coarse-grained on purpose: it feeds policy decisions in callers and
/// observability dimensions in logs, not exhaustive diagnosis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskErrorKind {
    /// The user payload reported a failure.
    Payload,
    /// A wrapped request failed in transit.
    Transport,
    /// The primitive exceeded a configured time limit.
    Timeout,
    /// Catch-all bucket when no specific category applies.
    Uncategorized,
}

/// Structured payload-failure record carried in completion outcomes.
///
/// The coordinator never raises these; they travel through `on_complete`
/// hooks and bridge rejections exactly like successful values do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Coarse failure category used by policy and observability.
    pub kind: TaskErrorKind,
    /// Human-readable summary safe to display in normal logs.
    pub message: String,
    /// Optional diagnostic detail for deep triage. Omit when no extra
    /// detail exists.
    pub detail: Option<String>,
}

impl TaskError {
    /// Creates a [`TaskError`] with required fields only.
    ///
    /// Use [`Self::with_detail`] to attach optional diagnostic context.
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// Adds or replaces the optional diagnostic detail.
    ///
    /// If called multiple times, the last value wins.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(ref detail) = self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Outcome of a natural completion.
///
/// Timer-like fires complete with `Ok(None)`; value-bearing primitives
/// (requests, listeners, proxied calls) with `Ok(Some(v))`; failed payloads
/// with `Err`.
pub type TaskResult<V> = Result<Option<V>, TaskError>;
