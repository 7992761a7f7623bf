use std::sync::Arc;

use stagehand_types::{ClearContext, JoinPolicy, Key, TaskId};

/// Shared clear hook shape for the options surface.
///
/// Options hooks are `Fn` behind an `Arc` (unlike the registry's one-shot
/// boxed hooks) so one options value can fan out across several links —
/// `on` with a space-separated event list attaches the same hooks to every
/// event's link.
pub type SharedClearHook = Arc<dyn Fn(&ClearContext) + Send + Sync>;

/// Registration options recognized by every primitive wrapper.
#[derive(Clone, Default)]
pub struct TaskOptions {
    pub(crate) join: JoinPolicy,
    pub(crate) label: Option<Key>,
    pub(crate) group: Option<Key>,
    pub(crate) name: Option<String>,
    pub(crate) on_clear: Vec<SharedClearHook>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uniqueness key within `(kind, group)`: at most one live task per
    /// label.
    pub fn label(mut self, label: impl Into<Key>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sub-scope within the kind; the unit of bulk cancellation.
    pub fn group(mut self, group: impl Into<Key>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn join(mut self, join: JoinPolicy) -> Self {
        self.join = join;
        self
    }

    /// Display name used in diagnostics and missing-destructor messages.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a cancel hook, invoked at most once if the task is cleared
    /// before natural completion.
    pub fn on_clear(mut self, hook: impl Fn(&ClearContext) + Send + Sync + 'static) -> Self {
        self.on_clear.push(Arc::new(hook));
        self
    }
}

/// Options for listener registrations.
#[derive(Clone, Default)]
pub struct ListenerOptions {
    pub(crate) base: TaskOptions,
    /// Single-shot: the handler destructs its own link on first fire.
    pub(crate) single: bool,
}

impl ListenerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<Key>) -> Self {
        self.base = self.base.label(label);
        self
    }

    pub fn group(mut self, group: impl Into<Key>) -> Self {
        self.base = self.base.group(group);
        self
    }

    pub fn join(mut self, join: JoinPolicy) -> Self {
        self.base = self.base.join(join);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.base = self.base.name(name);
        self
    }

    pub fn on_clear(mut self, hook: impl Fn(&ClearContext) + Send + Sync + 'static) -> Self {
        self.base = self.base.on_clear(hook);
        self
    }

    pub fn single(mut self, single: bool) -> Self {
        self.single = single;
        self
    }
}

impl From<TaskOptions> for ListenerOptions {
    fn from(base: TaskOptions) -> Self {
        Self {
            base,
            single: false,
        }
    }
}

/// Owner context passed explicitly to every payload invocation.
///
/// The coordinator is owner-scoped; callbacks receive who they run for and
/// which registration they belong to instead of relying on an implicit
/// receiver.
#[derive(Clone, Debug)]
pub struct TaskContext {
    pub owner: Arc<str>,
    pub id: TaskId,
    pub label: Option<Key>,
    pub group: Option<Key>,
}
