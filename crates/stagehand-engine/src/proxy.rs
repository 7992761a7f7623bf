use std::sync::Arc;

use stagehand_types::{TaskId, TaskKind, TaskResult};

use crate::coordinator::{Coordinator, WeakCoordinator};
use crate::options::{TaskContext, TaskOptions};

/// Options for proxied callbacks.
#[derive(Clone)]
pub struct ProxyOptions {
    pub(crate) base: TaskOptions,
    /// Single-shot: the first call removes the registration before the
    /// payload runs. Persistent proxies stay callable until cleared.
    pub(crate) single: bool,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            base: TaskOptions::default(),
            single: true,
        }
    }
}

impl ProxyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: impl Into<stagehand_types::Key>) -> Self {
        self.base = self.base.label(label);
        self
    }

    pub fn group(mut self, group: impl Into<stagehand_types::Key>) -> Self {
        self.base = self.base.group(group);
        self
    }

    pub fn single(mut self, single: bool) -> Self {
        self.single = single;
        self
    }
}

impl From<TaskOptions> for ProxyOptions {
    fn from(base: TaskOptions) -> Self {
        Self { base, single: true }
    }
}

/// An identity-wrapped callback bound to a registration.
///
/// Calling it runs the payload while the registration is live; after a
/// clear the wrapper is simply inert — no destructor, no error, `None`.
pub struct ProxyFn<V> {
    coordinator: WeakCoordinator<V>,
    ctx: TaskContext,
    single: bool,
    payload: Arc<dyn Fn(&TaskContext, Option<V>) -> TaskResult<V> + Send + Sync>,
}

impl<V: Clone + Send + 'static> ProxyFn<V> {
    pub fn task_id(&self) -> TaskId {
        self.ctx.id
    }

    /// Invoke the wrapped payload. Returns `None` when the registration is
    /// gone (cleared, or a single-shot that already fired).
    pub fn call(&self, value: Option<V>) -> Option<TaskResult<V>> {
        let coordinator = self.coordinator.upgrade()?;
        let inner = coordinator.inner();
        if self.single {
            let link = inner
                .registry()
                .take(TaskKind::Proxy, self.ctx.group.as_ref(), self.ctx.id)?;
            let outcome = (self.payload)(&self.ctx, value);
            link.fire_complete(&outcome);
            Some(outcome)
        } else {
            if !inner
                .registry()
                .is_live(TaskKind::Proxy, self.ctx.group.as_ref(), self.ctx.id)
            {
                return None;
            }
            Some((self.payload)(&self.ctx, value))
        }
    }
}

impl<V: Clone + Send + 'static> Coordinator<V> {
    /// Wrap a callback so it can be neutralized through the registry.
    pub fn proxy<F>(&self, payload: F, opts: ProxyOptions) -> ProxyFn<V>
    where
        F: Fn(&TaskContext, Option<V>) -> TaskResult<V> + Send + Sync + 'static,
    {
        let ProxyOptions { base, single } = opts;
        let id = self.alloc_id();
        let ctx = self.task_context(id, &base);
        self.install_new(id, TaskKind::Proxy, !single, base, Vec::new(), None);
        ProxyFn {
            coordinator: self.downgrade(),
            ctx,
            single,
            payload: Arc::new(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_proxy_fires_once_then_goes_inert() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let proxy = coordinator.proxy(|_, value| Ok(value), ProxyOptions::new());

        assert_eq!(proxy.call(Some(5)), Some(Ok(Some(5))));
        assert_eq!(proxy.call(Some(6)), None);
        assert!(coordinator.snapshot().kinds.is_empty());
    }

    #[tokio::test]
    async fn cleared_proxy_is_inert_without_an_error() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let proxy = coordinator.proxy(|_, value| Ok(value), ProxyOptions::new());

        assert_eq!(coordinator.clear_proxy(proxy.task_id()).unwrap(), 1);
        assert_eq!(proxy.call(Some(5)), None);
    }

    #[tokio::test]
    async fn persistent_proxy_survives_calls_until_cleared() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let proxy = coordinator.proxy(|_, value| Ok(value), ProxyOptions::new().single(false));

        assert!(proxy.call(Some(1)).is_some());
        assert!(proxy.call(Some(2)).is_some());
        assert_eq!(coordinator.snapshot().kinds["Proxy"].root.live, 1);

        coordinator.clear_proxy(proxy.task_id()).unwrap();
        assert_eq!(proxy.call(Some(3)), None);
    }

    #[tokio::test]
    async fn labeled_proxies_dedupe_like_any_other_kind() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let first = coordinator.proxy(|_, _| Ok(Some(1)), ProxyOptions::new().label("p"));
        let second = coordinator.proxy(|_, _| Ok(Some(2)), ProxyOptions::new().label("p"));

        assert_eq!(first.call(None), None);
        assert_eq!(second.call(None), Some(Ok(Some(2))));
    }
}
