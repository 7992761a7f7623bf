use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use stagehand_types::{ClearContext, JoinPolicy, TaskId, TaskKind, TaskResult};

use crate::bridge::{BridgeSlot, Bridged};
use crate::coordinator::{Coordinator, Inner};
use crate::options::TaskOptions;

/// Boxed response future produced by a request dispatch.
pub type RequestFuture<V> = Pin<Box<dyn Future<Output = TaskResult<V>> + Send>>;

/// An abortable remote request: something that can be issued once and
/// cancelled while in flight.
pub trait Fetch<V>: Send + Sync {
    /// Issue the request. Called exactly once, at registration; never
    /// called when a `Share` join adopts an incumbent instead.
    fn dispatch(self: Arc<Self>) -> RequestFuture<V>;

    /// Abort the in-flight request. `replaced_by` names the successor when
    /// this request lost its label under a `Replace` join, so the remote
    /// endpoint can be told who superseded it.
    fn abort(&self, replaced_by: Option<TaskId>);
}

impl<V: Clone + Send + 'static> Coordinator<V> {
    /// Issue and track an abortable request. The returned future settles
    /// with the response, with the cancel context if the task is cleared,
    /// or with a successor's response after `Replace` forwarding.
    pub fn request<R>(&self, req: Arc<R>, opts: TaskOptions) -> Bridged<V>
    where
        R: Fetch<V> + 'static,
    {
        let (slot, rx) = BridgeSlot::new();
        let mut opts = opts;
        opts.on_clear.push(slot.clear_hook());
        let waiters = vec![slot.complete_hook()];

        let join = opts.join;
        let weak = self.weak_inner();
        let abort_handle = Arc::clone(&req);
        let id = self.register_spawned(
            TaskKind::Request,
            false,
            opts,
            waiters,
            Some(Box::new(move |ctx: &ClearContext| {
                let replaced_by = if join == JoinPolicy::Replace {
                    ctx.replaced_by
                } else {
                    None
                };
                abort_handle.abort(replaced_by);
            })),
            move |ctx| {
                // Dispatch happens at registration, not at first poll.
                let response = req.dispatch();
                async move {
                    let outcome = response.await;
                    Inner::complete_single(&weak, TaskKind::Request, &ctx, move |_| outcome);
                }
            },
        );
        Bridged::new(id, rx)
    }
}
