use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shared frame clock: a lazily started ticker broadcasting frame numbers.
///
/// Frame tasks subscribe and complete on the next tick after registration.
/// The clock task runs until the owning coordinator drops it.
pub(crate) struct FrameClock {
    rx: watch::Receiver<u64>,
    handle: JoinHandle<()>,
}

impl FrameClock {
    pub(crate) fn start(period: Duration) -> Self {
        let (tx, rx) = watch::channel(0u64);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval completes immediately;
            // consume it so frame 1 lands one full period out.
            ticker.tick().await;
            let mut frame = 0u64;
            loop {
                ticker.tick().await;
                frame += 1;
                if tx.send(frame).is_err() {
                    return;
                }
            }
        });
        Self { rx, handle }
    }

    /// A receiver that has seen the current frame; `changed().await`
    /// resolves on the next one.
    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.rx.clone()
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
