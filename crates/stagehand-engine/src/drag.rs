use std::sync::Arc;

use stagehand_registry::Selector;
use stagehand_types::Key;

use crate::coordinator::Coordinator;
use crate::listener::Emitter;
use crate::options::{ListenerOptions, TaskContext};

/// Events the composite treats as the start of a gesture.
const PRESS_EVENTS: &str = "mousedown touchstart";
const MOVE_EVENTS: &str = "mousemove touchmove";
const RELEASE_EVENTS: &str = "mouseup touchend";

/// Stage handlers for a drag gesture.
pub struct DragOptions<V> {
    group: Option<Key>,
    on_press: Option<DragHandler<V>>,
    on_move: Option<DragHandler<V>>,
    on_release: Option<DragHandler<V>>,
}

pub type DragHandler<V> = Arc<dyn Fn(&TaskContext, Option<&V>) + Send + Sync>;

impl<V> Default for DragOptions<V> {
    fn default() -> Self {
        Self {
            group: None,
            on_press: None,
            on_move: None,
            on_release: None,
        }
    }
}

impl<V> DragOptions<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group holding the press listeners; generated when not given.
    pub fn group(mut self, group: impl Into<Key>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn on_press(mut self, handler: impl Fn(&TaskContext, Option<&V>) + Send + Sync + 'static) -> Self {
        self.on_press = Some(Arc::new(handler));
        self
    }

    pub fn on_move(mut self, handler: impl Fn(&TaskContext, Option<&V>) + Send + Sync + 'static) -> Self {
        self.on_move = Some(Arc::new(handler));
        self
    }

    pub fn on_release(mut self, handler: impl Fn(&TaskContext, Option<&V>) + Send + Sync + 'static) -> Self {
        self.on_release = Some(Arc::new(handler));
        self
    }
}

impl<V: Clone + Send + 'static> Coordinator<V> {
    /// Drag composite: press listeners stay armed under the returned
    /// group; each press installs move and release listeners under a
    /// fresh gesture group, and the release tears that group down.
    pub fn drag<E>(&self, element: &Arc<E>, opts: DragOptions<V>) -> Key
    where
        E: Emitter<V> + 'static,
    {
        let outer = opts.group.clone().unwrap_or_else(Key::unique);
        let coordinator = self.downgrade();
        let element_weak = Arc::downgrade(element);
        let on_press = opts.on_press;
        let on_move = opts.on_move;
        let on_release = opts.on_release;

        let press = move |ctx: &TaskContext, value: Option<&V>| {
            let Some(coordinator) = coordinator.upgrade() else {
                return;
            };
            let Some(element) = element_weak.upgrade() else {
                return;
            };
            if let Some(handler) = &on_press {
                handler(ctx, value);
            }

            let gesture = Key::unique();

            let move_handler = on_move.clone();
            coordinator.on(
                &element,
                MOVE_EVENTS,
                move |ctx, value| {
                    if let Some(handler) = &move_handler {
                        handler(ctx, value);
                    }
                },
                ListenerOptions::new().group(gesture.clone()),
            );

            let release_handler = on_release.clone();
            let release_coordinator = coordinator.downgrade();
            let release_gesture = gesture.clone();
            coordinator.on(
                &element,
                RELEASE_EVENTS,
                move |ctx, value| {
                    if let Some(handler) = &release_handler {
                        handler(ctx, value);
                    }
                    // End of gesture: drop the move and release listeners
                    // in one sweep.
                    if let Some(coordinator) = release_coordinator.upgrade() {
                        let _ = coordinator.off(Selector::group(release_gesture.clone()));
                    }
                },
                ListenerOptions::new().group(gesture),
            );
        };

        self.on(
            element,
            PRESS_EVENTS,
            press,
            ListenerOptions::new().group(outer.clone()),
        );
        outer
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::test_support::CountingEmitter;

    use super::*;

    fn count() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test]
    async fn gesture_installs_move_and_release_listeners_and_tears_them_down() {
        // Seed scenario: press, two moves, release — move fires twice,
        // release once, and the gesture listeners are all removed.
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let element = Arc::new(CountingEmitter::new(false));
        let (presses, moves, releases) = (count(), count(), count());

        let presses_c = presses.clone();
        let moves_c = moves.clone();
        let releases_c = releases.clone();
        coordinator.drag(
            &element,
            DragOptions::new()
                .on_press(move |_, _| {
                    presses_c.fetch_add(1, Ordering::SeqCst);
                })
                .on_move(move |_, _| {
                    moves_c.fetch_add(1, Ordering::SeqCst);
                })
                .on_release(move |_, _| {
                    releases_c.fetch_add(1, Ordering::SeqCst);
                }),
        );

        // Before any press, only the press listeners exist.
        assert_eq!(element.live_handlers("mousedown"), 1);
        assert_eq!(element.live_handlers("mousemove"), 0);

        element.emit("mousedown", None);
        assert_eq!(presses.load(Ordering::SeqCst), 1);
        assert_eq!(element.live_handlers("mousemove"), 1);
        assert_eq!(element.live_handlers("touchmove"), 1);
        assert_eq!(element.live_handlers("mouseup"), 1);
        assert_eq!(element.live_handlers("touchend"), 1);

        element.emit("mousemove", None);
        element.emit("mousemove", None);
        assert_eq!(moves.load(Ordering::SeqCst), 2);

        element.emit("mouseup", None);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        for event in ["mousemove", "touchmove", "mouseup", "touchend"] {
            assert_eq!(element.live_handlers(event), 0, "{event} survived");
        }

        // The press listeners survive for the next gesture.
        assert_eq!(element.live_handlers("mousedown"), 1);
        element.emit("mousedown", None);
        assert_eq!(presses.load(Ordering::SeqCst), 2);
        assert_eq!(element.live_handlers("mousemove"), 1);
    }

    #[tokio::test]
    async fn clearing_the_returned_group_disarms_the_composite() {
        let coordinator: Coordinator<u32> = Coordinator::new("t");
        let element = Arc::new(CountingEmitter::new(false));
        let presses = count();
        let presses_c = presses.clone();
        let group = coordinator.drag(
            &element,
            DragOptions::new().on_press(move |_, _| {
                presses_c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(coordinator.off(Selector::group(group)).unwrap(), 2);
        element.emit("mousedown", None);
        assert_eq!(presses.load(Ordering::SeqCst), 0);
        assert_eq!(element.live_handlers("mousedown"), 0);
    }
}
