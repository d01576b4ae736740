//! Single-slot progress observer.
//!
//! At most one observer is attached; attaching replaces the previous one.
//! The slot holds a `Weak` reference so a UI that goes away without calling
//! `detach` simply stops receiving events.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};

use crate::model::ProgressEvent;

/// Receives lifecycle events for all tasks, on the worker thread.
///
/// Events are delivered while the notifier slot is locked: an observer must
/// not call `attach`/`detach` from inside `on_event`. Calling `submit` or
/// `cancel` on the queue is fine.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

#[derive(Default)]
pub struct ProgressNotifier {
    slot: Mutex<Option<Weak<dyn ProgressObserver>>>,
}

impl ProgressNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `observer`, replacing any previous one.
    pub fn attach(&self, observer: &Arc<dyn ProgressObserver>) {
        *self.lock() = Some(Arc::downgrade(observer));
    }

    pub fn detach(&self) {
        *self.lock() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.lock()
            .as_ref()
            .map_or(false, |weak| weak.strong_count() > 0)
    }

    /// Deliver `event` to the attached observer, or drop it if there is none.
    /// A panicking observer loses that event only; the caller keeps running.
    pub fn emit(&self, event: &ProgressEvent) {
        let slot = self.lock();
        match slot.as_ref().and_then(Weak::upgrade) {
            Some(observer) => {
                let delivered =
                    panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event)));
                if delivered.is_err() {
                    tracing::error!(id = %event.id(), "progress observer panicked");
                }
            }
            None => tracing::trace!(id = %event.id(), "no observer, event dropped"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Weak<dyn ProgressObserver>>> {
        // A panicking observer must not wedge the worker.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}
