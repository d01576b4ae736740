//! Worker loop: dequeue, execute, report, repeat until empty.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use crate::model::{AbortReason, DownloadTask, ProgressEvent};

use super::{ActiveTask, Shared};

pub(super) fn run(shared: Arc<Shared>) {
    tracing::debug!("download worker started");
    let _guard = PanicGuard { shared: &shared };
    while let Some(task) = next_task(&shared) {
        process(&shared, task);
    }
    tracing::debug!("download worker idle");
}

/// If the worker thread unwinds, reports the active task as failed and hands
/// the remaining queue to a fresh worker, so `wait_idle` still means drained.
struct PanicGuard<'a> {
    shared: &'a Arc<Shared>,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        tracing::error!("download worker panicked");
        let lost = self.shared.lock_state().active.take();
        if let Some(active) = lost {
            let reason = if active.cancelled.load(Ordering::Acquire) {
                AbortReason::Cancelled
            } else {
                AbortReason::TransferError
            };
            self.shared.notifier.emit(&ProgressEvent::Aborted {
                id: active.id,
                reason,
            });
        }

        let mut st = self.shared.lock_state();
        if !st.pending.is_empty() {
            match self.shared.spawn_worker() {
                Ok(()) => return,
                Err(e) => tracing::error!("could not restart download worker: {}", e),
            }
        }
        st.running = false;
        self.shared.idle.notify_all();
    }
}

/// Pop the next non-cancelled task and mark it active. On an empty queue,
/// clear `running` and wake `wait_idle` callers.
fn next_task(shared: &Shared) -> Option<DownloadTask> {
    let mut st = shared.lock_state();
    while let Some(task) = st.pending.pop_front() {
        if task.is_cancelled() {
            tracing::debug!(id = %task.id(), "skipping cancelled download");
            continue;
        }
        st.active = Some(ActiveTask {
            id: task.id(),
            cancelled: task.cancel_token(),
        });
        return Some(task);
    }
    st.running = false;
    shared.idle.notify_all();
    None
}

fn process(shared: &Shared, task: DownloadTask) {
    let id = task.id();
    shared.notifier.emit(&ProgressEvent::Started { id });

    let result = shared.executor.execute(&task, &shared.notifier);

    // Decide the terminal event under the lock: once `active` is cleared a
    // late cancel is a no-op, and before that it wins over any outcome.
    let event = {
        let mut st = shared.lock_state();
        st.active = None;
        match result {
            _ if task.is_cancelled() => ProgressEvent::Aborted {
                id,
                reason: AbortReason::Cancelled,
            },
            Ok(bytes) => {
                tracing::info!(
                    id = %id,
                    bytes,
                    dest = %task.request().destination().display(),
                    "download completed"
                );
                ProgressEvent::Completed {
                    id,
                    destination: task.request().destination().to_path_buf(),
                    mime_type: task.request().mime_type().to_string(),
                    success: true,
                }
            }
            Err(e) => {
                let reason = e.abort_reason();
                match reason {
                    AbortReason::TransferError => {
                        tracing::warn!(id = %id, url = %task.url(), "download failed: {}", e)
                    }
                    _ => tracing::info!(id = %id, "download aborted: {}", e),
                }
                ProgressEvent::Aborted { id, reason }
            }
        }
    };

    shared.notifier.emit(&event);
}
