//! Download queue and its single worker.
//!
//! `submit` and `cancel` may be called from any thread. Tasks run one at a
//! time, in submission order, on a dedicated worker thread that is spawned
//! when work arrives and exits when the queue drains. The queue is an owned
//! value: create one per process (or per test) and hand clones to callers.

mod worker;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::config::CpdlConfig;
use crate::executor::TransferExecutor;
use crate::model::{DownloadRequest, DownloadTask, TaskId};
use crate::notifier::{ProgressNotifier, ProgressObserver};
use crate::size_guard::SizeGuard;

pub use crate::error::SubmitError;

/// Ids of the active task and of pending (non-cancelled) tasks, in run order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub active: Option<TaskId>,
    pub pending: Vec<TaskId>,
}

impl QueueSnapshot {
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.pending.is_empty()
    }
}

struct ActiveTask {
    id: TaskId,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    pending: VecDeque<DownloadTask>,
    active: Option<ActiveTask>,
    /// A worker thread exists. Cleared by the worker, under the lock, when it
    /// finds the queue empty.
    running: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    idle: Condvar,
    notifier: ProgressNotifier,
    executor: TransferExecutor,
    size_guard: SizeGuard,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a worker thread. The caller holds the state lock and sets `running`.
    fn spawn_worker(self: &Arc<Self>) -> std::io::Result<()> {
        let shared = Arc::clone(self);
        thread::Builder::new()
            .name("cpdl-worker".to_string())
            .spawn(move || worker::run(shared))
            .map(drop)
    }
}

/// Sequential download queue. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct DownloadQueue {
    shared: Arc<Shared>,
}

impl Default for DownloadQueue {
    fn default() -> Self {
        Self::new(TransferExecutor::default(), SizeGuard::default())
    }
}

impl DownloadQueue {
    pub fn new(executor: TransferExecutor, size_guard: SizeGuard) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    next_id: 1,
                    ..QueueState::default()
                }),
                idle: Condvar::new(),
                notifier: ProgressNotifier::new(),
                executor,
                size_guard,
            }),
        }
    }

    pub fn from_config(cfg: &CpdlConfig) -> Self {
        Self::new(
            TransferExecutor::new(cfg.chunk_size),
            SizeGuard::from_limits(cfg.directly_open.iter().map(|(k, v)| (k.as_str(), *v))),
        )
    }

    /// Validate and enqueue `request`. Starts the worker if it is idle.
    /// Rejected requests are never queued and get no id.
    pub fn submit(&self, request: DownloadRequest) -> Result<TaskId, SubmitError> {
        let url = request.validate()?;
        let size_limit = self.shared.size_guard.limit_for(request.mime_type());
        let request = request.accepted(size_limit.is_some());

        let mut st = self.shared.lock_state();
        let id = TaskId(st.next_id);
        st.next_id += 1;
        tracing::debug!(
            id = %id,
            url = %url,
            mime = request.mime_type(),
            directly_open = request.is_directly_open(),
            "download queued"
        );
        st.pending.push_back(DownloadTask::new(id, request, url, size_limit));

        if !st.running {
            if let Err(e) = self.shared.spawn_worker() {
                st.pending.pop_back();
                return Err(SubmitError::WorkerSpawn(e));
            }
            st.running = true;
        }
        Ok(id)
    }

    /// Cancel a pending or active task. Returns false if `id` is unknown,
    /// already finished, or already cancelled.
    ///
    /// A pending task is skipped silently. An active task stops within one
    /// chunk and reports `Aborted { reason: Cancelled }`.
    pub fn cancel(&self, id: TaskId) -> bool {
        let st = self.shared.lock_state();
        if let Some(active) = st.active.as_ref().filter(|a| a.id == id) {
            let changed = !active.cancelled.swap(true, Ordering::AcqRel);
            if changed {
                tracing::debug!(id = %id, "cancelling active download");
            }
            return changed;
        }
        match st.pending.iter().find(|t| t.id() == id) {
            Some(task) => {
                let changed = task.cancel();
                if changed {
                    tracing::debug!(id = %id, "cancelling queued download");
                }
                changed
            }
            None => false,
        }
    }

    /// Cancel the active task and everything pending. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let st = self.shared.lock_state();
        let mut n = st.pending.iter().filter(|t| t.cancel()).count();
        if let Some(active) = &st.active {
            if !active.cancelled.swap(true, Ordering::AcqRel) {
                n += 1;
            }
        }
        n
    }

    /// Attach the observer that receives all future events, replacing any other.
    pub fn attach(&self, observer: &Arc<dyn ProgressObserver>) {
        self.shared.notifier.attach(observer);
    }

    pub fn detach(&self) {
        self.shared.notifier.detach();
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let st = self.shared.lock_state();
        QueueSnapshot {
            active: st.active.as_ref().map(|a| a.id),
            pending: st
                .pending
                .iter()
                .filter(|t| !t.is_cancelled())
                .map(|t| t.id())
                .collect(),
        }
    }

    /// Block until the worker has drained the queue and emitted every terminal
    /// event. With a timeout, returns false if it expired first.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let st = self.shared.lock_state();
        match timeout {
            None => {
                let _st = self
                    .shared
                    .idle
                    .wait_while(st, |s| s.running)
                    .unwrap_or_else(|e| e.into_inner());
                true
            }
            Some(d) => {
                let (_st, res) = self
                    .shared
                    .idle
                    .wait_timeout_while(st, d, |s| s.running)
                    .unwrap_or_else(|e| e.into_inner());
                !res.timed_out()
            }
        }
    }
}
