//! Queued download task: id, request and cancellation token.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use super::DownloadRequest;

/// Identifier assigned by the queue. Monotonic, never reused by a queue instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request accepted by the queue. Owned by the queue while pending and by
/// the worker while active; dropped after its terminal event.
#[derive(Debug)]
pub struct DownloadTask {
    id: TaskId,
    request: Arc<DownloadRequest>,
    url: Url,
    size_limit: Option<u64>,
    cancelled: Arc<AtomicBool>,
}

impl DownloadTask {
    pub(crate) fn new(
        id: TaskId,
        request: DownloadRequest,
        url: Url,
        size_limit: Option<u64>,
    ) -> Self {
        Self {
            id,
            request: Arc::new(request),
            url,
            size_limit,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    /// URL parsed and validated at submit time.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Byte threshold from the size guard; `Some` only for directly-open requests.
    pub fn size_limit(&self) -> Option<u64> {
        self.size_limit
    }

    /// Set the cancellation flag. Returns true if this call changed it.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Shared token for code that only needs to observe cancellation.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}
