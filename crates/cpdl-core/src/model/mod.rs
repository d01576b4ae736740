//! Request/result model shared by the queue, the executor and observers.
//!
//! A `DownloadRequest` is built by the caller and handed to the queue, which
//! wraps it in a `DownloadTask` with a fresh id and a cancellation token.
//! Everything the engine reports back is a `ProgressEvent`.

mod event;
mod request;
mod task;

pub use event::{AbortReason, ProgressEvent};
pub use request::DownloadRequest;
pub use task::{DownloadTask, TaskId};
