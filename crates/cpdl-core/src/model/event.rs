//! Lifecycle events delivered to the attached observer.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::TaskId;

/// Why a task ended without completing. All reasons are terminal; the engine
/// never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbortReason {
    /// A directly-open download went over its byte threshold.
    FileTooLarge,
    /// The caller cancelled the task while it was active.
    Cancelled,
    /// Connection, HTTP status or I/O failure.
    TransferError,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortReason::FileTooLarge => "file too large",
            AbortReason::Cancelled => "cancelled",
            AbortReason::TransferError => "transfer error",
        };
        f.write_str(s)
    }
}

/// One lifecycle event. Per task: `Started`, any number of `Progress`, then
/// exactly one of `Completed` or `Aborted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        id: TaskId,
    },
    Progress {
        id: TaskId,
        bytes_read: u64,
        /// Declared content length; `None` when the server did not send one.
        total_bytes: Option<u64>,
    },
    Completed {
        id: TaskId,
        destination: PathBuf,
        mime_type: String,
        success: bool,
    },
    Aborted {
        id: TaskId,
        reason: AbortReason,
    },
}

impl ProgressEvent {
    pub fn id(&self) -> TaskId {
        match self {
            ProgressEvent::Started { id }
            | ProgressEvent::Progress { id, .. }
            | ProgressEvent::Completed { id, .. }
            | ProgressEvent::Aborted { id, .. } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Aborted { .. }
        )
    }

    /// Whole percent for `Progress` events with a known, non-zero total.
    pub fn percent(&self) -> Option<u8> {
        match self {
            ProgressEvent::Progress {
                bytes_read,
                total_bytes: Some(total),
                ..
            } if *total > 0 => Some((bytes_read.saturating_mul(100) / total).min(100) as u8),
            _ => None,
        }
    }
}
