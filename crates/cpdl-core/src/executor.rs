//! Transfer executor: one GET streamed into the destination file.
//!
//! Runs on the worker thread. Between chunks it polls the task's cancellation
//! token and, for directly-open requests, the size guard. The destination and
//! the connection are released on every exit path.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::ops::{Deref, DerefMut};

use crate::error::TransferError;
use crate::model::{DownloadTask, ProgressEvent};
use crate::network::Connection;
use crate::notifier::ProgressNotifier;
use crate::size_guard::{self, GuardVerdict};

/// Default read size per loop iteration.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Streams one task at a time. Cheap to clone; holds only tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferExecutor {
    chunk_size: usize,
}

impl Default for TransferExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl TransferExecutor {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Download `task` to its destination, emitting `Progress` after each chunk.
    /// Returns the number of bytes written. `Started` and the terminal event
    /// are the caller's responsibility.
    pub fn execute(
        &self,
        task: &DownloadTask,
        notifier: &ProgressNotifier,
    ) -> Result<u64, TransferError> {
        let request = task.request();
        let network = request.network();
        if !network.bypasses_private_dns() {
            return Err(TransferError::PrivateDnsNotBypassed);
        }
        if task.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let mut conn = OpenConnection(network.open_connection(task.url(), request.user_agent())?);
        let status = conn.status();
        if !(200..300).contains(&status) {
            return Err(TransferError::HttpStatus(status));
        }
        let total_bytes = conn.content_length();
        tracing::debug!(
            id = %task.id(),
            status,
            total_bytes = ?total_bytes,
            dest = %request.destination().display(),
            "connected"
        );

        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(request.destination())?;
        let mut sink = BufWriter::with_capacity(self.chunk_size.max(8 * 1024), file);

        let mut buf = vec![0u8; self.chunk_size];
        let mut bytes_read = 0u64;
        loop {
            if task.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let n = match conn.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                break;
            }
            bytes_read += n as u64;
            sink.write_all(&buf[..n])?;
            notifier.emit(&ProgressEvent::Progress {
                id: task.id(),
                bytes_read,
                total_bytes,
            });

            if let Some(limit) = task.size_limit() {
                if let GuardVerdict::Reject { limit } =
                    size_guard::check(bytes_read, request.is_directly_open(), limit)
                {
                    return Err(TransferError::FileTooLarge {
                        limit,
                        received: bytes_read,
                    });
                }
            }
        }

        sink.flush()?;
        Ok(bytes_read)
    }
}

/// Calls `disconnect` when the transfer ends, however it ends.
struct OpenConnection(Box<dyn Connection>);

impl Deref for OpenConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl DerefMut for OpenConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.0
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.0.disconnect();
    }
}
