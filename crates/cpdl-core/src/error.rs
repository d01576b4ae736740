//! Error types: rejection at submit time and task-scoped transfer failures.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::AbortReason;

/// A request that was refused synchronously by `submit` and never queued.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported URL scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),
    #[error("destination {} is a directory", .0.display())]
    DestinationIsDirectory(PathBuf),
    #[error("destination directory {} does not exist", .0.display())]
    DestinationParentMissing(PathBuf),
    #[error("destination {} is read-only", .0.display())]
    DestinationReadOnly(PathBuf),
    #[error("destination directory {} is not writable", .0.display())]
    DestinationDirNotWritable(PathBuf),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("could not start download worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// A network configuration the backend cannot honour.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Per-network resolvers need libcurl built with c-ares.
    #[error("DNS servers {servers:?} are configured but libcurl has no c-ares resolver")]
    DnsServersUnsupported { servers: String },
}

/// Failure or interruption of the active transfer. Every variant ends the task.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The network handle was not put in private-DNS-bypass mode (or lost it
    /// through a serialize round trip).
    #[error("network does not bypass private DNS")]
    PrivateDnsNotBypassed,
    #[error(transparent)]
    Unsupported(#[from] NetworkError),
    #[error("connection failed: {0}")]
    Connect(#[from] curl::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed before a response was received")]
    Closed,
    #[error("cancelled")]
    Cancelled,
    #[error("file too large: {received} bytes read, limit {limit}")]
    FileTooLarge { limit: u64, received: u64 },
}

impl TransferError {
    /// Reason reported to the observer for this failure.
    pub fn abort_reason(&self) -> AbortReason {
        match self {
            TransferError::Cancelled => AbortReason::Cancelled,
            TransferError::FileTooLarge { .. } => AbortReason::FileTooLarge,
            _ => AbortReason::TransferError,
        }
    }
}
