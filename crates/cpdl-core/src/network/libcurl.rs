//! libcurl-backed `Network`.
//!
//! curl pushes body data through its write callback, while the executor pulls
//! from a `Read`. Each connection runs its transfer on a dedicated thread that
//! forwards chunks through a bounded channel; the bound gives backpressure,
//! and dropping the receiving side aborts the transfer from the callback.

mod head;

use std::cell::{Cell, RefCell};
use std::io::{self, Read};
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use curl::easy::Easy;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{NetworkError, TransferError};

use self::head::{parse_head, ResponseHead};
use super::{Connection, Network};

/// Chunks buffered between the curl thread and the reader.
const FRAME_BACKLOG: usize = 8;

/// Transfer tuning shared by every connection of a `CurlNetwork`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurlOptions {
    pub connect_timeout_secs: u64,
    /// Abort when throughput stays below this many bytes/s for `low_speed_time_secs`.
    pub low_speed_limit: u32,
    pub low_speed_time_secs: u64,
    /// libcurl receive buffer size (None = library default).
    #[serde(default)]
    pub buffer_size: Option<usize>,
    pub max_redirections: u32,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit: 1,
            low_speed_time_secs: 30,
            buffer_size: None,
            max_redirections: 10,
        }
    }
}

/// Network backed by libcurl, optionally pinned to an interface and its resolvers.
///
/// The private-DNS bypass flag survives `clone()` but is not serialized: a
/// network that went through serde comes back in normal mode and the executor
/// will refuse it until `private_dns_bypassing_copy` is called again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurlNetwork {
    /// Bind connections to this interface name or address.
    #[serde(default)]
    pub interface: Option<String>,
    /// Comma-separated resolvers of this network, used in bypass mode.
    #[serde(default)]
    pub dns_servers: Option<String>,
    #[serde(default)]
    pub options: CurlOptions,
    #[serde(skip)]
    bypass_private_dns: bool,
}

impl CurlNetwork {
    pub fn new(options: CurlOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn with_dns_servers(mut self, servers: impl Into<String>) -> Self {
        self.dns_servers = Some(servers.into());
        self
    }

    /// True if this libcurl can use per-handle DNS servers.
    pub fn supports_dns_servers() -> bool {
        curl::Version::get().ares_version().is_some()
    }

    fn configure(&self, url: &Url, user_agent: &str) -> Result<Easy, curl::Error> {
        let opts = &self.options;
        let mut easy = Easy::new();
        easy.url(url.as_str())?;
        if !user_agent.is_empty() {
            easy.useragent(user_agent)?;
        }
        easy.follow_location(true)?;
        easy.max_redirections(opts.max_redirections)?;
        easy.connect_timeout(Duration::from_secs(opts.connect_timeout_secs))?;
        easy.low_speed_limit(opts.low_speed_limit)?;
        easy.low_speed_time(Duration::from_secs(opts.low_speed_time_secs))?;
        if let Some(sz) = opts.buffer_size {
            easy.buffer_size(sz)?;
        }
        if let Some(iface) = &self.interface {
            easy.interface(iface)?;
        }
        if self.bypass_private_dns {
            if let Some(servers) = &self.dns_servers {
                easy.dns_servers(servers)?;
            }
        }
        // Progress callback is how a disconnect interrupts an idle transfer.
        easy.progress(true)?;
        Ok(easy)
    }
}

impl Network for CurlNetwork {
    fn open_connection(
        &self,
        url: &Url,
        user_agent: &str,
    ) -> Result<Box<dyn Connection>, TransferError> {
        self.validate()?;
        let easy = self.configure(url, user_agent)?;
        let (tx, rx) = sync_channel(FRAME_BACKLOG);
        let closed = Arc::new(AtomicBool::new(false));
        let closed_cb = Arc::clone(&closed);
        thread::Builder::new()
            .name("cpdl-curl".to_string())
            .spawn(move || run_transfer(easy, tx, closed_cb))?;

        match rx.recv() {
            Ok(Frame::Head(head)) => {
                tracing::debug!(
                    url = %url,
                    status = head.status,
                    content_length = ?head.content_length,
                    "response head"
                );
                Ok(Box::new(CurlConnection {
                    head,
                    frames: Some(rx),
                    current: Vec::new(),
                    pos: 0,
                    finished: false,
                    closed,
                }))
            }
            Ok(Frame::Failed(e)) => Err(TransferError::Connect(e)),
            Ok(_) | Err(_) => Err(TransferError::Closed),
        }
    }

    fn private_dns_bypassing_copy(&self) -> Arc<dyn Network> {
        Arc::new(CurlNetwork {
            bypass_private_dns: true,
            ..self.clone()
        })
    }

    fn bypasses_private_dns(&self) -> bool {
        self.bypass_private_dns
    }

    fn validate(&self) -> Result<(), NetworkError> {
        match &self.dns_servers {
            Some(servers) if !Self::supports_dns_servers() => {
                Err(NetworkError::DnsServersUnsupported {
                    servers: servers.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

enum Frame {
    Head(ResponseHead),
    Chunk(Vec<u8>),
    Done,
    Failed(curl::Error),
}

/// Body reader for a transfer running on a curl thread.
pub struct CurlConnection {
    head: ResponseHead,
    frames: Option<Receiver<Frame>>,
    current: Vec<u8>,
    pos: usize,
    finished: bool,
    closed: Arc<AtomicBool>,
}

impl Read for CurlConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.current.len() {
                let n = buf.len().min(self.current.len() - self.pos);
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            let frames = self
                .frames
                .as_ref()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))?;
            match frames.recv() {
                Ok(Frame::Chunk(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(Frame::Done) => self.finished = true,
                Ok(Frame::Head(_)) => {}
                Ok(Frame::Failed(e)) => return Err(io::Error::new(io::ErrorKind::Other, e)),
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "transfer thread ended without end of stream",
                    ))
                }
            }
        }
    }
}

impl Connection for CurlConnection {
    fn status(&self) -> u32 {
        self.head.status
    }

    fn content_length(&self) -> Option<u64> {
        self.head.content_length
    }

    fn disconnect(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.frames = None;
    }
}

impl Drop for CurlConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn run_transfer(mut easy: Easy, tx: SyncSender<Frame>, closed: Arc<AtomicBool>) {
    let lines = RefCell::new(Vec::<String>::new());
    let head_sent = Cell::new(false);

    match perform(&mut easy, &tx, &closed, &lines, &head_sent) {
        Ok(()) => {
            if !head_sent.get() {
                // Empty body: the write callback never ran.
                let mut head = parse_head(&lines.borrow());
                if let Ok(code) = easy.response_code() {
                    head.status = code;
                }
                let _ = tx.send(Frame::Head(head));
            }
            let _ = tx.send(Frame::Done);
        }
        Err(e) => {
            if !closed.load(Ordering::Acquire) {
                tracing::debug!("curl transfer failed: {}", e);
            }
            let _ = tx.send(Frame::Failed(e));
        }
    }
}

fn perform(
    easy: &mut Easy,
    tx: &SyncSender<Frame>,
    closed: &AtomicBool,
    lines: &RefCell<Vec<String>>,
    head_sent: &Cell<bool>,
) -> Result<(), curl::Error> {
    let mut transfer = easy.transfer();
    transfer.header_function(|data| {
        if let Ok(s) = str::from_utf8(data) {
            lines.borrow_mut().push(s.trim_end().to_string());
        }
        true
    })?;
    transfer.progress_function(|_, _, _, _| !closed.load(Ordering::Acquire))?;
    transfer.write_function(|data| {
        if !head_sent.get() {
            let head = parse_head(&lines.borrow());
            if tx.send(Frame::Head(head)).is_err() {
                return Ok(0); // reader gone: abort transfer
            }
            head_sent.set(true);
        }
        match tx.send(Frame::Chunk(data.to_vec())) {
            Ok(()) => Ok(data.len()),
            Err(_) => Ok(0),
        }
    })?;
    transfer.perform()
}
