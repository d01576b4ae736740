//! Scripted network for queue tests.
//!
//! Each `open_connection` hands out the next prepared connection. Body bytes
//! can be gated: the reader blocks until the test thread releases more data
//! with `Gate::set_available`, which itself waits until the reader is blocked,
//! so tests can step a transfer deterministically.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cpdl_core::error::TransferError;
use cpdl_core::model::{DownloadRequest, ProgressEvent, TaskId};
use cpdl_core::network::{Connection, Network};
use cpdl_core::notifier::ProgressObserver;
use cpdl_core::queue::DownloadQueue;
use tempfile::TempDir;
use url::Url;

pub const TEST_FILESIZE: usize = 1_000_000;
pub const TEST_USERAGENT: &str = "Test UserAgent";
pub const TEST_URL: &str = "https://test.download.example.com/myfile";
pub const TEXT_MIME_TYPE: &str = "text/vnd.cpdl.testtxtfile";
pub const WIFI_CONFIG_MIME_TYPE: &str = "application/x-wifi-config";
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Byte served at `pos` by every generated body.
pub fn byte_at(pos: usize) -> u8 {
    (pos % 256) as u8
}

pub fn expected_body(len: usize) -> Vec<u8> {
    (0..len).map(byte_at).collect()
}

/// Everything observable, in order: connection lifecycle and delivered events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Opened(usize),
    Disconnected(usize),
    Event(ProgressEvent),
}

pub type Log = Arc<Mutex<Vec<Entry>>>;

/// Generated body whose availability is released by a `Gate`.
pub struct GatedBody {
    size: usize,
    position: usize,
    available: usize,
    next_available: Receiver<usize>,
}

pub struct Gate {
    size: usize,
    tx: SyncSender<usize>,
}

impl Gate {
    /// Make `n` bytes (clamped to the body size) available. Blocks until the
    /// reader is waiting for data. Returns false if the reader is gone.
    pub fn set_available(&self, n: usize) -> bool {
        let n = n.min(self.size);
        let deadline = Instant::now() + TIMEOUT;
        loop {
            match self.tx.try_send(n) {
                Ok(()) => return true,
                Err(TrySendError::Disconnected(_)) => return false,
                Err(TrySendError::Full(_)) => {
                    assert!(Instant::now() < deadline, "timed out waiting for body to be read");
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

/// Gated body of `size` bytes with nothing available yet.
pub fn gated(size: usize) -> (GatedBody, Gate) {
    let (tx, rx) = mpsc::sync_channel(0);
    (
        GatedBody {
            size,
            position: 0,
            available: 0,
            next_available: rx,
        },
        Gate { size, tx },
    )
}

/// Body of `size` bytes, all available immediately.
pub fn ready(size: usize) -> GatedBody {
    let (body, _gate) = gated(size);
    GatedBody {
        available: size,
        ..body
    }
}

impl Read for GatedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.size {
            return Ok(0);
        }
        while self.available <= self.position {
            self.available = self
                .next_available
                .recv()
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "gate dropped"))?;
        }
        let n = buf.len().min(self.available - self.position);
        for b in &mut buf[..n] {
            *b = byte_at(self.position);
            self.position += 1;
        }
        Ok(n)
    }
}

/// Body that yields `good` bytes then fails.
pub struct FailingBody {
    inner: GatedBody,
    good: usize,
    served: usize,
}

pub fn failing_after(good: usize) -> FailingBody {
    FailingBody {
        inner: ready(TEST_FILESIZE),
        good,
        served: 0,
    }
}

impl Read for FailingBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.served >= self.good {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let max = buf.len().min(self.good - self.served);
        let n = self.inner.read(&mut buf[..max])?;
        self.served += n;
        Ok(n)
    }
}

pub struct ScriptedConnection {
    index: usize,
    status: u32,
    content_length: Option<u64>,
    body: Box<dyn Read + Send>,
    log: Log,
}

impl Read for ScriptedConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl Connection for ScriptedConnection {
    fn status(&self) -> u32 {
        self.status
    }

    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    fn disconnect(&mut self) {
        self.log.lock().unwrap().push(Entry::Disconnected(self.index));
    }
}

struct Script {
    status: u32,
    content_length: Option<u64>,
    body: Box<dyn Read + Send>,
}

/// Network handing out scripted connections in order.
#[derive(Clone)]
pub struct ScriptedNetwork {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    opened: Arc<Mutex<usize>>,
    log: Log,
    bypass: bool,
    /// Simulates a handle that went through serialization: the bypass copy loses the flag.
    forgetful: bool,
}

impl std::fmt::Debug for ScriptedNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedNetwork")
            .field("bypass", &self.bypass)
            .finish()
    }
}

impl ScriptedNetwork {
    pub fn new(log: Log) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            opened: Arc::new(Mutex::new(0)),
            log,
            bypass: false,
            forgetful: false,
        }
    }

    pub fn forgetful(log: Log) -> Self {
        Self {
            forgetful: true,
            ..Self::new(log)
        }
    }

    /// Queue the next connection. `content_length` of `None` means not declared.
    pub fn push(&self, status: u32, content_length: Option<u64>, body: impl Read + Send + 'static) {
        self.scripts.lock().unwrap().push_back(Script {
            status,
            content_length,
            body: Box::new(body),
        });
    }

    pub fn opened(&self) -> usize {
        *self.opened.lock().unwrap()
    }
}

impl Network for ScriptedNetwork {
    fn open_connection(
        &self,
        _url: &Url,
        user_agent: &str,
    ) -> Result<Box<dyn Connection>, TransferError> {
        assert_eq!(user_agent, TEST_USERAGENT);
        if !self.bypass {
            return Err(TransferError::PrivateDnsNotBypassed);
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransferError::Closed)?;
        let index = {
            let mut opened = self.opened.lock().unwrap();
            *opened += 1;
            *opened
        };
        self.log.lock().unwrap().push(Entry::Opened(index));
        Ok(Box::new(ScriptedConnection {
            index,
            status: script.status,
            content_length: script.content_length,
            body: script.body,
            log: Arc::clone(&self.log),
        }))
    }

    fn private_dns_bypassing_copy(&self) -> Arc<dyn Network> {
        Arc::new(Self {
            bypass: !self.forgetful,
            ..self.clone()
        })
    }

    fn bypasses_private_dns(&self) -> bool {
        self.bypass
    }
}

/// Observer appending to the shared log and forwarding to a channel.
pub struct LogObserver {
    log: Log,
    tx: Mutex<mpsc::Sender<ProgressEvent>>,
}

impl ProgressObserver for LogObserver {
    fn on_event(&self, event: &ProgressEvent) {
        self.log.lock().unwrap().push(Entry::Event(event.clone()));
        let _ = self.tx.lock().unwrap().send(event.clone());
    }
}

/// Queue + scripted network + observer + temp dir.
pub struct Harness {
    pub queue: DownloadQueue,
    pub network: ScriptedNetwork,
    pub log: Log,
    pub events: Receiver<ProgressEvent>,
    pub dir: TempDir,
    pub observer: Arc<dyn ProgressObserver>,
}

impl Harness {
    pub fn new(queue: DownloadQueue) -> Self {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        Self::with_network(queue, ScriptedNetwork::new(Arc::clone(&log)), log)
    }

    pub fn with_network(queue: DownloadQueue, network: ScriptedNetwork, log: Log) -> Self {
        let (tx, rx) = mpsc::channel();
        let observer: Arc<dyn ProgressObserver> = Arc::new(LogObserver {
            log: Arc::clone(&log),
            tx: Mutex::new(tx),
        });
        queue.attach(&observer);
        Self {
            queue,
            network,
            log,
            events: rx,
            dir: tempfile::tempdir().unwrap(),
            observer,
        }
    }

    pub fn dest(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn request(&self, name: &str, mime_type: &str) -> DownloadRequest {
        DownloadRequest::new(Arc::new(self.network.clone()), TEST_URL, self.dest(name), mime_type)
            .with_user_agent(TEST_USERAGENT)
    }

    pub fn submit(&self, name: &str, mime_type: &str) -> TaskId {
        self.queue.submit(self.request(name, mime_type)).expect("submit")
    }

    /// Receive events until one matches `pred`; returns it.
    pub fn wait_for(&self, mut pred: impl FnMut(&ProgressEvent) -> bool) -> ProgressEvent {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let ev = self
                .events
                .recv_timeout(left)
                .expect("timed out waiting for event");
            if pred(&ev) {
                return ev;
            }
        }
    }

    pub fn wait_terminal(&self, id: TaskId) -> ProgressEvent {
        self.wait_for(|ev| ev.id() == id && ev.is_terminal())
    }

    pub fn events_for(&self, id: TaskId) -> Vec<ProgressEvent> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Entry::Event(ev) if ev.id() == id => Some(ev.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.log.lock().unwrap().clone()
    }
}

/// Started first, then only Progress, then exactly one terminal event last.
pub fn assert_well_formed(events: &[ProgressEvent]) {
    assert!(!events.is_empty(), "no events");
    assert!(
        matches!(events[0], ProgressEvent::Started { .. }),
        "first event must be Started: {:?}",
        events[0]
    );
    let last = events.len() - 1;
    assert!(events[last].is_terminal(), "last event must be terminal");
    for ev in &events[1..last] {
        assert!(
            matches!(ev, ProgressEvent::Progress { .. }),
            "unexpected event in the middle: {:?}",
            ev
        );
    }
}
