//! `cpdl get` – download URLs through the queue, one at a time.

use anyhow::{bail, Result};
use cpdl_core::config::CpdlConfig;
use cpdl_core::model::{DownloadRequest, ProgressEvent};
use cpdl_core::network::{CurlNetwork, Network};
use cpdl_core::notifier::ProgressObserver;
use cpdl_core::queue::DownloadQueue;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
const FALLBACK_FILE_NAME: &str = "download.bin";

#[derive(Debug, Clone)]
pub struct GetOptions {
    pub urls: Vec<String>,
    pub dir: PathBuf,
    pub mime: String,
    pub user_agent: Option<String>,
    pub interface: Option<String>,
    pub dns_servers: Option<String>,
    pub json: bool,
}

pub async fn run_get(cfg: &CpdlConfig, opts: GetOptions) -> Result<()> {
    let queue = DownloadQueue::from_config(cfg);
    let printer = Arc::new(EventPrinter::new(opts.json));
    let observer: Arc<dyn ProgressObserver> = printer.clone();
    queue.attach(&observer);

    let mut network = CurlNetwork::new(cfg.curl);
    if let Some(iface) = &opts.interface {
        network = network.with_interface(iface.as_str());
    }
    if let Some(servers) = &opts.dns_servers {
        network = network.with_dns_servers(servers.as_str());
    }
    let network: Arc<dyn Network> = Arc::new(network);
    network.validate()?;
    let user_agent = opts
        .user_agent
        .clone()
        .or_else(|| cfg.user_agent.clone())
        .unwrap_or_else(default_user_agent);

    let mut rejected = 0usize;
    for url in &opts.urls {
        let dest = opts.dir.join(file_name_for(url));
        let request =
            DownloadRequest::new(Arc::clone(&network), url.as_str(), dest, opts.mime.as_str())
                .with_user_agent(user_agent.as_str());
        match queue.submit(request) {
            Ok(id) => tracing::debug!(id = %id, url = %url, "submitted"),
            Err(e) => {
                eprintln!("cpdl: skipping {}: {}", url, e);
                rejected += 1;
            }
        }
    }

    let waiter = {
        let queue = queue.clone();
        tokio::task::spawn_blocking(move || queue.wait_idle(None))
    };
    tokio::select! {
        res = waiter => {
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            let cancelled = queue.cancel_all();
            tracing::info!(cancelled, "interrupted, cancelling downloads");
            eprintln!("\ncpdl: interrupted, cancelling {} download(s)", cancelled);
            let queue = queue.clone();
            tokio::task::spawn_blocking(move || queue.wait_idle(None)).await?;
        }
    }
    queue.detach();

    let tally = printer.tally();
    if !opts.json {
        println!(
            "{} completed, {} failed, {} rejected",
            tally.completed, tally.aborted, rejected
        );
    }
    if tally.aborted > 0 || rejected > 0 {
        bail!("{} of {} download(s) did not complete", tally.aborted + rejected, opts.urls.len());
    }
    Ok(())
}

fn default_user_agent() -> String {
    format!("cpdl/{}", env!("CARGO_PKG_VERSION"))
}

/// Last non-empty path segment of `url`, or a fixed fallback.
pub(crate) fn file_name_for(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tally {
    pub completed: usize,
    pub aborted: usize,
}

/// Prints events as they arrive on the worker thread.
pub(crate) struct EventPrinter {
    json: bool,
    state: Mutex<PrinterState>,
}

struct PrinterState {
    tally: Tally,
    last_print: Option<Instant>,
}

impl EventPrinter {
    pub(crate) fn new(json: bool) -> Self {
        Self {
            json,
            state: Mutex::new(PrinterState {
                tally: Tally::default(),
                last_print: None,
            }),
        }
    }

    pub(crate) fn tally(&self) -> Tally {
        self.state.lock().map(|s| s.tally).unwrap_or_default()
    }

    /// Human-readable line for `event`, or None when throttled.
    fn line(&self, state: &mut PrinterState, event: &ProgressEvent) -> Option<String> {
        match event {
            ProgressEvent::Started { id } => Some(format!("[{}] started", id)),
            ProgressEvent::Progress {
                id,
                bytes_read,
                total_bytes,
            } => {
                let now = Instant::now();
                if state
                    .last_print
                    .is_some_and(|t| now.duration_since(t) < PROGRESS_INTERVAL)
                {
                    return None;
                }
                state.last_print = Some(now);
                let done_kib = *bytes_read as f64 / 1024.0;
                Some(match (total_bytes, event.percent()) {
                    (Some(total), Some(pct)) => format!(
                        "[{}] {:.1} / {:.1} KiB ({}%)",
                        id,
                        done_kib,
                        *total as f64 / 1024.0,
                        pct
                    ),
                    _ => format!("[{}] {:.1} KiB", id, done_kib),
                })
            }
            ProgressEvent::Completed { id, destination, .. } => {
                Some(format!("[{}] saved to {}", id, destination.display()))
            }
            ProgressEvent::Aborted { id, reason } => Some(format!("[{}] aborted: {}", id, reason)),
        }
    }
}

impl ProgressObserver for EventPrinter {
    fn on_event(&self, event: &ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match event {
            ProgressEvent::Completed { .. } => state.tally.completed += 1,
            ProgressEvent::Aborted { .. } => state.tally.aborted += 1,
            ProgressEvent::Started { .. } => state.last_print = None,
            ProgressEvent::Progress { .. } => {}
        }
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("failed to serialize event: {}", e),
            }
        } else if let Some(line) = self.line(&mut state, event) {
            println!("{}", line);
        }
    }
}
