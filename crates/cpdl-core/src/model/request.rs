//! Download request as handed to `DownloadQueue::submit`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::network::Network;
use crate::queue::SubmitError;

/// Immutable description of one download: where from, over which network,
/// and where to write it.
#[derive(Clone)]
pub struct DownloadRequest {
    network: Arc<dyn Network>,
    user_agent: String,
    url: String,
    display_name: String,
    destination: PathBuf,
    mime_type: String,
    directly_open: bool,
}

impl DownloadRequest {
    /// New request with an empty user agent and the destination file name as display name.
    pub fn new(
        network: Arc<dyn Network>,
        url: impl Into<String>,
        destination: impl Into<PathBuf>,
        mime_type: impl Into<String>,
    ) -> Self {
        let destination = destination.into();
        let display_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            network,
            user_agent: String::new(),
            url: url.into(),
            display_name,
            destination,
            mime_type: mime_type.into(),
            directly_open: false,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// True if the MIME type belongs to the size-limited "directly open" class.
    /// Only meaningful once the queue has accepted the request.
    pub fn is_directly_open(&self) -> bool {
        self.directly_open
    }

    /// Checks everything that can be checked before queueing and returns the parsed URL.
    pub(crate) fn validate(&self) -> Result<Url, SubmitError> {
        let url = Url::parse(&self.url).map_err(|e| SubmitError::InvalidUrl {
            url: self.url.clone(),
            source: e,
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SubmitError::UnsupportedScheme(url.scheme().to_string()));
        }

        let dest = &self.destination;
        if dest.as_os_str().is_empty() || dest.is_dir() {
            return Err(SubmitError::DestinationIsDirectory(dest.clone()));
        }
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !parent.is_dir() {
            return Err(SubmitError::DestinationParentMissing(parent.to_path_buf()));
        }
        match dest.metadata() {
            Ok(meta) => {
                if meta.permissions().readonly() || !is_writable(dest) {
                    return Err(SubmitError::DestinationReadOnly(dest.clone()));
                }
            }
            Err(_) => {
                if !is_writable(parent) {
                    return Err(SubmitError::DestinationDirNotWritable(parent.to_path_buf()));
                }
            }
        }
        self.network.validate()?;
        Ok(url)
    }

    /// Final form stored by the queue: bypassing network copy and the derived
    /// directly-open flag. The request is never modified after this.
    pub(crate) fn accepted(mut self, directly_open: bool) -> Self {
        self.network = self.network.private_dns_bypassing_copy();
        self.directly_open = directly_open;
        self
    }
}

/// Whether this process may write to `path` (access(2) with `W_OK`).
#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    match CString::new(path.as_os_str().as_bytes()) {
        Ok(c_path) => unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 },
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    path.metadata()
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

impl fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("network", &self.network)
            .field("user_agent", &self.user_agent)
            .field("url", &self.url)
            .field("display_name", &self.display_name)
            .field("destination", &self.destination)
            .field("mime_type", &self.mime_type)
            .field("directly_open", &self.directly_open)
            .finish()
    }
}
