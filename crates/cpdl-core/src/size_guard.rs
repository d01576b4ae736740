//! Byte threshold for "directly open" downloads.
//!
//! Some MIME types (Wi-Fi configuration files) are opened straight after the
//! download instead of being left for the user. Those are capped: the transfer
//! is rejected as soon as the bytes actually received exceed the threshold,
//! whatever the server declared as content length.

use std::collections::BTreeMap;

/// MIME type of Passpoint / Wi-Fi configuration files.
pub const WIFI_CONFIG_MIME_TYPE: &str = "application/x-wifi-config";

/// Default threshold for Wi-Fi configuration files.
pub const WIFI_CONFIG_MAX_BYTES: u64 = 100_000;

/// Outcome of a size check after a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Continue,
    Reject { limit: u64 },
}

/// Per-MIME thresholds. A MIME type is "directly open" iff it has an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeGuard {
    limits: BTreeMap<String, u64>,
}

impl Default for SizeGuard {
    fn default() -> Self {
        let mut limits = BTreeMap::new();
        limits.insert(WIFI_CONFIG_MIME_TYPE.to_string(), WIFI_CONFIG_MAX_BYTES);
        Self { limits }
    }
}

impl SizeGuard {
    /// Build from a MIME → max bytes table (keys are normalized).
    pub fn from_limits<I, S>(limits: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: AsRef<str>,
    {
        Self {
            limits: limits
                .into_iter()
                .map(|(mime, max)| (normalize_mime(mime.as_ref()), max))
                .collect(),
        }
    }

    pub fn is_directly_open(&self, mime_type: &str) -> bool {
        self.limit_for(mime_type).is_some()
    }

    /// Threshold for `mime_type`, or `None` if it is not a directly-open type.
    pub fn limit_for(&self, mime_type: &str) -> Option<u64> {
        self.limits.get(&normalize_mime(mime_type)).copied()
    }
}

/// Size policy: reject once `bytes_so_far` exceeds `limit` for a directly-open request.
pub fn check(bytes_so_far: u64, directly_open: bool, limit: u64) -> GuardVerdict {
    if directly_open && bytes_so_far > limit {
        GuardVerdict::Reject { limit }
    } else {
        GuardVerdict::Continue
    }
}

/// Lowercase essence of a MIME type, without parameters (`; charset=...`).
fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
