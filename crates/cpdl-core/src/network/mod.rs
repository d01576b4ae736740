//! Network capability the engine downloads through.
//!
//! The host hands every request a `Network`. The queue stores the
//! private-DNS-bypassing copy of it, and the executor refuses to open a
//! connection over a network that is not in bypass mode: captive portal
//! hostnames only resolve through the portal network's own resolvers.

mod libcurl;

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use url::Url;

use crate::error::{NetworkError, TransferError};

pub use libcurl::{CurlConnection, CurlNetwork, CurlOptions};

/// A network that can open HTTP connections.
pub trait Network: Send + Sync + fmt::Debug {
    /// Open a GET connection to `url`. Returns once the response status and
    /// headers are known; the body is read through the returned connection.
    fn open_connection(
        &self,
        url: &Url,
        user_agent: &str,
    ) -> Result<Box<dyn Connection>, TransferError>;

    /// Copy of this network whose connections bypass private DNS.
    fn private_dns_bypassing_copy(&self) -> Arc<dyn Network>;

    fn bypasses_private_dns(&self) -> bool;

    /// Reject configurations this network could never open a connection with.
    /// `submit` calls this so such requests are refused before queueing.
    fn validate(&self) -> Result<(), NetworkError> {
        Ok(())
    }
}

/// An open HTTP response. `read` yields body bytes and returns 0 at end of stream.
pub trait Connection: Read + Send {
    fn status(&self) -> u32;

    /// Declared `Content-Length`, if any.
    fn content_length(&self) -> Option<u64>;

    /// Release the connection. The executor calls this on every exit path and
    /// implementations may call it again on drop, so it must be idempotent.
    /// Reading after this is not allowed.
    fn disconnect(&mut self);
}
