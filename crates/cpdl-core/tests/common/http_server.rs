//! Minimal HTTP/1.1 server for end-to-end downloads over curl.
//!
//! Serves a single static body to every GET. Can answer with a fixed error
//! status or leave out Content-Length (the body then ends at connection close).

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Status line sent for GET, e.g. "200 OK" or "404 Not Found".
    pub status: &'static str,
    /// If false, omit Content-Length and close the connection after the body.
    pub send_length: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            status: "200 OK",
            send_length: true,
        }
    }
}

/// Starts a server in a background thread serving `body`. Returns the URL of
/// the served file (e.g. "http://127.0.0.1:12345/file"). Runs until the process exits.
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, ServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            thread::spawn(move || handle(stream, &body, opts));
        }
    });
    format!("http://127.0.0.1:{}/file", port)
}

fn handle(mut stream: TcpStream, body: &[u8], opts: ServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let method = std::str::from_utf8(&buf[..n])
        .ok()
        .and_then(|r| r.split_whitespace().next())
        .unwrap_or("");
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    let ok = opts.status.starts_with('2');
    let payload = if ok { body } else { &b"not here"[..] };
    let head = if opts.send_length {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
            opts.status,
            payload.len()
        )
    } else {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
            opts.status
        )
    };
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(payload);
    let _ = stream.flush();
}
