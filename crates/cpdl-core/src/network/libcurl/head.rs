//! Parse response header lines into the status and declared length.

/// Status line and `Content-Length` of the final response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: u32,
    pub content_length: Option<u64>,
}

/// Parse collected header lines. With redirects, curl reports every
/// response's headers; each status line starts a new block and only the last
/// block counts.
pub(crate) fn parse_head(lines: &[String]) -> ResponseHead {
    let mut status = 0;
    let mut content_length = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            status = line
                .split_whitespace()
                .nth(1)
                .and_then(|code| code.parse::<u32>().ok())
                .unwrap_or(0);
            content_length = None;
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse::<u64>().ok();
            }
        }
    }

    ResponseHead {
        status,
        content_length,
    }
}
