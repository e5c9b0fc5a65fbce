//! Minimal HTTP/1.1 server for transfer tests.
//!
//! Serves a single static body. Honors `Range: bytes=N-` with 206 Partial
//! Content (or 416 when N is past the end). It can be told to ignore ranges,
//! to answer every range from byte 0, to cut the first few responses short,
//! or to answer every request with a fixed status. Every request's Range header is recorded.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// The first `truncate_responses` responses close the connection after
    /// `truncate_at` body bytes (headers still announce the full length).
    pub truncate_responses: usize,
    pub truncate_at: usize,
    /// Answer every range request with `206 bytes 0-(len-1)/len` and the
    /// full body, whatever offset was asked for.
    pub ranges_from_zero: bool,
    /// Answer every request with this status and an empty body.
    pub fixed_status: Option<u16>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            truncate_responses: 0,
            truncate_at: 0,
            ranges_from_zero: false,
            fixed_status: None,
        }
    }
}

/// Handle to a running server. The server thread lives until the process exits.
pub struct RangeServer {
    base_url: String,
    ranges: Arc<Mutex<Vec<Option<String>>>>,
}

impl RangeServer {
    /// URL for `path` on this server (e.g. `url("ep01.mp4")`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Range header of every request so far, in arrival order (`None` = no Range).
    pub fn ranges(&self) -> Vec<Option<String>> {
        self.ranges.lock().unwrap().clone()
    }
}

pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let ranges = Arc::new(Mutex::new(Vec::new()));
    let served = Arc::new(AtomicUsize::new(0));
    let ranges_srv = Arc::clone(&ranges);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let ranges = Arc::clone(&ranges_srv);
            let served = Arc::clone(&served);
            thread::spawn(move || handle(stream, &body, opts, &ranges, &served));
        }
    });
    RangeServer {
        base_url: format!("http://127.0.0.1:{}/", port),
        ranges,
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: RangeServerOptions,
    ranges: &Mutex<Vec<Option<String>>>,
    served: &AtomicUsize,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let range_header = parse_range_header(request);
    ranges.lock().unwrap().push(range_header.clone());
    let nth = served.fetch_add(1, Ordering::SeqCst);

    if let Some(code) = opts.fixed_status {
        let response = format!("HTTP/1.1 {} Fixed\r\nContent-Length: 0\r\n\r\n", code);
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let total = body.len() as u64;
    let start = if opts.support_ranges {
        range_header.as_deref().and_then(range_start)
    } else {
        None
    };
    let (status, content_range, slice) = match start {
        Some(start) if start >= total => (
            "416 Range Not Satisfiable",
            Some(format!("bytes */{}", total)),
            &body[0..0],
        ),
        Some(_) if opts.ranges_from_zero => (
            "206 Partial Content",
            Some(format!("bytes 0-{}/{}", total - 1, total)),
            body,
        ),
        Some(start) => (
            "206 Partial Content",
            Some(format!("bytes {}-{}/{}", start, total - 1, total)),
            &body[start as usize..],
        ),
        None => ("200 OK", None, body),
    };

    let mut head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\n", status, slice.len());
    if let Some(cr) = content_range {
        head.push_str(&format!("Content-Range: {}\r\n", cr));
    }
    if opts.support_ranges {
        head.push_str("Accept-Ranges: bytes\r\n");
    }
    head.push_str("Connection: close\r\n\r\n");
    let _ = stream.write_all(head.as_bytes());

    let slice = if nth < opts.truncate_responses {
        &slice[..opts.truncate_at.min(slice.len())]
    } else {
        slice
    };
    let _ = stream.write_all(slice);
    let _ = stream.flush();
}

fn parse_range_header(request: &str) -> Option<String> {
    request
        .lines()
        .skip(1)
        .take_while(|line| !line.trim().is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("range"))
        .map(|(_, value)| value.trim().to_string())
}

/// Start offset of `bytes=N-` or `bytes=N-M`.
fn range_start(value: &str) -> Option<u64> {
    let range = value.strip_prefix("bytes=")?;
    let (start, _) = range.split_once('-')?;
    start.trim().parse().ok()
}
