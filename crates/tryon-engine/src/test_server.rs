//! One-connection-per-response HTTP server for exercising the real transports.
//!
//! Each canned response answers exactly one request, in order. Once the
//! script runs out the listener is dropped and further connects are refused.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub(crate) struct Canned {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Canned {
    pub(crate) fn new(status: u16, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub(crate) fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, "application/json", body.to_string())
    }
}

pub(crate) struct TestServer {
    base_url: String,
    paths: Arc<Mutex<Vec<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub(crate) fn serve(script: Vec<Canned>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let paths = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&paths);
        let handle = thread::spawn(move || {
            for canned in script {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                if answer(stream, &canned, &seen).is_err() {
                    return;
                }
            }
        });
        Ok(Self {
            base_url,
            paths,
            handle: Some(handle),
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request paths in arrival order.
    pub(crate) fn paths(&self) -> Vec<String> {
        self.paths.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub(crate) fn hits(&self) -> usize {
        self.paths().len()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // An unused script would block in accept(); only join a finished thread.
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

fn answer(mut stream: TcpStream, canned: &Canned, seen: &Mutex<Vec<String>>) -> io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let head = read_request(&mut stream)?;
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    if let Ok(mut rows) = seen.lock() {
        rows.push(path);
    }
    let header = format!(
        "HTTP/1.1 {} Canned\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        canned.status,
        canned.content_type,
        canned.body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&canned.body)?;
    stream.flush()
}

/// Reads the head plus a `Content-Length` body so the client never sees a reset.
fn read_request(stream: &mut TcpStream) -> io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            return Ok(String::from_utf8_lossy(&buf).to_string());
        }
        buf.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body_read = buf.len() - head_end;
    while body_read < content_length {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        body_read += read;
    }
    Ok(head)
}
