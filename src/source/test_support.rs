//! One-shot loopback HTTP responder for exercising the sources' request
//! code without the network.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use reqwest::StatusCode;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// `GET /path?query HTTP/1.1`
    pub line: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn target(&self) -> &str {
        self.line.split(' ').nth(1).unwrap_or_default()
    }
}

/// Answers one connection per canned `(status, body)` pair, in order, then
/// stops accepting.
pub struct TestServer {
    base_url: String,
    requests: Receiver<RecordedRequest>,
}

impl TestServer {
    pub fn start(responses: Vec<(u16, String)>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let (tx, rx) = unbounded();
        thread::Builder::new()
            .name("test-http".to_string())
            .spawn(move || {
                for (status, body) in responses {
                    let Ok((stream, _)) = listener.accept() else {
                        return;
                    };
                    if respond(stream, status, &body, &tx).is_err() {
                        return;
                    }
                }
            })?;
        Ok(Self {
            base_url,
            requests: rx,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests answered so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.try_iter().collect()
    }
}

/// A loopback URL nothing listens on.
pub fn unreachable_url() -> io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

fn respond(
    stream: TcpStream,
    status: u16,
    body: &str,
    recorded: &Sender<RecordedRequest>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    let mut headers = Vec::new();
    loop {
        let mut raw = String::new();
        if reader.read_line(&mut raw)? == 0 {
            break;
        }
        let raw = raw.trim_end();
        if raw.is_empty() {
            break;
        }
        if let Some((key, value)) = raw.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    let length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut request_body = vec![0; length];
    reader.read_exact(&mut request_body)?;

    let _ = recorded.send(RecordedRequest {
        line: line.trim_end().to_string(),
        headers,
        body: String::from_utf8_lossy(&request_body).into_owned(),
    });

    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown");
    let mut stream = reader.into_inner();
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )?;
    stream.flush()
}
