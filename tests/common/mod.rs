//! Shared utilities for integration tests.
//!
//! Servers are bound on an ephemeral localhost port and spoken to over raw
//! TCP, one request per connection.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tinyserve::{Handler, Server, ServerConfig, ServerError, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// A server running in the background
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Trigger shutdown and wait for `serve` to return
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

/// Config listening on an ephemeral localhost port under `path`
pub fn local_config(path: &str) -> ServerConfig {
    ServerConfig::new([format!("http://127.0.0.1:0{path}")])
}

pub async fn start_server(config: ServerConfig, handler: impl Handler) -> TestServer {
    let server = Server::bind(&config, handler).await.expect("bind failed");
    let addr = server.local_addrs()[0];
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.serve(shutdown.clone()));
    TestServer {
        addr,
        shutdown,
        task,
    }
}

/// Parsed HTTP/1.1 response
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Send a request with extra header lines and read the full reply.
///
/// `Connection: close` is always added so the server ends the stream.
pub async fn request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
) -> RawResponse {
    let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (name, value) in headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str("\r\n");
    send_raw(addr, &raw).await
}

pub async fn get(addr: SocketAddr, path: &str) -> RawResponse {
    request(addr, "GET", path, &[]).await
}

pub async fn send_raw(addr: SocketAddr, raw: &str) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.expect("connect failed");
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("response timed out")
        .unwrap();
    parse_response(&buf)
}

fn parse_response(buf: &[u8]) -> RawResponse {
    let split = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("incomplete response head");
    let head = String::from_utf8_lossy(&buf[..split]).into_owned();
    let mut lines = head.split("\r\n");

    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .expect("bad status line");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    RawResponse {
        status,
        headers,
        body: buf[split + 4..].to_vec(),
    }
}
