//! Shared utilities for integration tests.
//!
//! Mock upstreams are raw TCP listeners on ephemeral ports that speak just
//! enough HTTP/1.1 for one request per connection.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use resilient_gateway::config::GatewayConfig;

/// A request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub received_at: Instant,
}

impl MockRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Scripted response of the mock upstream.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay: Duration,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::status(status)
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body(body.to_string())
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::status(status)
            .with_header("Content-Type", "text/plain")
            .with_body(body.to_string())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = body;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Handle to a running mock upstream.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<MockRequest>>>,
    calls: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests whose head was fully received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a mock upstream that always answers with `response`.
pub async fn start_mock_upstream(response: MockResponse) -> MockUpstream {
    start_programmable_upstream(move |_| {
        let response = response.clone();
        async move { response }
    })
    .await
}

/// Start a mock upstream whose answer is computed per request.
pub async fn start_programmable_upstream<F, Fut>(handler: F) -> MockUpstream
where
    F: Fn(MockRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = MockUpstream {
        addr: listener.local_addr().unwrap(),
        requests: Arc::new(Mutex::new(Vec::new())),
        calls: Arc::new(AtomicUsize::new(0)),
    };

    let handler = Arc::new(handler);
    let shared = upstream.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handler = handler.clone();
            let shared = shared.clone();
            tokio::spawn(async move {
                serve_one(socket, shared, handler).await;
            });
        }
    });

    upstream
}

async fn serve_one<F, Fut>(mut socket: TcpStream, upstream: MockUpstream, handler: Arc<F>)
where
    F: Fn(MockRequest) -> Fut,
    Fut: Future<Output = MockResponse>,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    upstream.calls.fetch_add(1, Ordering::SeqCst);
    upstream.requests.lock().unwrap().push(request.clone());

    let response = handler(request).await;
    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let reason = reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, reason);
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("X-Upstream-Internal: leaked\r\n");
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        response.body.len()
    ));

    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(response.body.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<MockRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };
    let received_at = Instant::now();

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(MockRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
        received_at,
    })
}

/// Gateway config pointed at `upstream`, fast retries, in-memory limiter.
pub fn gateway_config(upstream: &MockUpstream) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.server.bind_address = "127.0.0.1:0".into();
    config.upstream.base_url = upstream.base_url();
    config.upstream.timeout_ms = 500;
    config.retries.base_delay_ms = 20;
    config.retries.jitter_ms = Some(0);
    config.rate_limit.store = resilient_gateway::config::StoreKind::Memory;
    config
}

/// Start the gateway on an ephemeral port. Returns its base URL and the
/// shutdown handle.
pub async fn start_gateway(config: GatewayConfig) -> (String, resilient_gateway::Shutdown) {
    let server = resilient_gateway::HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = resilient_gateway::Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (format!("http://{addr}"), shutdown)
}
