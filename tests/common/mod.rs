//! Shared utilities for integration testing.
//!
//! Origins are raw TCP servers so tests control every byte on the wire,
//! including truncated bodies and connections that never answer.

#![allow(dead_code)]

use harness_proxy::{BasicSession, Proxy, ProxyConfig, Session};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as received by a test origin.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: String,
    pub path: String,
    /// Lowercased names, in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Build a complete `Connection: close` response with a Content-Length.
pub fn response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {}\r\n", status);
    for (name, value) in headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", body.len()));

    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

async fn read_request(socket: &mut TcpStream) -> Option<RawRequest> {
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

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
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

    Some(RawRequest {
        method,
        path,
        headers,
        body,
    })
}

/// Start an origin that answers every request with the raw bytes returned
/// by `f`, then closes the connection.
pub async fn start_origin<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(RawRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<u8>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = Arc::clone(&f);
            tokio::spawn(async move {
                let Some(req) = read_request(&mut socket).await else {
                    return;
                };
                let bytes = f(req).await;
                let _ = socket.write_all(&bytes).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Origin answering every request with a fixed response.
pub async fn start_static_origin(status: &'static str, headers: &'static [(&'static str, &'static str)], body: &'static [u8]) -> SocketAddr {
    start_origin(move |_| async move { response(status, headers, body) }).await
}

/// Origin that accepts connections and never answers.
pub async fn start_silent_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// Origin that writes `head` after reading the request, then keeps the
/// connection open without sending anything else.
pub async fn start_stalling_origin(head: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request(&mut socket).await.is_some() {
                    let _ = socket.write_all(head).await;
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(socket);
            });
        }
    });

    addr
}

pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.port1 = 0;
    config.listener.port2 = 0;
    config.timeouts.destination_request_ms = 2_000;
    config.timeouts.drain_ms = 500;
    config
}

pub async fn start_proxy() -> Proxy {
    start_proxy_with(test_config()).await
}

pub async fn start_proxy_with(config: ProxyConfig) -> Proxy {
    Proxy::start(&config).await.unwrap()
}

/// Open a [`BasicSession`] named `sid` and return it with the proxy URL of
/// `url`.
pub fn open_session(proxy: &Proxy, url: &str) -> (Arc<BasicSession>, String) {
    open_custom_session(proxy, url, BasicSession::new("sid"))
}

pub fn open_custom_session(proxy: &Proxy, url: &str, session: BasicSession) -> (Arc<BasicSession>, String) {
    let session = Arc::new(session);
    let shared: Arc<dyn Session> = session.clone();
    let proxy_url = proxy.open_session(url, shared);
    (session, proxy_url)
}

/// Proxy URL of `url` in session `sid` on the primary listener.
pub fn proxy_url(proxy: &Proxy, url: &str) -> String {
    format!("http://127.0.0.1:{}/sid/{}", proxy.server1().port, url)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
