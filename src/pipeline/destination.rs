//! Outbound request to the destination server.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, Request, Response, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use crate::pipeline::error::{ErrorCode, PipelineError};
use crate::session::Credentials;

pub type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Pooled HTTP/HTTPS client shared by every pipeline run.
pub fn build_client() -> HttpClient {
    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();

    Client::builder(TokioExecutor::new()).build(https)
}

/// Everything needed to issue one destination request.
#[derive(Debug, Clone)]
pub struct DestinationRequest {
    pub url: String,
    pub protocol: String,
    pub hostname: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub credentials: Option<Credentials>,
    pub body: Bytes,
}

impl DestinationRequest {
    /// Send the request and wait for the response headers.
    ///
    /// Every failure before the headers arrive is fatal and carries the
    /// destination URL. `timeout` bounds name resolution, connection and
    /// the wait for headers together.
    pub async fn send(self, client: &HttpClient, timeout: Duration) -> Result<Response<Incoming>, PipelineError> {
        let dest_url = self.url.clone();

        match tokio::time::timeout(timeout, self.perform(client)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::destination(ErrorCode::OriginServerRequestTimeout, dest_url)),
        }
    }

    async fn perform(self, client: &HttpClient) -> Result<Response<Incoming>, PipelineError> {
        let fatal = |code| PipelineError::destination(code, self.url.clone());

        // Resolve first so DNS failures get their own code.
        let hostname = self.hostname.trim_start_matches('[').trim_end_matches(']');
        let resolved = tokio::net::lookup_host((hostname, self.port))
            .await
            .map(|mut addrs| addrs.next().is_some())
            .unwrap_or(false);
        if !resolved {
            return Err(fatal(ErrorCode::CantResolveOriginUrl));
        }

        let path = if self.path.is_empty() { "/" } else { self.path.as_str() };
        let uri: Uri = format!("{}//{}{}", self.protocol, self.host, path)
            .parse()
            .map_err(|_| fatal(ErrorCode::CantResolveOriginUrl))?;

        let mut req = Request::builder()
            .method(self.method.clone())
            .uri(uri)
            .body(Full::new(self.body.clone()))
            .map_err(|_| fatal(ErrorCode::CantResolveOriginUrl))?;

        *req.headers_mut() = self.headers.clone();
        if let Some(credentials) = &self.credentials {
            let token = STANDARD.encode(format!("{}:{}", credentials.username, credentials.password));
            if let Ok(value) = HeaderValue::from_str(&format!("Basic {}", token)) {
                req.headers_mut().insert(header::AUTHORIZATION, value);
            }
        }

        client.request(req).await.map_err(|e| {
            let code = if e.is_connect() {
                ErrorCode::OriginServerConnectionFailed
            } else {
                ErrorCode::OriginServerConnectionTerminated
            };
            tracing::debug!(dest_url = %self.url, error = %e, code = %code, "Destination request failed");
            fatal(code)
        })
    }
}
