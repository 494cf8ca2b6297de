//! Listener pair and per-connection HTTP serving.
//!
//! # Responsibilities
//! - Bind both listeners and describe them as [`ServerInfo`]
//! - Build the service route table and the shared pipeline
//! - Serve each connection through the request-id and trace layers
//! - Classify connection errors at the call site
//! - Stop both listeners together and drain in-flight connections

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::response::{respond_404, BoxError, ProxyBody};
use crate::http::service::{self, ServiceState};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{classify, ConnectionAbort, ConnectionOutcome, ConnectionPermit, ConnectionTracker, Listener};
use crate::observability::metrics;
use crate::pipeline::{build_client, Pipeline};
use crate::processing::injector::CLIENT_SCRIPT_PATH;
use crate::processing::{ContentProcessor, ResourceInjector};
use crate::proxy_url::{convert_host_to_lower_case, get_proxy_url, ResourceType};
use crate::routing::{respond_static, RouteMatch, Router, StaticContent};
use crate::session::{Session, SessionRegistry};

const BUNDLED_CLIENT_SCRIPT: &str = include_str!("../../assets/hammerhead.js");

/// Describes one listener to sessions, processors and proxy URL builders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub hostname: String,
    pub port: u16,
    pub cross_domain_port: u16,
    /// `http://{hostname}:{port}`
    pub domain: String,
}

impl ServerInfo {
    pub fn new(hostname: impl Into<String>, port: u16, cross_domain_port: u16) -> Self {
        let hostname = hostname.into();
        Self {
            domain: format!("http://{}:{}", hostname, port),
            hostname,
            port,
            cross_domain_port,
        }
    }
}

/// Everything a connection needs, shared by both listeners.
struct Shared {
    router: Router<Arc<ServiceState>>,
    services: Arc<ServiceState>,
    pipeline: Pipeline,
}

/// A running listener pair.
pub struct Proxy {
    server1: ServerInfo,
    server2: ServerInfo,
    sessions: SessionRegistry,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    accept_tasks: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl Proxy {
    /// Start both listeners with the default resource injector.
    pub async fn start(config: &ProxyConfig) -> Result<Self, ProxyError> {
        Self::start_with_processor(config, Arc::new(ResourceInjector::new())).await
    }

    /// Start both listeners with a custom content processor.
    pub async fn start_with_processor(
        config: &ProxyConfig,
        processor: Arc<dyn ContentProcessor>,
    ) -> Result<Self, ProxyError> {
        let listener_config = &config.listener;
        let listener1 = Listener::bind(&listener_config.hostname, listener_config.port1, listener_config.max_connections).await?;
        let listener2 = Listener::bind(&listener_config.hostname, listener_config.port2, listener_config.max_connections).await?;

        let server1 = ServerInfo::new(listener_config.hostname.clone(), listener1.port(), listener2.port());
        let server2 = ServerInfo::new(listener_config.hostname.clone(), listener2.port(), listener1.port());

        let client_script: Bytes = match &config.client.script_path {
            Some(path) => tokio::fs::read(path)
                .await
                .map_err(|source| ProxyError::ClientScript {
                    path: path.clone(),
                    source,
                })?
                .into(),
            None => Bytes::from_static(BUNDLED_CLIENT_SCRIPT.as_bytes()),
        };

        let sessions = SessionRegistry::new();
        let services = Arc::new(ServiceState {
            sessions: sessions.clone(),
            max_body_size: config.limits.max_body_size,
        });

        let mut router = Router::new();
        router.get_static(CLIENT_SCRIPT_PATH, StaticContent::new("application/x-javascript", client_script));
        service::register(&mut router)?;

        let shared = Arc::new(Shared {
            router,
            services,
            pipeline: Pipeline {
                sessions: sessions.clone(),
                client: build_client(),
                processor,
                destination_timeout: config.timeouts.destination_request(),
                max_body_size: config.limits.max_body_size,
            },
        });

        let shutdown = Shutdown::new();
        let tracker = ConnectionTracker::new();
        let accept_tasks = [(listener1, server1.clone()), (listener2, server2.clone())]
            .into_iter()
            .map(|(listener, server)| {
                let accept = accept_loop(
                    listener,
                    server,
                    Arc::clone(&shared),
                    shutdown.clone(),
                    tracker.clone(),
                );
                tokio::spawn(accept)
            })
            .collect();

        tracing::info!(
            hostname = %server1.hostname,
            port1 = server1.port,
            port2 = server2.port,
            "Proxy started"
        );

        Ok(Self {
            server1,
            server2,
            sessions,
            shutdown,
            tracker,
            accept_tasks,
            drain_timeout: config.timeouts.drain(),
        })
    }

    /// Register `session` and return the proxy URL of `url` on the primary
    /// listener.
    pub fn open_session(&self, url: &str, session: Arc<dyn Session>) -> String {
        let session_id = session.id().to_string();
        self.sessions.insert(session);

        get_proxy_url(
            &convert_host_to_lower_case(url),
            &self.server1.hostname,
            self.server1.port,
            &session_id,
            ResourceType::None,
        )
    }

    pub fn close_session(&self, session_id: &str) -> Option<Arc<dyn Session>> {
        self.sessions.remove(session_id)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// The primary listener.
    pub fn server1(&self) -> &ServerInfo {
        &self.server1
    }

    /// The cross-domain listener.
    pub fn server2(&self) -> &ServerInfo {
        &self.server2
    }

    /// Stop accepting on both listeners, then wait (bounded by the drain
    /// timeout) for open connections to finish.
    pub async fn close(self) {
        self.shutdown.trigger();

        for task in self.accept_tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Accept loop panicked");
            }
        }

        if !self.tracker.wait_for_drain(self.drain_timeout).await {
            tracing::warn!(
                active_connections = self.tracker.active_count(),
                "Drain timeout elapsed, closing with connections open"
            );
        }

        tracing::info!("Proxy closed");
    }
}

async fn accept_loop(
    listener: Listener,
    server: ServerInfo,
    shared: Arc<Shared>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
) {
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = stop.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr, permit)) => {
                    let conn = serve_connection(
                        stream,
                        peer_addr,
                        permit,
                        server.clone(),
                        Arc::clone(&shared),
                        shutdown.subscribe(),
                        tracker.clone(),
                    );
                    tokio::spawn(conn);
                }
                Err(e) => {
                    tracing::error!(port = server.port, error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
        }
    }

    tracing::debug!(port = server.port, "Accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    _permit: ConnectionPermit,
    server: ServerInfo,
    shared: Arc<Shared>,
    mut stop: broadcast::Receiver<()>,
    tracker: ConnectionTracker,
) {
    let guard = tracker.track();

    let svc = tower::service_fn(
        move |req: Request<Incoming>| -> BoxFuture<'static, Result<Response<ProxyBody>, ConnectionAbort>> {
            Box::pin(handle(Arc::clone(&shared), server.clone(), req))
        },
    );
    let svc = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::DEBUG)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .service(svc);
    let svc = tower::util::BoxCloneService::new(svc.map_response(box_response_body));

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), TowerToHyperService::new(svc));
    tokio::pin!(conn);

    let mut draining = false;
    let result = loop {
        tokio::select! {
            res = conn.as_mut() => break res,
            _ = stop.recv(), if !draining => {
                conn.as_mut().graceful_shutdown();
                draining = true;
            }
        }
    };

    if let Err(e) = result {
        match classify(&e) {
            ConnectionOutcome::PeerReset => {
                tracing::trace!(connection_id = %guard.id(), %peer_addr, error = %e, "Peer went away");
            }
            ConnectionOutcome::Aborted => {
                tracing::debug!(connection_id = %guard.id(), %peer_addr, "Connection dropped without a response");
            }
            ConnectionOutcome::Unexpected => {
                metrics::record_connection_error("unexpected");
                tracing::error!(connection_id = %guard.id(), %peer_addr, error = %e, "Connection error");
            }
        }
    }
}

fn box_response_body<B>(res: Response<B>) -> Response<ProxyBody>
where
    B: hyper::body::Body<Data = Bytes, Error = BoxError> + Send + 'static,
{
    res.map(ProxyBody::new)
}

async fn handle(
    shared: Arc<Shared>,
    server: ServerInfo,
    req: Request<Incoming>,
) -> Result<Response<ProxyBody>, ConnectionAbort> {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if path == "/favicon.ico" {
        metrics::record_request("not_found", start);
        return Ok(respond_404());
    }

    let route = match shared.router.route(&method, &path) {
        Some(RouteMatch::Static(content)) => {
            metrics::record_request("service", start);
            return Ok(respond_static(req.headers(), content));
        }
        Some(RouteMatch::Handler(handler, params)) => Some((Arc::clone(handler), params)),
        None => None,
    };

    match route {
        Some((handler, params)) => {
            let res = handler(Arc::clone(&shared.services), req, server, params).await;
            metrics::record_request("service", start);
            Ok(res)
        }
        None => shared.pipeline.run(req, server).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_info_domain() {
        let info = ServerInfo::new("localhost", 1836, 1837);
        assert_eq!(info.domain, "http://localhost:1836");
        assert_eq!(info.cross_domain_port, 1837);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["crossDomainPort"], 1837);
    }

    fn ephemeral_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listener.port1 = 0;
        config.listener.port2 = 0;
        config.timeouts.drain_ms = 500;
        config
    }

    #[tokio::test]
    async fn test_listener_pair_cross_ports() {
        let proxy = Proxy::start(&ephemeral_config()).await.unwrap();
        assert_ne!(proxy.server1().port, proxy.server2().port);
        assert_eq!(proxy.server1().cross_domain_port, proxy.server2().port);
        assert_eq!(proxy.server2().cross_domain_port, proxy.server1().port);
        proxy.close().await;
    }

    #[tokio::test]
    async fn test_open_session_url() {
        let proxy = Proxy::start(&ephemeral_config()).await.unwrap();
        let session = Arc::new(crate::session::BasicSession::new("sid"));

        let url = proxy.open_session("HTTP://Example.COM/Path?Q=1", session);
        assert_eq!(
            url,
            format!("http://127.0.0.1:{}/sid/http://example.com/Path?Q=1", proxy.server1().port)
        );
        assert!(proxy.sessions().get("sid").is_some());

        assert!(proxy.close_session("sid").is_some());
        assert!(proxy.sessions().get("sid").is_none());
        proxy.close().await;
    }

    #[tokio::test]
    async fn test_close_releases_ports() {
        let proxy = Proxy::start(&ephemeral_config()).await.unwrap();
        let port = proxy.server1().port;
        proxy.close().await;

        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }
}
