//! Route table for the proxy's own service endpoints.
//!
//! # Responsibilities
//! - Store exact routes keyed by `METHOD path`
//! - Store templated routes in registration order
//! - Serve static content with ETag based conditional GET
//!
//! # Design Decisions
//! - Exact routes are tried first, then templates; the first template that
//!   matches wins, so registration order is the priority order
//! - Static content is hashed once at registration
//! - A miss is `None`; the caller falls through to the proxy pipeline

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use hyper::body::Incoming;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::http::response::{empty, full, ProxyBody};
use crate::http::ServerInfo;
use crate::routing::matcher::{is_template, route_key, RouteParams, RouteTemplate};

/// Handler of a dynamic route.
pub type Handler<S> =
    Arc<dyn Fn(S, Request<Incoming>, ServerInfo, RouteParams) -> BoxFuture<'static, Response<ProxyBody>> + Send + Sync>;

/// Content served verbatim, with a precomputed ETag.
#[derive(Debug, Clone)]
pub struct StaticContent {
    pub content_type: &'static str,
    pub content: Bytes,
    pub etag: String,
}

impl StaticContent {
    pub fn new(content_type: &'static str, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);

        Self {
            content_type,
            etag: format!("\"{:x}\"", hasher.finish()),
            content,
        }
    }
}

enum ExactRoute<S> {
    Static(StaticContent),
    Handler(Handler<S>),
}

/// Result of a successful lookup.
pub enum RouteMatch<'a, S> {
    Static(&'a StaticContent),
    Handler(&'a Handler<S>, RouteParams),
}

pub struct Router<S> {
    routes: HashMap<String, ExactRoute<S>>,
    routes_with_params: Vec<(RouteTemplate, Handler<S>)>,
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            routes_with_params: Vec::new(),
        }
    }
}

impl<S> Router<S>
where
    S: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<F, Fut>(&mut self, path: &str, handler: F) -> Result<(), regex::Error>
    where
        F: Fn(S, Request<Incoming>, ServerInfo, RouteParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<ProxyBody>> + Send + 'static,
    {
        self.add(Method::GET, path, handler)
    }

    pub fn post<F, Fut>(&mut self, path: &str, handler: F) -> Result<(), regex::Error>
    where
        F: Fn(S, Request<Incoming>, ServerInfo, RouteParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<ProxyBody>> + Send + 'static,
    {
        self.add(Method::POST, path, handler)
    }

    pub fn get_static(&mut self, path: &str, content: StaticContent) {
        self.routes
            .insert(route_key(&Method::GET, path), ExactRoute::Static(content));
    }

    pub fn add<F, Fut>(&mut self, method: Method, path: &str, handler: F) -> Result<(), regex::Error>
    where
        F: Fn(S, Request<Incoming>, ServerInfo, RouteParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response<ProxyBody>> + Send + 'static,
    {
        let handler: Handler<S> = Arc::new(move |state, req, server, params| {
            Box::pin(handler(state, req, server, params)) as BoxFuture<'static, _>
        });

        if is_template(path) {
            let template = RouteTemplate::compile(&method, path)?;
            self.routes_with_params.push((template, handler));
        } else {
            self.routes
                .insert(route_key(&method, path), ExactRoute::Handler(handler));
        }
        Ok(())
    }

    /// Look up `method path`. Exact routes win over templates.
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, S>> {
        if let Some(route) = self.routes.get(&route_key(method, path)) {
            return Some(match route {
                ExactRoute::Static(content) => RouteMatch::Static(content),
                ExactRoute::Handler(handler) => RouteMatch::Handler(handler, RouteParams::new()),
            });
        }

        self.routes_with_params
            .iter()
            .find_map(|(template, handler)| {
                template
                    .matches(method, path)
                    .map(|params| RouteMatch::Handler(handler, params))
            })
    }
}

/// Serve static content, answering 304 when the client already has it.
pub fn respond_static(req_headers: &HeaderMap, content: &StaticContent) -> Response<ProxyBody> {
    let not_modified = req_headers
        .get(header::IF_NONE_MATCH)
        .is_some_and(|etag| etag.as_bytes() == content.etag.as_bytes());

    if not_modified {
        let mut res = Response::new(empty());
        *res.status_mut() = StatusCode::NOT_MODIFIED;
        return res;
    }

    let mut res = Response::new(full(content.content.clone()));
    let headers = res.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("max-age=30, must-revalidate"),
    );
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content.content_type));
    if let Ok(etag) = HeaderValue::from_str(&content.etag) {
        headers.insert(header::ETAG, etag);
    }
    res
}
