//! Service endpoints served by both listeners next to the proxy pipeline.

use http::{header, HeaderValue, Request, Response};
use hyper::body::Incoming;
use serde_json::Value;
use std::sync::Arc;

use crate::http::request::{fetch_body, query_param};
use crate::http::response::{add_prevent_caching_headers, full, respond_500, respond_with_json, ProxyBody};
use crate::http::ServerInfo;
use crate::proxy_url::parse_proxy_url;
use crate::routing::{RouteParams, Router};
use crate::session::{ServiceMessage, SessionError, SessionRegistry};
use crate::upload::read_file_for_shim;

pub const MESSAGING_PATH: &str = "/messaging";
pub const TASK_SCRIPT_PATH: &str = "/task.js";
pub const IFRAME_TASK_SCRIPT_PATH: &str = "/iframe-task.js";
pub const IE9_FILE_READER_SHIM_PATH: &str = "/ie9-file-reader-shim";

/// State handed to every service handler.
#[derive(Debug, Clone)]
pub struct ServiceState {
    pub sessions: SessionRegistry,
    pub max_body_size: usize,
}

/// Register the dynamic service routes.
pub fn register(router: &mut Router<Arc<ServiceState>>) -> Result<(), regex::Error> {
    router.post(IE9_FILE_READER_SHIM_PATH, ie9_file_reader_shim)?;
    router.post(MESSAGING_PATH, messaging)?;
    router.get(TASK_SCRIPT_PATH, |state, req, server, _| task_script(state, req, server, false))?;
    router.get(IFRAME_TASK_SCRIPT_PATH, |state, req, server, _| task_script(state, req, server, true))?;
    Ok(())
}

/// `POST /messaging`: dispatch a `{cmd, jobUid, ...}` message to its session.
pub async fn messaging(
    state: Arc<ServiceState>,
    req: Request<Incoming>,
    server: ServerInfo,
    _params: RouteParams,
) -> Response<ProxyBody> {
    let body = match fetch_body(req.into_body(), state.max_body_size).await {
        Ok(body) => body,
        Err(e) => return respond_500(Some(&e.to_string())),
    };

    // Malformed JSON is indistinguishable from an unknown session.
    let found = ServiceMessage::parse(&body)
        .and_then(|msg| state.sessions.get(&msg.job_uid).map(|session| (session, msg)));
    let Some((session, msg)) = found else {
        return respond_500(Some(&SessionError::NotOpened.to_string()));
    };

    let result = match msg.command() {
        Ok(cmd) => session.handle_service_message(cmd, &server).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(Value::Null) => respond_with_json(&""),
        Ok(value) => respond_with_json(&value),
        Err(e) => {
            tracing::debug!(session_id = %session.id(), error = %e, "Service message failed");
            respond_500(Some(&e.to_string()))
        }
    }
}

/// `GET /task.js` and `GET /iframe-task.js`: the task script of the session
/// the referring page belongs to.
pub async fn task_script(
    state: Arc<ServiceState>,
    req: Request<Incoming>,
    server: ServerInfo,
    is_iframe: bool,
) -> Response<ProxyBody> {
    let Some(referer) = req
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
    else {
        return respond_500(None);
    };

    let Some(parsed) = parse_proxy_url(referer) else {
        return respond_500(None);
    };
    let Some(session) = state.sessions.get(&parsed.session_id) else {
        return respond_500(None);
    };

    let script = session.task_script(referer, &parsed.dest_url, &server, is_iframe, true);

    let mut res = Response::new(full(script));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-javascript"),
    );
    add_prevent_caching_headers(&mut res);
    res
}

/// `POST /ie9-file-reader-shim`: return one uploaded file as base64 JSON.
///
/// The answer is served as `text/html` because it lands in a hidden iframe.
pub async fn ie9_file_reader_shim(
    state: Arc<ServiceState>,
    req: Request<Incoming>,
    _server: ServerInfo,
    _params: RouteParams,
) -> Response<ProxyBody> {
    let (parts, body) = req.into_parts();
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let input_name = query_param(&parts.uri, "input-name");
    let file_name = query_param(&parts.uri, "filename");

    let body = match fetch_body(body, state.max_body_size).await {
        Ok(body) => body,
        Err(e) => return respond_500(Some(&e.to_string())),
    };

    let Some(file) = read_file_for_shim(&content_type, &body, input_name.as_deref(), file_name.as_deref()) else {
        return respond_500(None);
    };

    match serde_json::to_vec(&file) {
        Ok(json) => {
            let mut res = Response::new(full(json));
            res.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
            res
        }
        Err(e) => respond_500(Some(&e.to_string())),
    }
}
