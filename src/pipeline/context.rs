//! Per-request pipeline state.

use bytes::Bytes;
use http::request::Parts;
use http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use std::sync::Arc;

use crate::http::response::{empty, full, ProxyBody};
use crate::http::service::{IFRAME_TASK_SCRIPT_PATH, TASK_SCRIPT_PATH};
use crate::http::ServerInfo;
use crate::processing::content;
use crate::proxy_url::{get_proxy_url, parse_proxy_url, Destination, ParsedProxyUrl, ResourceType};
use crate::session::{Session, SessionRegistry};

/// Header the client runtime adds to every XHR it sends.
pub const XHR_REQUEST_MARKER_HEADER: &str = "x-tc-xm-cd46977f";
/// Marker bit: the XHR is allowed to go cross origin.
pub const XHR_CORS_SUPPORTED_FLAG: u32 = 0x10;
/// Marker bit: the XHR has `withCredentials` set.
pub const XHR_WITH_CREDENTIALS_FLAG: u32 = 0x01;

/// How the destination response is to be treated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentInfo {
    pub encoding: Option<String>,
    pub charset: &'static str,
    pub require_processing: bool,
    pub is_iframe_with_image_src: bool,
    pub is_css: bool,
    pub is_script: bool,
    pub is_manifest: bool,
    pub is_json: bool,
    /// Resource type to tag proxy URLs generated while rewriting this body.
    pub content_type_url_token: ResourceType,
}

/// State of one proxied request, from dispatch to the final response.
pub struct PipelineContext {
    pub server_info: ServerInfo,
    pub session: Arc<dyn Session>,

    pub req: Parts,
    pub req_body: Bytes,

    pub dest: Destination,
    pub dest_status: StatusCode,
    pub dest_headers: HeaderMap,
    pub dest_trailers: Option<HeaderMap>,
    pub dest_res_body: Bytes,
    /// Set when the destination connection failed after response headers arrived.
    pub has_dest_req_err: bool,

    pub is_xhr: bool,
    /// Flags carried by the XHR marker header, 0 when absent.
    pub xhr_flags: u32,
    pub is_page: bool,
    pub is_iframe: bool,
    pub content_info: ContentInfo,
}

impl PipelineContext {
    /// Resolve the destination and the owning session of a request.
    ///
    /// `None` means the request cannot be proxied (malformed proxy URL
    /// without a usable referer, or an unknown session) and must be
    /// answered with 404.
    pub fn dispatch(req: Parts, server_info: ServerInfo, sessions: &SessionRegistry) -> Option<Self> {
        let req_url = req.uri.to_string();
        let parsed_referer = req
            .headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_proxy_url);

        let parsed = match parse_proxy_url(&req_url) {
            Some(parsed) => parsed,
            None => {
                let referer = parsed_referer.as_ref()?;
                dest_from_referer(referer, &path_and_query(&req))
            }
        };

        let session = sessions.get(&parsed.session_id)?;

        let mut dest = parsed.dest;
        if let Some(referer) = &parsed_referer {
            dest.referer = Some(referer.dest.url.clone());
            dest.req_origin = Some(referer.dest.domain.clone());
        }

        let marker = req
            .headers
            .get(XHR_REQUEST_MARKER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let is_xhr = marker.is_some();
        let xhr_flags = marker.and_then(|v| v.parse().ok()).unwrap_or(0);

        let is_page = !is_xhr
            && req
                .headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .is_some_and(content::is_page);
        let is_iframe = dest.resource_type == ResourceType::Iframe;

        Some(Self {
            server_info,
            session,
            req,
            req_body: Bytes::new(),
            dest,
            dest_status: StatusCode::OK,
            dest_headers: HeaderMap::new(),
            dest_trailers: None,
            dest_res_body: Bytes::new(),
            has_dest_req_err: false,
            is_xhr,
            xhr_flags,
            is_page,
            is_iframe,
            content_info: ContentInfo::default(),
        })
    }

    /// Classify the destination response. Requires `dest_headers`.
    pub fn build_content_info(&mut self) {
        let content_type = header_str(&self.dest_headers, header::CONTENT_TYPE);
        let accept = header_str(&self.req.headers, header::ACCEPT);

        let is_css = content::is_css_resource(content_type, accept);
        let is_manifest = content::is_manifest(content_type);
        let is_json = content::is_json(content_type);
        let is_script =
            self.dest.resource_type == ResourceType::Script || content::is_script_resource(content_type, accept);

        let require_processing =
            !self.is_xhr && (self.is_page || self.is_iframe || is_css || is_script || is_manifest || is_json);

        let is_iframe_with_image_src =
            self.is_iframe && !self.is_page && content_type.trim_start().to_ascii_lowercase().starts_with("image/");

        if self.is_file_download() {
            self.session.handle_file_download();
        }

        let content_type_url_token = if is_script {
            ResourceType::Script
        } else if self.is_iframe {
            ResourceType::Iframe
        } else {
            ResourceType::None
        };

        self.content_info = ContentInfo {
            encoding: self
                .dest_headers
                .get(header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            charset: content::parse_charset(content_type),
            require_processing,
            is_iframe_with_image_src,
            is_css,
            is_script,
            is_manifest,
            is_json,
            content_type_url_token,
        };
    }

    fn is_file_download(&self) -> bool {
        let disposition = header_str(&self.dest_headers, header::CONTENT_DISPOSITION);
        disposition.contains("attachment") && disposition.contains("filename")
    }

    /// Session scripts plus the task script, as URLs on this listener.
    pub fn get_injectable_scripts(&self) -> Vec<String> {
        let task_script = if self.is_iframe {
            IFRAME_TASK_SCRIPT_PATH
        } else {
            TASK_SCRIPT_PATH
        };

        let mut scripts = self.session.injectable().scripts;
        scripts.push(task_script.to_string());
        self.on_server_domain(scripts)
    }

    pub fn get_injectable_styles(&self) -> Vec<String> {
        self.on_server_domain(self.session.injectable().styles)
    }

    fn on_server_domain(&self, paths: Vec<String>) -> Vec<String> {
        paths
            .into_iter()
            .map(|path| format!("{}{}", self.server_info.domain, path))
            .collect()
    }

    /// Proxy URL for `url` in this request's session.
    pub fn to_proxy_url(&self, url: &str, is_cross_domain: bool, resource_type: ResourceType) -> String {
        let port = if is_cross_domain {
            self.server_info.cross_domain_port
        } else {
            self.server_info.port
        };

        get_proxy_url(url, &self.server_info.hostname, port, self.session.id(), resource_type)
    }

    /// Terminal response with `status` and an optional `text/html` body.
    pub fn close_with_error(&self, status: StatusCode, body: Option<&str>) -> Response<ProxyBody> {
        let mut res = match body {
            Some(body) => {
                let mut res = Response::new(full(body.to_string()));
                res.headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
                res
            }
            None => Response::new(empty()),
        };
        *res.status_mut() = status;
        res
    }
}

// Browsers may send a default port in the referer; destinations derived
// from it drop the port so host based matching on the origin still works.
fn dest_from_referer(referer: &ParsedProxyUrl, path: &str) -> ParsedProxyUrl {
    let dest = referer.dest.with_path(path);

    ParsedProxyUrl {
        dest_url: dest.url.clone(),
        session_id: referer.session_id.clone(),
        resource_type: ResourceType::None,
        dest,
    }
}

fn path_and_query(req: &Parts) -> String {
    req.uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string())
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> &str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}
