//! In-memory session used by the CLI and by harnesses that need no custom hooks.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use http::{header, HeaderValue, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::http::response::{full, ProxyBody};
use crate::http::ServerInfo;
use crate::pipeline::{PipelineContext, PipelineError};
use crate::proxy_url::{parse_proxy_url, Destination};
use crate::session::{Credentials, Injectable, ServiceCommand, Session, SessionError};

/// A session keeping cookies and uploaded files in memory.
#[derive(Debug, Default)]
pub struct BasicSession {
    id: String,
    credentials: Option<Credentials>,
    injectable: Injectable,
    payload_script: String,
    /// hostname → cookies in insertion order
    cookies: DashMap<String, Vec<(String, String)>>,
    uploads: DashMap<String, Vec<u8>>,
    downloads: AtomicUsize,
    page_errors: Mutex<Vec<String>>,
}

impl BasicSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_injectable(mut self, scripts: Vec<String>, styles: Vec<String>) -> Self {
        self.injectable = Injectable { scripts, styles };
        self
    }

    /// Script appended to the task script when a payload is requested.
    pub fn with_payload_script(mut self, script: impl Into<String>) -> Self {
        self.payload_script = script.into();
        self
    }

    pub fn file_download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Error descriptions handed to [`Session::handle_page_error`] so far.
    pub fn page_errors(&self) -> Vec<String> {
        self.page_errors
            .lock()
            .map(|errors| errors.clone())
            .unwrap_or_default()
    }

    fn set_cookie(&self, dest: &Destination, set_cookie: &str) {
        let mut parts = set_cookie.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let (name, value) = (name.trim().to_string(), value.trim().to_string());
        if name.is_empty() {
            return;
        }

        let expired = parts.any(|attr| {
            attr.split_once('=').is_some_and(|(key, value)| {
                key.trim().eq_ignore_ascii_case("max-age") && value.trim().parse::<i64>().is_ok_and(|age| age <= 0)
            })
        });

        let mut jar = self.cookies.entry(dest.hostname.to_ascii_lowercase()).or_default();
        jar.retain(|(existing, _)| *existing != name);
        if !expired {
            jar.push((name, value));
        }
    }

    fn upload_files(&self, data: Vec<String>, file_names: Vec<String>) -> Value {
        let results: Vec<Value> = file_names
            .into_iter()
            .zip(data)
            .map(|(name, data)| match STANDARD.decode(data.as_bytes()) {
                Ok(content) => {
                    self.uploads.insert(name.clone(), content);
                    json!({ "path": name })
                }
                Err(e) => json!({ "path": name, "err": e.to_string() }),
            })
            .collect();

        Value::Array(results)
    }

    fn uploaded_files(&self, file_paths: Vec<String>) -> Value {
        let files: Vec<Value> = file_paths
            .into_iter()
            .map(|path| match self.uploads.get(&path) {
                Some(content) => json!({
                    "name": path.rsplit(['/', '\\']).next().unwrap_or(&path),
                    "type": mime_from_extension(&path),
                    "data": STANDARD.encode(content.value()),
                }),
                None => json!({ "path": path, "err": "File not found" }),
            })
            .collect();

        Value::Array(files)
    }
}

impl Session for BasicSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn auth_credentials(&self) -> Option<Credentials> {
        self.credentials.clone()
    }

    fn handle_page_error(&self, ctx: &PipelineContext, err: &PipelineError) -> Option<Response<ProxyBody>> {
        let description = err.to_string();
        tracing::warn!(session_id = %self.id, dest_url = %ctx.dest.url, error = %description, "Page failed to load");

        if let Ok(mut errors) = self.page_errors.lock() {
            errors.push(description.clone());
        }

        let page = format!(
            "<!DOCTYPE html><html><head><title>Failed to load page</title></head><body><h1>Failed to load page</h1><p>{}</p><p>{}</p></body></html>",
            escape_html(&ctx.dest.url),
            escape_html(&description)
        );

        let mut res = Response::new(full(page));
        *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        Some(res)
    }

    fn handle_service_message<'a>(
        &'a self,
        cmd: ServiceCommand,
        _server: &'a ServerInfo,
    ) -> BoxFuture<'a, Result<Value, SessionError>> {
        async move {
            match cmd {
                ServiceCommand::SetCookie { url, cookie } => {
                    let dest = parse_proxy_url(&url)
                        .map(|parsed| parsed.dest)
                        .or_else(|| Destination::parse(&url))
                        .ok_or(SessionError::InvalidCookieUrl(url))?;

                    self.sync_cookies(&dest, vec![cookie]);
                    Ok(Value::String(self.cookie_header(&dest).unwrap_or_default()))
                }
                ServiceCommand::UploadFiles { data, file_names } => Ok(self.upload_files(data, file_names)),
                ServiceCommand::GetUploadedFiles { file_paths } => Ok(self.uploaded_files(file_paths)),
            }
        }
        .boxed()
    }

    fn task_script(
        &self,
        referer: &str,
        origin_url: &str,
        server: &ServerInfo,
        is_iframe: bool,
        with_payload: bool,
    ) -> String {
        let cookie = Destination::parse(origin_url)
            .and_then(|dest| self.cookie_header(&dest))
            .unwrap_or_default();

        let settings = json!({
            "sessionId": self.id,
            "referer": referer,
            "originUrl": origin_url,
            "cookie": cookie,
            "serviceMsgUrl": format!("{}/messaging", server.domain),
            "ie9FileReaderShimUrl": format!("{}/ie9-file-reader-shim", server.domain),
            "crossDomainPort": server.cross_domain_port,
            "isIframe": is_iframe,
        });

        let mut script = format!("window.__harnessProxySettings = {};\n", settings);
        if with_payload && !self.payload_script.is_empty() {
            script.push_str(&self.payload_script);
            script.push('\n');
        }
        script
    }

    fn handle_file_download(&self) {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session_id = %self.id, "File download detected");
    }

    fn injectable(&self) -> Injectable {
        self.injectable.clone()
    }

    fn cookie_header(&self, dest: &Destination) -> Option<String> {
        let jar = self.cookies.get(&dest.hostname.to_ascii_lowercase())?;
        if jar.is_empty() {
            return None;
        }

        Some(
            jar.iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn sync_cookies(&self, dest: &Destination, set_cookies: Vec<String>) {
        for set_cookie in &set_cookies {
            self.set_cookie(dest, set_cookie);
        }
    }
}

fn mime_from_extension(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("txt") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
