//! Test sessions.
//!
//! # Data Flow
//! ```text
//! harness → Proxy::open_session(url, session) → SessionRegistry
//!
//! proxy URL /{session_id}/... → PipelineContext::dispatch → Arc<dyn Session>
//!     → auth_credentials / cookie_header      (outbound request)
//!     → sync_cookies / handle_file_download   (destination response)
//!     → injectable / task_script              (page processing, /task.js)
//!     → handle_page_error                     (fatal pipeline errors on pages)
//!
//! POST /messaging {cmd, jobUid, ...} → ServiceCommand → handle_service_message
//! ```
//!
//! Sessions are shared between both listeners and every in-flight request,
//! so implementations must be `Send + Sync`. Concurrent mutation of the same
//! session resolves last-write-wins.

pub mod basic;
pub mod registry;

use futures_util::future::BoxFuture;
use http::Response;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::http::response::ProxyBody;
use crate::http::ServerInfo;
use crate::pipeline::{PipelineContext, PipelineError};
use crate::proxy_url::Destination;

pub use basic::BasicSession;
pub use registry::SessionRegistry;

/// Basic-auth credentials forwarded to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Resources injected into every processed page, as paths on the proxy domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Injectable {
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
}

/// Commands the client runtime sends to `POST /messaging`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "cmd", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceCommand {
    /// `document.cookie` assignment on a proxied page.
    SetCookie { url: String, cookie: String },

    /// Files chosen through the upload sandbox, base64 encoded.
    #[serde(rename_all = "camelCase")]
    UploadFiles {
        data: Vec<String>,
        file_names: Vec<String>,
    },

    /// Read back files previously stored by `UPLOAD_FILES`.
    #[serde(rename_all = "camelCase")]
    GetUploadedFiles { file_paths: Vec<String> },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session is not opened in proxy")]
    NotOpened,

    #[error("Invalid service message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("Invalid cookie target URL: {0}")]
    InvalidCookieUrl(String),
}

/// A service message envelope: `{cmd, jobUid, ...command fields}`.
#[derive(Debug)]
pub struct ServiceMessage {
    pub job_uid: String,
    /// Raw message, decoded into a [`ServiceCommand`] once the session is known.
    pub payload: Value,
}

impl ServiceMessage {
    /// Parse a message body. `None` for anything that is not a JSON object
    /// with a string `jobUid`.
    pub fn parse(body: &[u8]) -> Option<ServiceMessage> {
        let payload: Value = serde_json::from_slice(body).ok()?;
        let job_uid = payload.get("jobUid")?.as_str()?.to_string();

        Some(ServiceMessage { job_uid, payload })
    }

    pub fn command(self) -> Result<ServiceCommand, SessionError> {
        Ok(serde_json::from_value(self.payload)?)
    }
}

/// Hooks the pipeline and the service endpoints call on a test session.
pub trait Session: Send + Sync {
    fn id(&self) -> &str;

    fn auth_credentials(&self) -> Option<Credentials>;

    /// Render a diagnostic for a failed page navigation.
    ///
    /// `None` lets the pipeline answer with a plain 500.
    fn handle_page_error(&self, ctx: &PipelineContext, err: &PipelineError) -> Option<Response<ProxyBody>>;

    fn handle_service_message<'a>(
        &'a self,
        cmd: ServiceCommand,
        server: &'a ServerInfo,
    ) -> BoxFuture<'a, Result<Value, SessionError>>;

    fn task_script(
        &self,
        referer: &str,
        origin_url: &str,
        server: &ServerInfo,
        is_iframe: bool,
        with_payload: bool,
    ) -> String;

    /// Called once per response that the browser will save as a file.
    fn handle_file_download(&self);

    fn injectable(&self) -> Injectable;

    /// `Cookie` header value to send to `dest`.
    fn cookie_header(&self, dest: &Destination) -> Option<String>;

    /// Store `Set-Cookie` values received from `dest`.
    fn sync_cookies(&self, dest: &Destination, set_cookies: Vec<String>);
}
