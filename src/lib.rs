//! Harness proxy library.
//!
//! A URL-rewriting HTTP proxy for browser test harnesses. Pages are served
//! through proxy URLs of the form
//! `http://{host}:{port}/{session_id}[!{tag}]/{destination_url}`; each
//! request runs through a staged pipeline that fetches the destination,
//! enforces the same-origin policy for marked XHRs and hands pages to a
//! content processor before answering the browser.
//!
//! ```text
//!   browser ──► Listener (port1 | port2) ──► service routes (/messaging, /task.js, ...)
//!                                        └─► Pipeline ──► destination server
//!                                                 │
//!                                   SessionRegistry (shared by both listeners)
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod pipeline;
pub mod proxy_url;
pub mod routing;

// Content and sessions
pub mod processing;
pub mod session;
pub mod upload;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use http::{Proxy, ServerInfo};
pub use lifecycle::Shutdown;
pub use pipeline::{PipelineContext, PipelineError};
pub use processing::{ContentProcessor, ResourceInjector};
pub use session::{BasicSession, Session, SessionRegistry};
