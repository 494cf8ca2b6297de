//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::Listener)
//!     → server.rs (hyper http1 connection, request-id + trace layers)
//!     → /favicon.ico → 404
//!     → routing::Router (service.rs endpoints, static client script)
//!     → otherwise pipeline::Pipeline
//!     → response.rs helpers build every proxy-authored response
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod service;

pub use request::X_REQUEST_ID;
pub use response::ProxyBody;
pub use server::{Proxy, ServerInfo};
pub use service::ServiceState;
