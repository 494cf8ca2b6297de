//! Service route table.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path)
//!     → router.rs (exact `METHOD path` map)
//!     → matcher.rs (templated routes, registration order)
//!     → Return: static content, handler + params, or None
//!
//! None → request belongs to the proxy pipeline
//! ```

pub mod matcher;
pub mod router;

pub use matcher::RouteParams;
pub use router::{respond_static, Handler, RouteMatch, Router, StaticContent};
