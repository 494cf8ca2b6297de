//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → metrics exporter → Proxy::start (both listeners)
//!
//! Shutdown (shutdown.rs):
//!     Proxy::close → stop both accept loops → drain connections → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Proxy::close
//! ```
//!
//! # Design Decisions
//! - Both listeners start and stop together
//! - Drain is bounded by `timeouts.drain_ms`

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
