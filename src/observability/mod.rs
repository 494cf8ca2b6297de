//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! listeners, pipeline, session registry
//!     → logging.rs (tracing events with request_id / session_id / dest_url)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
