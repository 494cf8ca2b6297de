//! Content processing.
//!
//! The pipeline hands every buffered destination body that needs rewriting
//! to a [`ContentProcessor`]. The processor owns the rewriting rules; the
//! crate ships [`ResourceInjector`], which injects the client runtime and the
//! session's resources into pages and leaves other bodies untouched.

pub mod content;
pub mod injector;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::pipeline::PipelineContext;

pub use injector::ResourceInjector;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("content codec failure: {0}")]
    Codec(#[from] std::io::Error),

    #[error("{0}")]
    Rejected(String),
}

/// Rewrites a buffered destination body.
pub trait ContentProcessor: Send + Sync {
    fn process<'a>(&'a self, ctx: &'a PipelineContext) -> BoxFuture<'a, Result<Bytes, ProcessingError>>;
}
