//! Pipeline error taxonomy.

use std::fmt;
use thiserror::Error;

use crate::http::request::BodyError;
use crate::processing::ProcessingError;

/// Codes of fatal destination failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// DNS lookup of the destination host failed.
    CantResolveOriginUrl,
    /// The destination dropped the connection mid-transfer.
    OriginServerConnectionTerminated,
    /// No response headers within the configured timeout.
    OriginServerRequestTimeout,
    /// The destination refused or never accepted the connection.
    OriginServerConnectionFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::CantResolveOriginUrl => "PROXY_CANT_RESOLVE_ORIGIN_URL",
            ErrorCode::OriginServerConnectionTerminated => "PROXY_ORIGIN_SERVER_CONNECTION_TERMINATED",
            ErrorCode::OriginServerRequestTimeout => "PROXY_ORIGIN_SERVER_REQUEST_TIMEOUT",
            ErrorCode::OriginServerConnectionFailed => "PROXY_ORIGIN_SERVER_CONNECTION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal error of one pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{code}: {dest_url}")]
    Destination { code: ErrorCode, dest_url: String },

    #[error("Failed to read request body: {0}")]
    RequestBody(#[source] BodyError),

    #[error("Failed to read destination response body: {0}")]
    ResponseBody(#[source] BodyError),

    #[error("Failed to process content: {0}")]
    Processing(#[from] ProcessingError),
}

impl PipelineError {
    pub fn destination(code: ErrorCode, dest_url: impl Into<String>) -> Self {
        PipelineError::Destination {
            code,
            dest_url: dest_url.into(),
        }
    }

    /// Label used for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Destination { code, .. } => code.as_str(),
            PipelineError::RequestBody(_) => "REQUEST_BODY",
            PipelineError::ResponseBody(_) => "RESPONSE_BODY",
            PipelineError::Processing(_) => "CONTENT_PROCESSING",
        }
    }

    pub fn dest_url(&self) -> Option<&str> {
        match self {
            PipelineError::Destination { dest_url, .. } => Some(dest_url),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_error_display() {
        let err = PipelineError::destination(ErrorCode::OriginServerRequestTimeout, "http://example.com/slow");
        assert_eq!(err.to_string(), "PROXY_ORIGIN_SERVER_REQUEST_TIMEOUT: http://example.com/slow");
        assert_eq!(err.code(), "PROXY_ORIGIN_SERVER_REQUEST_TIMEOUT");
        assert_eq!(err.dest_url(), Some("http://example.com/slow"));
    }
}
