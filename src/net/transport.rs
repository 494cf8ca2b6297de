//! Classification of connection-level failures.
//!
//! Clients routinely disconnect between the response head and the body
//! write. Those resets are expected and ignored at the connection call
//! site; any other connection error is surfaced.

use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Returned by a request service to close the connection without writing
/// a response. Browsers report such a request as failed with status 0.
#[derive(Debug, Clone, Copy, Error)]
#[error("connection closed without a response")]
pub struct ConnectionAbort;

/// What to do with an error returned by a served connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// The peer went away (reset, broken pipe, aborted).
    PeerReset,
    /// A request service asked to drop the connection.
    Aborted,
    Unexpected,
}

pub fn classify(err: &(dyn StdError + 'static)) -> ConnectionOutcome {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);

    while let Some(current) = source {
        if current.is::<ConnectionAbort>() {
            return ConnectionOutcome::Aborted;
        }
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            if is_reset(io_err.kind()) {
                return ConnectionOutcome::PeerReset;
            }
        }
        if let Some(hyper_err) = current.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_canceled() {
                return ConnectionOutcome::PeerReset;
            }
        }
        source = current.source();
    }

    ConnectionOutcome::Unexpected
}

fn is_reset(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionAborted
    )
}
