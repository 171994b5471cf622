//! Error taxonomy shared by every client operation.
//!
//! Each failure a caller can observe is one of four kinds:
//!
//! | Kind        | Meaning                                            | Retried?                 |
//! |-------------|----------------------------------------------------|--------------------------|
//! | `Transport` | the connection could not be opened, or was lost    | only the TLS downgrade   |
//! | `Protocol`  | the gateway or a plugin explicitly refused         | no                       |
//! | `Timeout`   | no reply arrived before the deadline               | no                       |
//! | `State`     | the call is not allowed in the current state       | no (nothing was sent)    |
//!
//! Two more variants cover the collaborators around a capture: the
//! capture backend that fetches image bytes, and the sink that stores them.
//!
//! `GatewayError` is `Clone` so that one teardown reason can be delivered to
//! every pending transaction and kept in per-source snapshot reports.

use std::time::Duration;

use janus_core::protocol::{FrameError, GatewayRejection};
use thiserror::Error;

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by the gateway client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The connection could not be opened, failed while in use, or was closed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The gateway or a plugin rejected the request.
    #[error("gateway rejected request (code {code}): {reason}")]
    Protocol { code: i64, reason: String },

    /// No reply arrived within the deadline.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The operation is not allowed in the current connection state.
    #[error("invalid state: {0}")]
    State(String),

    /// The capture backend could not produce image bytes.
    #[error("capture failed: {0}")]
    Capture(String),

    /// The snapshot could not be stored.
    #[error("could not store snapshot: {0}")]
    Storage(String),
}

impl GatewayError {
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, GatewayError::Protocol { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }

    pub fn is_state(&self) -> bool {
        matches!(self, GatewayError::State(_))
    }

    /// Shorthand for a protocol error raised by the client itself when a
    /// reply is missing a field it needs.
    pub(crate) fn malformed_reply(what: &str) -> Self {
        GatewayError::Protocol {
            code: 0,
            reason: format!("reply is missing {what}"),
        }
    }
}

impl From<GatewayRejection> for GatewayError {
    fn from(r: GatewayRejection) -> Self {
        GatewayError::Protocol {
            code: r.code,
            reason: r.reason,
        }
    }
}

impl From<FrameError> for GatewayError {
    fn from(e: FrameError) -> Self {
        GatewayError::Transport(e.to_string())
    }
}
