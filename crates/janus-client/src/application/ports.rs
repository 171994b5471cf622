//! Ports: the traits the application layer depends on.
//!
//! Infrastructure provides the implementations (WebSocket transport, HTTP
//! capture backend, file store); tests substitute in-process fakes.  Every
//! port is `Send + Sync` (or `Send` for the per-connection halves) so that it
//! can be shared across Tokio tasks.
//!
//! # The transport split
//!
//! [`Connector::open`] hands back two independent halves.  The write half
//! ([`FrameSink`]) is owned by a single writer task fed through a queue, so
//! sends from any number of tasks are serialized without a lock.  The read
//! half ([`FrameSource`]) is owned by the receive loop, the only reader.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use janus_core::protocol::GatewayEvent;
use janus_core::{ConnectionState, GatewayEndpoint, SourceDescriptor, SourceId};

use crate::application::error::GatewayError;

/// The two halves of one open connection.
pub struct TransportParts {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Opens connections to a gateway.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens one connection to `endpoint`, over TLS when `secure`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the connection or the
    /// WebSocket upgrade fails.
    async fn open(
        &self,
        endpoint: &GatewayEndpoint,
        secure: bool,
    ) -> Result<TransportParts, GatewayError>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Sends one text frame.
    async fn send(&mut self, frame: String) -> Result<(), GatewayError>;

    /// Closes the connection.  Calling it more than once has no effect.
    async fn close(&mut self);
}

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next inbound text frame; `None` once the connection is closed.
    async fn next(&mut self) -> Option<Result<String, GatewayError>>;
}

/// One status notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub state: ConnectionState,
    /// Human-readable progress line, e.g. `"Discovered 2 streams"`.
    pub message: String,
}

/// Receives status changes and unsolicited gateway events.
///
/// Called from runtime tasks; implementations must not block.
pub trait SessionObserver: Send + Sync {
    fn on_status(&self, update: StatusUpdate);

    fn on_event(&self, _event: GatewayEvent) {}
}

/// Turns an authorized source into image bytes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn grab(&self, source: &SourceDescriptor) -> Result<Vec<u8>, GatewayError>;
}

/// Stores captured images.
///
/// Blocking; the orchestrator calls it from `spawn_blocking`.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotSink: Send + Sync {
    /// Stores `bytes` for `source` and returns where they went.
    fn save(
        &self,
        source: SourceId,
        taken_at: DateTime<Local>,
        bytes: &[u8],
    ) -> Result<PathBuf, GatewayError>;
}
