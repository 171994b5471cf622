//! # janus-core
//!
//! Shared library for the Janus snapshot client containing the gateway's JSON
//! wire types, the frame codec, transaction identifiers and the session
//! domain model.
//!
//! It has zero dependencies on sockets, files, clocks or async runtimes, so
//! everything here can be unit-tested in isolation.
//!
//! # Architecture overview (for beginners)
//!
//! A media gateway exposes cameras as "streams".  The client opens one
//! WebSocket to the gateway, creates a **session**, attaches a **handle** to
//! the streaming plugin, lists the streams and then asks for snapshots.  All
//! of that is JSON request/reply traffic correlated by a `transaction` id.
//!
//! This crate (`janus-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – What the JSON frames look like.  Requests are typed
//!   structs; inbound frames are decoded and classified into replies (keyed
//!   by transaction id) and unsolicited events.
//!
//! - **`domain`** – Pure data: session and handle ids, the connection state
//!   machine's states, the bounded TLS downgrade policy, discovered sources
//!   and the rules for choosing capture targets.

// Rust will look for each module in a subdirectory with the same name
// (e.g., src/protocol/mod.rs).
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `janus_core::SourceId` instead of `janus_core::domain::sources::SourceId`.
pub use domain::{
    CaptureSelection, ConnectAttempt, ConnectionState, GatewayEndpoint, HandleId, SessionConfig,
    SessionId, SnapshotArtifact, SourceDescriptor, SourceId,
};
pub use protocol::codec::{decode_frame, encode_request, FrameError, InboundFrame, Reply};
pub use protocol::messages::{PluginRequest, Request};
pub use protocol::transaction::{TransactionId, TransactionIdAllocator};
