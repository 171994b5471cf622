//! janus-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the `janus-snap` binary share the same module tree.
//!
//! # What does janus-client do? (for beginners)
//!
//! A media gateway (Janus) exposes cameras as *streams* behind a JSON
//! signaling API spoken over one WebSocket.  Nothing in that API is
//! request/response in the simple sense: every request carries a
//! *transaction* id, replies come back in any order on the same socket,
//! some requests are answered in two steps (an `ack`, then an `event`),
//! and the gateway also pushes events nobody asked for.
//!
//! This crate turns that into plain async calls:
//!
//! 1. [`GatewaySession::connect`](application::GatewaySession::connect)
//!    opens the socket (TLS first, plain text once if TLS fails), creates a
//!    gateway session and lists the available streams.
//! 2. [`SnapshotOrchestrator::capture`](application::SnapshotOrchestrator::capture)
//!    asks every requested stream for a snapshot at the same time and
//!    reports success or failure per stream.
//! 3. [`GatewaySession::disconnect`](application::GatewaySession::disconnect)
//!    destroys the session and fails anything still waiting.
//!
//! Front-ends with their own main thread (a GUI, the CLI) use
//! [`JanusClient`](infrastructure::ui_bridge::JanusClient), which runs all of
//! this on a private runtime and delivers callbacks back on the caller's
//! thread.

/// Application layer: session state machine, transactions and snapshots.
pub mod application;

/// Infrastructure layer: transports, capture backends, storage, UI bridge.
pub mod infrastructure;
