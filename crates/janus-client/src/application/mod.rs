//! Application layer: the gateway conversation, independent of sockets,
//! files and threads.
//!
//! # What lives here?
//!
//! - **`ports`** – Traits the layer depends on: the transport
//!   (`Connector`, `FrameSink`, `FrameSource`), the capture backend, the
//!   snapshot sink and the status observer.  Infrastructure implements them.
//!
//! - **`transactions`** – The registry that parks one waiter per outstanding
//!   request and completes it exactly once: reply, timeout or teardown.
//!
//! - **`link`** / **`receive_loop`** – One live connection: a single writer
//!   task, a single reader task and the shared teardown path.
//!
//! - **`session`** – The connection state machine: open (with the one-time
//!   TLS downgrade), create, attach, list, keepalive, disconnect.
//!
//! - **`snapshot`** – Concurrent capture across sources with per-source
//!   results.
//!
//! - **`error`** – The `GatewayError` taxonomy every operation reports in.

pub mod error;
pub mod link;
pub mod ports;
pub(crate) mod receive_loop;
pub mod session;
pub mod snapshot;
pub mod transactions;

pub use error::GatewayError;
pub use session::GatewaySession;
pub use snapshot::{SnapshotOrchestrator, SnapshotReport};
