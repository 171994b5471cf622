//! Infrastructure layer: the adapters behind the application ports.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `janus_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`transport`** – `Connector` implementations.  `websocket` talks to a
//!   real gateway over `ws://` or `wss://`; `mock` is an in-process scripted
//!   gateway for tests.
//!
//! - **`capture_backend`** – `CaptureBackend` implementations.  The HTTP
//!   backend fetches snapshot bytes from a per-camera endpoint.
//!
//! - **`storage`** – the TOML config file and the `SnapshotSink`
//!   implementations (files on disk, or memory for tests).
//!
//! - **`ui_bridge`** – the callback façade for front-ends: completion
//!   marshaling onto the caller's thread plus serializable DTOs.

pub mod capture_backend;
pub mod storage;
pub mod transport;
pub mod ui_bridge;
