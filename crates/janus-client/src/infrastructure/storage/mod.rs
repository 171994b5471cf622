//! Storage infrastructure: configuration file persistence and snapshot sinks.
//!
//! - **`config`** – the TOML config file, its defaults and its platform
//!   location.
//! - **`snapshot_store`** – [`SnapshotSink`](crate::application::ports::SnapshotSink)
//!   implementations that write captured images to disk or keep them in
//!   memory.

pub mod config;
pub mod snapshot_store;

pub use snapshot_store::{FileSnapshotStore, MemorySnapshotStore};
