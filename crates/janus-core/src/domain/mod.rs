//! Domain entities for the Janus snapshot client.
//!
//! This module contains pure data and rules with no infrastructure
//! dependencies: no sockets, no files, no clocks.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! Clean Architecture organises code into concentric layers.  The innermost
//! layer is called the **domain**.  Domain code:
//!
//! - Contains the core rules of the application.
//! - Has **no** imports from OS APIs, network libraries or UI frameworks.
//! - Can be compiled and tested on any platform without any external setup.
//!
//! Here the domain is the vocabulary of a gateway conversation: sessions and
//! plugin handles, the connection state machine's states, the sources a
//! gateway exposes and the rules for turning a capture request into a set of
//! targets.  The client crate's application layer drives these types; it is
//! never the other way round.

pub mod config;
pub mod session;
pub mod snapshot;
pub mod sources;

pub use config::SessionConfig;
pub use session::{
    ConnectAttempt, ConnectionState, GatewayEndpoint, HandleId, SessionId, DEFAULT_GATEWAY_PORT,
    GATEWAY_PATH,
};
pub use snapshot::{CaptureSelection, SnapshotArtifact};
pub use sources::{default_source_name, SourceDescriptor, SourceId};
