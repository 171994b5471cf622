//! Gateway transports.
//!
//! - **`websocket`** – the real connection, `ws://` or `wss://` via
//!   `tokio-tungstenite`.
//! - **`mock`** – an in-process gateway that answers from a script, used by
//!   the unit and integration tests.

pub mod mock;
pub mod websocket;

pub use websocket::WebSocketConnector;
