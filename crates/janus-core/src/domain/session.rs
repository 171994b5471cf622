//! Session-level domain types: gateway identifiers, the connection state
//! machine's states, and the bounded secure-to-plain connect policy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Path component under which the gateway exposes its WebSocket API.
pub const GATEWAY_PATH: &str = "janus";

/// Default WebSocket port of the gateway.
pub const DEFAULT_GATEWAY_PORT: u16 = 8188;

/// Session identifier issued by the gateway in reply to `create`.
///
/// Opaque to the client; it is only ever echoed back on later requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of one attachment to a gateway plugin (a capability handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle state of one client connection.
///
/// ```text
/// Disconnected ─open─▶ Connecting ─create ok─▶ SessionEstablished
///      ▲                                            │ attach + list
///      │                                            ▼
/// Disconnecting ◀─disconnect── Ready ◀──────── SourcesDiscovered
/// ```
///
/// Any state may fall straight back to `Disconnected` when the transport
/// fails, the gateway rejects the handshake, or a request times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    SessionEstablished,
    SourcesDiscovered,
    Ready,
    Disconnecting,
}

impl ConnectionState {
    /// Whether a gateway session exists in this state.
    pub fn has_session(self) -> bool {
        matches!(
            self,
            ConnectionState::SessionEstablished
                | ConnectionState::SourcesDiscovered
                | ConnectionState::Ready
        )
    }

    /// Whether captures may be issued in this state.
    pub fn accepts_captures(self) -> bool {
        self == ConnectionState::Ready
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::SessionEstablished => "session established",
            ConnectionState::SourcesDiscovered => "sources discovered",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(label)
    }
}

/// Host and port of a gateway, independent of the URL scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoint {
    pub host: String,
    pub port: u16,
}

impl GatewayEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// WebSocket URL for this endpoint, `wss://` when `secure`.
    ///
    /// ```rust
    /// use janus_core::domain::GatewayEndpoint;
    ///
    /// let ep = GatewayEndpoint::new("10.0.0.254", 8188);
    /// assert_eq!(ep.url(true), "wss://10.0.0.254:8188/janus");
    /// assert_eq!(ep.url(false), "ws://10.0.0.254:8188/janus");
    /// ```
    pub fn url(&self, secure: bool) -> String {
        let scheme = if secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}/{GATEWAY_PATH}", self.host, self.port)
    }
}

impl fmt::Display for GatewayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One transport-open attempt in the bounded connect sequence.
///
/// A secure request may fall back to plain WebSocket exactly once:
///
/// ```text
/// Connecting(secure) ─fail─▶ Connecting(plain) ─fail─▶ Disconnected
/// Connecting(plain)  ─fail─▶ Disconnected
/// ```
///
/// The downgrade budget is carried in the value itself, so no caller can
/// retry more than the policy allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAttempt {
    secure: bool,
    downgraded: bool,
}

impl ConnectAttempt {
    /// The first attempt, using the scheme the caller asked for.
    pub fn first(secure: bool) -> Self {
        Self {
            secure,
            downgraded: false,
        }
    }

    pub fn secure(self) -> bool {
        self.secure
    }

    /// Whether this attempt is the automatic plain-text retry.
    pub fn is_downgrade(self) -> bool {
        self.downgraded
    }

    /// The attempt to make after this one failed, if any remains.
    pub fn after_failure(self) -> Option<ConnectAttempt> {
        if self.secure && !self.downgraded {
            Some(ConnectAttempt {
                secure: false,
                downgraded: true,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_honour_width() {
        assert_eq!(format!("{:>6}", SessionId(42)), "    42");
        assert_eq!(format!("{:05}", HandleId(9)), "00009");
    }

    #[test]
    fn test_secure_attempt_downgrades_exactly_once() {
        // Arrange
        let first = ConnectAttempt::first(true);

        // Act
        let second = first.after_failure().expect("one downgrade allowed");
        let third = second.after_failure();

        // Assert
        assert!(first.secure());
        assert!(!second.secure());
        assert!(second.is_downgrade());
        assert!(third.is_none(), "no second downgrade");
    }

    #[test]
    fn test_plain_attempt_never_retries() {
        let first = ConnectAttempt::first(false);
        assert!(first.after_failure().is_none());
    }

    #[test]
    fn test_only_ready_accepts_captures() {
        let all = [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::SessionEstablished,
            ConnectionState::SourcesDiscovered,
            ConnectionState::Ready,
            ConnectionState::Disconnecting,
        ];
        let accepting: Vec<_> = all.iter().filter(|s| s.accepts_captures()).collect();
        assert_eq!(accepting, vec![&ConnectionState::Ready]);
    }

    #[test]
    fn test_session_exists_from_established_through_ready() {
        assert!(!ConnectionState::Connecting.has_session());
        assert!(ConnectionState::SessionEstablished.has_session());
        assert!(ConnectionState::SourcesDiscovered.has_session());
        assert!(ConnectionState::Ready.has_session());
        assert!(!ConnectionState::Disconnecting.has_session());
    }

    #[test]
    fn test_endpoint_display_is_host_port() {
        let ep = GatewayEndpoint::new("host", DEFAULT_GATEWAY_PORT);
        assert_eq!(ep.to_string(), "host:8188");
    }
}
