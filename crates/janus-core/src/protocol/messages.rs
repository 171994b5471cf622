//! Wire types for the gateway's JSON API.
//!
//! Outbound requests are strongly typed ([`Request`], [`PluginRequest`]);
//! inbound frames are first parsed into the loose [`RawFrame`] shape and then
//! classified by [`crate::protocol::codec::decode_frame`].  The gateway
//! attaches many optional fields to its replies, so the raw shape keeps
//! plugin payloads as `serde_json::Value` and only the fields the client
//! acts on get their own types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::session::{HandleId, SessionId};
use crate::domain::sources::SourceId;
use crate::protocol::transaction::TransactionId;

/// WebSocket sub-protocol the gateway requires during the upgrade.
pub const JANUS_SUBPROTOCOL: &str = "janus-protocol";

/// Package name of the streaming plugin.
pub const STREAMING_PLUGIN: &str = "janus.plugin.streaming";

// ── Outbound ──────────────────────────────────────────────────────────────────

/// The `janus` field of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Create,
    Attach,
    Message,
    Keepalive,
    Destroy,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Attach => "attach",
            Verb::Message => "message",
            Verb::Keepalive => "keepalive",
            Verb::Destroy => "destroy",
        }
    }
}

/// Body of a `message` request addressed to the streaming plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum PluginRequest {
    /// Enumerate the mountpoints the plugin exposes.
    List,
    /// Ask the plugin to prepare a still frame for one mountpoint.
    Watch { id: SourceId, snapshot: bool },
}

/// One request frame.
///
/// Construct through the verb-specific builders so that each verb only ever
/// carries the fields the gateway expects for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    pub janus: Verb,
    pub transaction: TransactionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_id: Option<HandleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<PluginRequest>,
}

impl Request {
    fn bare(janus: Verb, transaction: TransactionId) -> Self {
        Self {
            janus,
            transaction,
            session_id: None,
            handle_id: None,
            plugin: None,
            body: None,
        }
    }

    /// `create`: opens a new gateway session.
    pub fn create(transaction: TransactionId) -> Self {
        Self::bare(Verb::Create, transaction)
    }

    /// `attach`: binds a new handle in `session` to `plugin`.
    pub fn attach(transaction: TransactionId, session: SessionId, plugin: &str) -> Self {
        Self {
            session_id: Some(session),
            plugin: Some(plugin.to_string()),
            ..Self::bare(Verb::Attach, transaction)
        }
    }

    /// `message`: forwards `body` to the plugin behind `handle`.
    pub fn message(
        transaction: TransactionId,
        session: SessionId,
        handle: HandleId,
        body: PluginRequest,
    ) -> Self {
        Self {
            session_id: Some(session),
            handle_id: Some(handle),
            body: Some(body),
            ..Self::bare(Verb::Message, transaction)
        }
    }

    /// `keepalive`: resets the gateway's idle timer for `session`.
    pub fn keepalive(transaction: TransactionId, session: SessionId) -> Self {
        Self {
            session_id: Some(session),
            ..Self::bare(Verb::Keepalive, transaction)
        }
    }

    /// `destroy`: ends `session` and every handle attached to it.
    pub fn destroy(transaction: TransactionId, session: SessionId) -> Self {
        Self {
            session_id: Some(session),
            ..Self::bare(Verb::Destroy, transaction)
        }
    }
}

// ── Inbound ───────────────────────────────────────────────────────────────────

/// Every inbound frame, before classification.
///
/// Only `janus` is mandatory; everything else depends on the frame kind.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawFrame {
    pub janus: String,
    #[serde(default)]
    pub transaction: Option<String>,
    #[serde(default)]
    pub session_id: Option<u64>,
    /// Handle that produced an event.
    #[serde(default)]
    pub sender: Option<u64>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub plugindata: Option<PluginData>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
    #[serde(default)]
    pub jsep: Option<Value>,
    /// Free-text reason on `hangup` and similar events.
    #[serde(default)]
    pub reason: Option<String>,
}

/// The `plugindata` object of a reply or event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginData {
    pub plugin: String,
    #[serde(default)]
    pub data: Value,
}

/// The `error` object of an `error` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    #[serde(default)]
    pub reason: String,
}

/// One element of the streaming plugin's `list` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamEntry {
    pub id: SourceId,
    #[serde(default)]
    pub description: Option<String>,
}
