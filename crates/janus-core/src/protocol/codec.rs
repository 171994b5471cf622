//! JSON codec for the gateway protocol.
//!
//! Outbound: [`encode_request`] turns a typed [`Request`] into one text frame.
//!
//! Inbound: [`decode_frame`] parses one text frame and classifies it:
//!
//! ```text
//! has transaction? ── no ──▶ InboundFrame::Event    (unsolicited)
//!        │
//!       yes ── not a decimal id ──▶ InboundFrame::Stray (never ours)
//!        │
//!        ▼
//! InboundFrame::Reply { transaction, reply }
//!        reply = Success | Ack | Event | Error
//! ```
//!
//! A plugin may reject a request inside an otherwise successful reply by
//! putting `error_code`/`error` in `plugindata.data`.  The codec folds that
//! case into [`Reply::Error`] so callers only have one place to look.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::domain::session::{HandleId, SessionId};
use crate::protocol::messages::{PluginData, RawFrame, Request, StreamEntry};
use crate::protocol::transaction::TransactionId;

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The text is not valid JSON or lacks the mandatory `janus` field.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A request could not be serialized.
    #[error("could not encode request: {0}")]
    Encode(String),
}

/// An explicit rejection from the gateway or one of its plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRejection {
    pub code: i64,
    pub reason: String,
}

/// The parts of a reply the client may need after it resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyPayload {
    pub data: Option<Value>,
    pub plugindata: Option<PluginData>,
    pub jsep: Option<Value>,
}

impl ReplyPayload {
    fn from_raw(raw: &mut RawFrame) -> Self {
        Self {
            data: raw.data.take(),
            plugindata: raw.plugindata.take(),
            jsep: raw.jsep.take(),
        }
    }

    /// The `data.id` field: the new session id after `create`, the new
    /// handle id after `attach`.
    pub fn data_id(&self) -> Option<u64> {
        self.data.as_ref()?.get("id")?.as_u64()
    }

    /// The plugin's own response object, if the reply carried one.
    pub fn plugin_data(&self) -> Option<&Value> {
        self.plugindata.as_ref().map(|p| &p.data)
    }

    /// A plugin-level rejection hidden inside `plugindata.data`.
    pub fn plugin_error(&self) -> Option<GatewayRejection> {
        let data = self.plugin_data()?;
        let code = data.get("error_code")?.as_i64()?;
        let reason = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("plugin error")
            .to_string();
        Some(GatewayRejection { code, reason })
    }

    /// The streaming plugin's mountpoint list.
    ///
    /// Returns `None` when the reply has no `list` array at all.  Entries
    /// that do not have a numeric `id` are logged and left out.
    pub fn stream_list(&self) -> Option<Vec<StreamEntry>> {
        let items = self.plugin_data()?.get("list")?.as_array()?;
        let entries = items
            .iter()
            .filter_map(|item| match serde_json::from_value::<StreamEntry>(item.clone()) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("ignoring unreadable stream list entry {item}: {e}");
                    None
                }
            })
            .collect();
        Some(entries)
    }
}

/// A reply correlated to one request by its transaction id.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Synchronous success.
    Success(ReplyPayload),
    /// Receipt only; asynchronous results follow as an `Event`.
    Ack,
    /// Asynchronous result of an earlier request.
    Event(ReplyPayload),
    /// Rejection by the gateway core or the addressed plugin.
    Error(GatewayRejection),
}

/// Kinds of unsolicited gateway events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    WebrtcUp,
    Media,
    Hangup,
    SlowLink,
    Detached,
    /// The gateway expired the session for inactivity.
    Timeout,
    /// A plugin event not tied to any request.
    Plugin,
    Other(String),
}

impl EventKind {
    fn from_wire(kind: &str) -> Self {
        match kind {
            "webrtcup" => EventKind::WebrtcUp,
            "media" => EventKind::Media,
            "hangup" => EventKind::Hangup,
            "slowlink" => EventKind::SlowLink,
            "detached" => EventKind::Detached,
            "timeout" => EventKind::Timeout,
            "event" => EventKind::Plugin,
            other => EventKind::Other(other.to_string()),
        }
    }
}

/// An inbound frame that carries no transaction id.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub kind: EventKind,
    pub session_id: Option<SessionId>,
    pub sender: Option<HandleId>,
    pub reason: Option<String>,
    pub payload: ReplyPayload,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Reply {
        transaction: TransactionId,
        reply: Reply,
    },
    Event(GatewayEvent),
    /// A transaction string this client could never have issued.
    Stray { transaction: String, kind: String },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes one request as a JSON text frame.
///
/// # Errors
///
/// Returns [`FrameError::Encode`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use janus_core::protocol::{encode_request, Request, TransactionId};
///
/// let text = encode_request(&Request::create(TransactionId::new(1))).unwrap();
/// assert_eq!(text, r#"{"janus":"create","transaction":"1"}"#);
/// ```
pub fn encode_request(request: &Request) -> Result<String, FrameError> {
    serde_json::to_string(request).map_err(|e| FrameError::Encode(e.to_string()))
}

/// Decodes and classifies one inbound text frame.
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] when the text is not a JSON object with
/// a string `janus` field.
///
/// # Examples
///
/// ```rust
/// use janus_core::protocol::{decode_frame, InboundFrame, Reply};
///
/// let frame = decode_frame(r#"{"janus":"success","transaction":"3","data":{"id":77}}"#).unwrap();
/// match frame {
///     InboundFrame::Reply { reply: Reply::Success(payload), .. } => {
///         assert_eq!(payload.data_id(), Some(77));
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub fn decode_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let mut raw: RawFrame =
        serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;

    let Some(transaction) = raw.transaction.take() else {
        return Ok(InboundFrame::Event(classify_event(raw)));
    };

    let Ok(id) = transaction.parse::<TransactionId>() else {
        return Ok(InboundFrame::Stray {
            transaction,
            kind: raw.janus,
        });
    };

    Ok(InboundFrame::Reply {
        transaction: id,
        reply: classify_reply(raw),
    })
}

// ── Classification ────────────────────────────────────────────────────────────

fn classify_reply(mut raw: RawFrame) -> Reply {
    match raw.janus.as_str() {
        "ack" => Reply::Ack,
        "error" => {
            let body = raw.error.take();
            Reply::Error(GatewayRejection {
                code: body.as_ref().map(|b| b.code).unwrap_or_default(),
                reason: body
                    .map(|b| b.reason)
                    .unwrap_or_else(|| "unspecified gateway error".to_string()),
            })
        }
        "event" => with_plugin_error(Reply::Event(ReplyPayload::from_raw(&mut raw))),
        // `success` and anything newer the gateway may send with a transaction.
        _ => with_plugin_error(Reply::Success(ReplyPayload::from_raw(&mut raw))),
    }
}

fn with_plugin_error(reply: Reply) -> Reply {
    let rejection = match &reply {
        Reply::Success(p) | Reply::Event(p) => p.plugin_error(),
        _ => None,
    };
    match rejection {
        Some(r) => Reply::Error(r),
        None => reply,
    }
}

fn classify_event(mut raw: RawFrame) -> GatewayEvent {
    GatewayEvent {
        kind: EventKind::from_wire(&raw.janus),
        session_id: raw.session_id.map(SessionId),
        sender: raw.sender.map(HandleId),
        reason: raw.reason.take(),
        payload: ReplyPayload::from_raw(&mut raw),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sources::SourceId;

    fn reply_of(text: &str) -> (TransactionId, Reply) {
        match decode_frame(text).expect("decode must succeed") {
            InboundFrame::Reply { transaction, reply } => (transaction, reply),
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn test_success_with_data_id() {
        // Arrange
        let text = r#"{"janus":"success","transaction":"1","data":{"id":4242}}"#;

        // Act
        let (tx, reply) = reply_of(text);

        // Assert
        assert_eq!(tx, TransactionId::new(1));
        match reply {
            Reply::Success(p) => assert_eq!(p.data_id(), Some(4242)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_error_reply_carries_code_and_reason() {
        let (_, reply) = reply_of(
            r#"{"janus":"error","transaction":"9","error":{"code":458,"reason":"No such session"}}"#,
        );
        assert_eq!(
            reply,
            Reply::Error(GatewayRejection {
                code: 458,
                reason: "No such session".to_string()
            })
        );
    }

    #[test]
    fn test_ack_is_classified() {
        let (_, reply) = reply_of(r#"{"janus":"ack","transaction":"2","session_id":5}"#);
        assert_eq!(reply, Reply::Ack);
    }

    #[test]
    fn test_plugin_error_inside_event_becomes_error() {
        let text = r#"{"janus":"event","transaction":"4","sender":7,
            "plugindata":{"plugin":"janus.plugin.streaming",
            "data":{"streaming":"event","error_code":455,"error":"No such mountpoint/stream 3"}}}"#;

        let (_, reply) = reply_of(text);

        match reply {
            Reply::Error(r) => {
                assert_eq!(r.code, 455);
                assert!(r.reason.contains("No such mountpoint"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_plugin_event_without_error_stays_event() {
        let text = r#"{"janus":"event","transaction":"4","sender":7,
            "plugindata":{"plugin":"janus.plugin.streaming",
            "data":{"streaming":"event","result":{"status":"preparing"}}}}"#;
        let (_, reply) = reply_of(text);
        assert!(matches!(reply, Reply::Event(_)));
    }

    #[test]
    fn test_stream_list_defaults_and_skips_bad_entries() {
        let text = r#"{"janus":"success","transaction":"3","sender":1,
            "plugindata":{"plugin":"janus.plugin.streaming","data":{"streaming":"list",
            "list":[{"id":1,"description":"Bow"},{"id":2},{"description":"no id"}]}}}"#;

        let (_, reply) = reply_of(text);

        let Reply::Success(payload) = reply else {
            panic!("expected success");
        };
        let list = payload.stream_list().expect("list present");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, SourceId(1));
        assert_eq!(list[0].description.as_deref(), Some("Bow"));
        assert_eq!(list[1].description, None);
    }

    #[test]
    fn test_frame_without_transaction_is_event() {
        let frame = decode_frame(r#"{"janus":"timeout","session_id":12}"#).unwrap();
        match frame {
            InboundFrame::Event(ev) => {
                assert_eq!(ev.kind, EventKind::Timeout);
                assert_eq!(ev.session_id, Some(SessionId(12)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_hangup_keeps_reason() {
        let frame =
            decode_frame(r#"{"janus":"hangup","session_id":1,"sender":2,"reason":"DTLS alert"}"#)
                .unwrap();
        let InboundFrame::Event(ev) = frame else {
            panic!("expected event");
        };
        assert_eq!(ev.kind, EventKind::Hangup);
        assert_eq!(ev.sender, Some(HandleId(2)));
        assert_eq!(ev.reason.as_deref(), Some("DTLS alert"));
    }

    #[test]
    fn test_non_numeric_transaction_is_stray() {
        let frame = decode_frame(r#"{"janus":"success","transaction":"abc"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Stray {
                transaction: "abc".to_string(),
                kind: "success".to_string()
            }
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            decode_frame("not json"),
            Err(FrameError::Malformed(_))
        ));
        assert!(matches!(
            decode_frame(r#"{"transaction":"1"}"#),
            Err(FrameError::Malformed(_))
        ));
    }
}
