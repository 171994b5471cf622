//! Scripted in-process gateway for tests.
//!
//! # Why a mock gateway?
//!
//! A real gateway needs a running media server, cameras and a network.  The
//! `MockGateway` implements [`Connector`] with in-memory channels instead of
//! sockets and answers requests the way a gateway with the streaming plugin
//! would:
//!
//! | Request            | Reply                                              |
//! |--------------------|----------------------------------------------------|
//! | `create`           | `success` with a new session id (or a scripted error, or nothing) |
//! | `attach`           | `success` with a new handle id                     |
//! | `list`             | `success` with the configured streams              |
//! | `watch`            | `ack`, then an `event` after the configured delay  |
//! | `keepalive`        | `ack` (or `error` 458 when scripted)               |
//! | `destroy`          | `success`                                          |
//!
//! Every request is recorded so tests can assert on what the client sent,
//! and the test can push unsolicited frames or hang up at any time.
//!
//! # Usage in tests
//!
//! ```ignore
//! let gateway = MockGateway::new(MockGatewayConfig {
//!     streams: vec![(1, Some("Bow".into()))],
//!     ..MockGatewayConfig::default()
//! });
//! let session = GatewaySession::new(SessionConfig::default(), Arc::new(gateway.clone()));
//! session.connect(&GatewayEndpoint::new("gw", 8188), true).await?;
//! assert_eq!(gateway.open_attempts(), vec![true]);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use janus_core::protocol::messages::STREAMING_PLUGIN;
use janus_core::GatewayEndpoint;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::application::error::GatewayError;
use crate::application::ports::{Connector, FrameSink, FrameSource, TransportParts};

/// Script for a [`MockGateway`].
#[derive(Debug, Clone, Default)]
pub struct MockGatewayConfig {
    /// Fail every `wss://` open, as a gateway without TLS would.
    pub refuse_secure: bool,
    /// Fail every `ws://` open.
    pub refuse_plain: bool,
    /// Answer `create` with this error instead of a session.
    pub reject_create: Option<(i64, String)>,
    /// Never answer `create`, leaving the client mid-handshake.
    pub silent_create: bool,
    /// Streams returned by `list`: id and optional description.
    pub streams: Vec<(u64, Option<String>)>,
    /// Streams whose `watch` is acknowledged but never answered.
    pub silent_sources: Vec<u64>,
    /// Streams whose `watch` is answered with a plugin error.
    pub rejected_sources: Vec<u64>,
    /// Delay before a `watch` event, per stream.
    pub watch_delays: Vec<(u64, Duration)>,
    /// Answer `keepalive` with "No such session".
    pub reject_keepalive: bool,
}

/// Frames travelling from the mock gateway to the client.
enum Push {
    Frame(String),
    Hangup,
}

#[derive(Default)]
struct Recorded {
    open_attempts: Vec<bool>,
    requests: Vec<Value>,
    attaches: usize,
    closes: usize,
    next_id: u64,
    current: Option<mpsc::UnboundedSender<Push>>,
}

struct Inner {
    config: MockGatewayConfig,
    recorded: Mutex<Recorded>,
}

impl Inner {
    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn fresh_id(&self) -> u64 {
        let mut r = self.recorded();
        r.next_id += 1;
        1000 + r.next_id
    }
}

/// An in-process gateway.  Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MockGateway {
    inner: Arc<Inner>,
}

impl MockGateway {
    pub fn new(config: MockGatewayConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                recorded: Mutex::new(Recorded::default()),
            }),
        }
    }

    /// The `secure` flag of every open attempt, in order.
    pub fn open_attempts(&self) -> Vec<bool> {
        self.inner.recorded().open_attempts.clone()
    }

    /// Every request received, across all connections.
    pub fn requests(&self) -> Vec<Value> {
        self.inner.recorded().requests.clone()
    }

    /// The `janus` verb of every request received.
    pub fn verbs(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r["janus"].as_str().map(str::to_string))
            .collect()
    }

    /// Number of `attach` requests answered.
    pub fn attach_count(&self) -> usize {
        self.inner.recorded().attaches
    }

    /// Number of connections the client closed.
    pub fn close_count(&self) -> usize {
        self.inner.recorded().closes
    }

    /// Sends an unsolicited frame on the current connection.
    pub fn push(&self, frame: Value) {
        if let Some(tx) = &self.inner.recorded().current {
            let _ = tx.send(Push::Frame(frame.to_string()));
        }
    }

    /// Drops the current connection from the gateway side.
    pub fn hang_up(&self) {
        if let Some(tx) = self.inner.recorded().current.take() {
            let _ = tx.send(Push::Hangup);
        }
    }
}

#[async_trait]
impl Connector for MockGateway {
    async fn open(
        &self,
        endpoint: &GatewayEndpoint,
        secure: bool,
    ) -> Result<TransportParts, GatewayError> {
        self.inner.recorded().open_attempts.push(secure);
        let cfg = &self.inner.config;
        if (secure && cfg.refuse_secure) || (!secure && cfg.refuse_plain) {
            return Err(GatewayError::Transport(format!(
                "connection to {} reset",
                endpoint.url(secure)
            )));
        }

        let (to_gateway, from_client) = mpsc::unbounded_channel();
        let (to_client, from_gateway) = mpsc::unbounded_channel();
        self.inner.recorded().current = Some(to_client.clone());
        tokio::spawn(serve(Arc::clone(&self.inner), from_client, to_client));

        Ok(TransportParts {
            sink: Box::new(MockSink {
                inner: Arc::clone(&self.inner),
                tx: Some(to_gateway),
            }),
            source: Box::new(MockSource { rx: from_gateway }),
        })
    }
}

struct MockSink {
    inner: Arc<Inner>,
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: String) -> Result<(), GatewayError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| GatewayError::Transport("sink closed".to_string()))?;
        if let Ok(request) = serde_json::from_str::<Value>(&frame) {
            self.inner.recorded().requests.push(request);
        }
        tx.send(frame)
            .map_err(|_| GatewayError::Transport("mock gateway stopped".to_string()))
    }

    async fn close(&mut self) {
        if self.tx.take().is_some() {
            self.inner.recorded().closes += 1;
        }
    }
}

struct MockSource {
    rx: mpsc::UnboundedReceiver<Push>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn next(&mut self) -> Option<Result<String, GatewayError>> {
        match self.rx.recv().await? {
            Push::Frame(text) => Some(Ok(text)),
            Push::Hangup => None,
        }
    }
}

/// Answers requests of one connection until the client closes it.
async fn serve(
    inner: Arc<Inner>,
    mut requests: mpsc::UnboundedReceiver<String>,
    replies: mpsc::UnboundedSender<Push>,
) {
    while let Some(text) = requests.recv().await {
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        for (delay, frame) in respond(&inner, &request) {
            let text = frame.to_string();
            if delay.is_zero() {
                let _ = replies.send(Push::Frame(text));
            } else {
                let replies = replies.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = replies.send(Push::Frame(text));
                });
            }
        }
    }
    debug!("mock gateway: client closed the connection");
    let _ = replies.send(Push::Hangup);
}

fn error_frame(tx: &Value, code: i64, reason: &str) -> Value {
    json!({"janus": "error", "transaction": tx, "error": {"code": code, "reason": reason}})
}

fn respond(inner: &Inner, request: &Value) -> Vec<(Duration, Value)> {
    let cfg = &inner.config;
    let tx = request["transaction"].clone();
    let now = Duration::ZERO;

    match request["janus"].as_str().unwrap_or_default() {
        "create" if cfg.silent_create => Vec::new(),
        "create" => match &cfg.reject_create {
            Some((code, reason)) => vec![(now, error_frame(&tx, *code, reason))],
            None => vec![(
                now,
                json!({"janus": "success", "transaction": tx, "data": {"id": inner.fresh_id()}}),
            )],
        },
        "attach" => {
            inner.recorded().attaches += 1;
            vec![(
                now,
                json!({"janus": "success", "transaction": tx, "data": {"id": inner.fresh_id()}}),
            )]
        }
        "message" => respond_to_plugin(cfg, request, tx),
        "keepalive" if cfg.reject_keepalive => vec![(now, error_frame(&tx, 458, "No such session"))],
        "keepalive" => vec![(now, json!({"janus": "ack", "transaction": tx}))],
        "destroy" => vec![(now, json!({"janus": "success", "transaction": tx}))],
        other => vec![(now, error_frame(&tx, 453, &format!("Unknown request '{other}'")))],
    }
}

fn respond_to_plugin(cfg: &MockGatewayConfig, request: &Value, tx: Value) -> Vec<(Duration, Value)> {
    let now = Duration::ZERO;
    let sender = request["handle_id"].clone();
    let plugin_frame = |kind: &str, data: Value| {
        json!({
            "janus": kind,
            "transaction": tx,
            "sender": sender,
            "plugindata": {"plugin": STREAMING_PLUGIN, "data": data}
        })
    };

    match request["body"]["request"].as_str() {
        Some("list") => {
            let list: Vec<Value> = cfg
                .streams
                .iter()
                .map(|(id, description)| match description {
                    Some(d) => json!({"id": id, "description": d, "type": "live"}),
                    None => json!({"id": id, "type": "live"}),
                })
                .collect();
            vec![(
                now,
                plugin_frame("success", json!({"streaming": "list", "list": list})),
            )]
        }
        Some("watch") => {
            let id = request["body"]["id"].as_u64().unwrap_or_default();
            let mut out = vec![(now, json!({"janus": "ack", "transaction": tx}))];
            let known = cfg.streams.iter().any(|(s, _)| *s == id);

            if cfg.silent_sources.contains(&id) {
                return out;
            }
            let delay = cfg
                .watch_delays
                .iter()
                .find(|(s, _)| *s == id)
                .map(|(_, d)| *d)
                .unwrap_or(now);
            let data = if known && !cfg.rejected_sources.contains(&id) {
                json!({"streaming": "event", "result": {"status": "preparing"}})
            } else {
                json!({
                    "streaming": "event",
                    "error_code": 455,
                    "error": format!("No such mountpoint/stream {id}")
                })
            };
            out.push((delay, plugin_frame("event", data)));
            out
        }
        _ => vec![(
            now,
            plugin_frame(
                "success",
                json!({"streaming": "event", "error_code": 452, "error": "Unknown request"}),
            ),
        )],
    }
}
