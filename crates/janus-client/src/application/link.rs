//! One live connection to the gateway: the writer task, the receive loop and
//! the transaction registry, bound together with a single teardown path.
//!
//! ```text
//!  request() ──▶ outbound queue ──▶ writer task ──▶ FrameSink ──▶ gateway
//!                                                                    │
//!  waiter ◀── TransactionRegistry ◀── receive loop ◀── FrameSource ◀─┘
//! ```
//!
//! Teardown can be triggered from several places at once: the caller
//! disconnecting, the receive loop seeing the socket close, the writer
//! failing, the keepalive being refused.  [`Link::shut_down`] is guarded by
//! an atomic flag so cleanup runs exactly once no matter who gets there
//! first; the losers simply return `false`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use janus_core::protocol::{encode_request, GatewayEvent, ReplyPayload};
use janus_core::{Request, TransactionId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::error::GatewayError;
use crate::application::ports::{FrameSink, TransportParts};
use crate::application::receive_loop;
use crate::application::transactions::{AckPolicy, TransactionRegistry};

/// Items queued for the writer task.
#[derive(Debug)]
enum Outbound {
    Frame(String),
    /// Flush what is queued ahead, then close the sink.
    Close,
}

/// A live connection.  Shared as `Arc<Link>` by the session, the receive
/// loop and every in-flight request.
pub struct Link {
    id: Uuid,
    registry: Arc<TransactionRegistry>,
    outbound: mpsc::UnboundedSender<Outbound>,
    torn_down: AtomicBool,
    closed: watch::Sender<bool>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Link {
    /// Takes ownership of a freshly opened transport and starts its writer
    /// task and receive loop.
    ///
    /// Unsolicited gateway events are forwarded on `events`; the sender is
    /// dropped when the receive loop exits.
    pub fn start(parts: TransportParts, events: mpsc::UnboundedSender<GatewayEvent>) -> Arc<Self> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let link = Arc::new(Self {
            id: Uuid::new_v4(),
            registry: TransactionRegistry::new(),
            outbound,
            torn_down: AtomicBool::new(false),
            closed,
            writer: Mutex::new(None),
        });

        let writer = tokio::spawn(run_writer(Arc::clone(&link), parts.sink, outbound_rx));
        if let Ok(mut slot) = link.writer.lock() {
            *slot = Some(writer);
        }
        tokio::spawn(receive_loop::run(Arc::clone(&link), parts.source, events));

        debug!("connection {} started", link.id);
        link
    }

    /// Identity of this connection, used in log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    /// Sends one request and waits for its reply.
    ///
    /// `build` receives the transaction id allocated for the request.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Transport`] if the connection is gone,
    /// [`GatewayError::Protocol`] if the gateway rejects the request,
    /// [`GatewayError::Timeout`] if no reply arrives within `deadline`.
    pub async fn request(
        &self,
        build: impl FnOnce(TransactionId) -> Request,
        policy: AckPolicy,
        deadline: Duration,
    ) -> Result<ReplyPayload, GatewayError> {
        let pending = self.registry.begin(policy)?;
        let request = build(pending.id());
        let verb = request.janus.as_str();
        let text = encode_request(&request)?;

        debug!("connection {}: -> {verb} (transaction {})", self.id, pending.id());
        self.enqueue(text)?;
        pending.wait(deadline).await
    }

    /// Sends a request without registering for its reply.
    ///
    /// Whatever the gateway answers is logged by the receive loop as a
    /// reply to an unknown transaction.
    pub fn post(&self, build: impl FnOnce(TransactionId) -> Request) -> Result<(), GatewayError> {
        // Burn an id from the same allocator so it is never reused.
        let pending = self.registry.begin(AckPolicy::Final)?;
        let request = build(pending.id());
        drop(pending);
        let text = encode_request(&request)?;
        debug!(
            "connection {}: -> {} (fire and forget)",
            self.id,
            request.janus.as_str()
        );
        self.enqueue(text)
    }

    fn enqueue(&self, text: String) -> Result<(), GatewayError> {
        if self.is_closed() {
            return Err(GatewayError::Transport("connection is closed".to_string()));
        }
        self.outbound
            .send(Outbound::Frame(text))
            .map_err(|_| GatewayError::Transport("writer task has stopped".to_string()))
    }

    /// Tears the connection down: fails every pending transaction with
    /// `reason`, closes the socket after the queued frames and wakes
    /// everything waiting on [`closed`](Self::closed).
    ///
    /// Returns `true` for the call that performed the teardown.
    pub fn shut_down(&self, reason: GatewayError) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        let cancelled = self.registry.cancel_all(reason.clone());
        let _ = self.outbound.send(Outbound::Close);
        self.closed.send_replace(true);
        info!(
            "connection {} closed ({reason}); {cancelled} pending transaction(s) cancelled",
            self.id
        );
        true
    }

    pub fn is_closed(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Completes once the connection has been torn down.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Waits up to `limit` for the writer to flush its queue and close the
    /// socket.  Used after a graceful disconnect.
    pub async fn drained(&self, limit: Duration) {
        let handle = self.writer.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if tokio::time::timeout(limit, handle).await.is_err() {
                warn!("connection {}: writer did not finish within {limit:?}", self.id);
            }
        }
    }
}

/// The only task that writes to the socket.
async fn run_writer(
    link: Arc<Link>,
    mut sink: Box<dyn FrameSink>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(item) = queue.recv().await {
        match item {
            Outbound::Frame(text) => {
                if let Err(e) = sink.send(text).await {
                    warn!("connection {}: write failed: {e}", link.id);
                    link.shut_down(e);
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    sink.close().await;
    debug!("connection {}: writer stopped", link.id);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
