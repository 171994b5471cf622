//! Transaction registry: correlates replies with the requests that caused them.
//!
//! # How a request is correlated (for beginners)
//!
//! 1. [`TransactionRegistry::begin`] allocates a fresh [`TransactionId`] and
//!    parks a `oneshot` sender under it.
//! 2. The caller sends the request and awaits [`PendingTransaction::wait`].
//! 3. The receive loop decodes a reply and calls
//!    [`TransactionRegistry::resolve`], which removes the entry and sends the
//!    payload through the `oneshot`.
//!
//! # Exactly-once completion
//!
//! Three paths can complete an entry: `resolve` (a reply arrived), `expire`
//! (its deadline passed) and `cancel_all` (the connection went away).  Each
//! path removes the entry from the map and sends on its `oneshot` while
//! holding the map lock, so whichever path removes the entry is the only one
//! that ever sends.  A waiter whose deadline fires after a reply was already
//! delivered finds nothing to expire and reads the delivered reply instead.
//!
//! # Acknowledgements
//!
//! Some requests (`keepalive`, `destroy`) are finished once the gateway
//! acknowledges them.  Plugin requests like a snapshot `watch` are answered
//! with an `ack` first and the real result later as an `event` carrying the
//! same transaction; for those the `ack` is ignored and the entry stays
//! pending.  The policy is chosen per request with [`AckPolicy`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use janus_core::protocol::{Reply, ReplyPayload};
use janus_core::{TransactionId, TransactionIdAllocator};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::application::error::GatewayError;

/// How an `ack` reply is treated for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    /// The `ack` completes the transaction with an empty payload.
    Final,
    /// The `ack` is a receipt; completion waits for the matching `event`.
    AwaitEvent,
}

/// What [`TransactionRegistry::resolve`] did with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The reply completed a pending transaction.
    Delivered,
    /// An `ack` for a transaction that waits for its event.
    AckIgnored,
    /// No pending transaction has this id (late, expired or never issued).
    Unknown,
}

type Outcome = Result<ReplyPayload, GatewayError>;

struct Entry {
    policy: AckPolicy,
    sender: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct Table {
    pending: HashMap<TransactionId, Entry>,
    /// Set once by `cancel_all`; later `begin` calls fail with it.
    closed: Option<GatewayError>,
}

/// Pending transactions of one connection.
pub struct TransactionRegistry {
    ids: TransactionIdAllocator,
    table: Mutex<Table>,
}

impl TransactionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ids: TransactionIdAllocator::new(),
            table: Mutex::new(Table::default()),
        })
    }

    /// A poisoned lock only means another thread panicked mid-update of a
    /// `HashMap`; the map itself is still consistent.
    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new pending transaction.
    ///
    /// # Errors
    ///
    /// Fails with the teardown reason once [`cancel_all`](Self::cancel_all)
    /// has run, so nothing can wait on a connection that is already gone.
    pub fn begin(self: &Arc<Self>, policy: AckPolicy) -> Result<PendingTransaction, GatewayError> {
        let (sender, receiver) = oneshot::channel();
        let id = self.ids.next();
        {
            let mut table = self.table();
            if let Some(reason) = &table.closed {
                return Err(reason.clone());
            }
            table.pending.insert(id, Entry { policy, sender });
        }
        Ok(PendingTransaction {
            id,
            receiver,
            registry: Arc::clone(self),
        })
    }

    /// Routes a decoded reply to its waiter.
    pub fn resolve(&self, id: TransactionId, reply: Reply) -> Resolution {
        let mut table = self.table();
        let Some(entry) = table.pending.get(&id) else {
            return Resolution::Unknown;
        };

        let outcome = match reply {
            Reply::Ack if entry.policy == AckPolicy::AwaitEvent => return Resolution::AckIgnored,
            Reply::Ack => Ok(ReplyPayload::default()),
            Reply::Success(payload) | Reply::Event(payload) => Ok(payload),
            Reply::Error(rejection) => Err(GatewayError::from(rejection)),
        };

        if let Some(entry) = table.pending.remove(&id) {
            // The waiter may have been dropped; nothing else to do then.
            let _ = entry.sender.send(outcome);
        }
        Resolution::Delivered
    }

    /// Fails `id` with a timeout if it is still pending.
    ///
    /// Returns `false` when another path already completed it.
    pub fn expire(&self, id: TransactionId, after: Duration) -> bool {
        let mut table = self.table();
        match table.pending.remove(&id) {
            Some(entry) => {
                let _ = entry.sender.send(Err(GatewayError::Timeout(after)));
                true
            }
            None => false,
        }
    }

    /// Fails every pending transaction with `reason` and refuses new ones.
    ///
    /// Returns how many transactions were cancelled.
    pub fn cancel_all(&self, reason: GatewayError) -> usize {
        let mut table = self.table();
        let drained: Vec<_> = table.pending.drain().collect();
        table.closed.get_or_insert(reason.clone());
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.sender.send(Err(reason.clone()));
        }
        count
    }

    /// Removes an entry whose waiter went away without completing.
    fn forget(&self, id: TransactionId) {
        if self.table().pending.remove(&id).is_some() {
            debug!("removed abandoned transaction {id}");
        }
    }

    /// Number of transactions still awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.table().pending.len()
    }

    /// Number of transaction ids issued on this connection.
    pub fn issued(&self) -> u64 {
        self.ids.issued()
    }
}

/// A registered transaction awaiting its reply.
///
/// Dropping it before completion removes the registry entry, so a caller
/// that gives up never leaves a stale waiter behind.
pub struct PendingTransaction {
    id: TransactionId,
    receiver: oneshot::Receiver<Outcome>,
    registry: Arc<TransactionRegistry>,
}

impl PendingTransaction {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Waits for the reply, failing with [`GatewayError::Timeout`] after
    /// `deadline`.
    pub async fn wait(mut self, deadline: Duration) -> Outcome {
        match tokio::time::timeout(deadline, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(GatewayError::Transport(
                "transaction dropped without a reply".to_string(),
            )),
            Err(_) => {
                if self.registry.expire(self.id, deadline) {
                    warn!("transaction {} timed out after {deadline:?}", self.id);
                }
                // Whichever path removed the entry has already sent.
                self.receiver
                    .try_recv()
                    .unwrap_or(Err(GatewayError::Timeout(deadline)))
            }
        }
    }
}

impl Drop for PendingTransaction {
    fn drop(&mut self) {
        self.registry.forget(self.id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
