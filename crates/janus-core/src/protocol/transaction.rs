//! Transaction identifiers and the per-connection allocator that issues them.
//!
//! # What is a transaction? (for beginners)
//!
//! The gateway API is asynchronous: many requests can be in flight on one
//! WebSocket at the same time, and responses come back in whatever order the
//! gateway finishes them.  Every request therefore carries a `transaction`
//! string which the gateway copies into its reply, so the client can tell
//! which pending request a reply belongs to.
//!
//! # Uniqueness
//!
//! An identifier must never be handed out twice for the lifetime of one
//! connection, otherwise a late reply to an old request could be delivered to
//! a new one.  The allocator is an `AtomicU64` counter starting at 1; one
//! allocator is created per connection and dropped with it.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier correlating one request with its reply.
///
/// On the wire the identifier is a decimal string (`"transaction": "17"`);
/// in memory it is a plain `u64` so it is cheap to hash and copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Wraps a raw numeric identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TransactionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A thread-safe, monotonically increasing source of [`TransactionId`]s.
///
/// The first identifier issued is `1`.  The allocator is lock-free: two
/// tasks calling [`next`](Self::next) at the same time always receive
/// different values.
///
/// # Examples
///
/// ```rust
/// use janus_core::protocol::TransactionIdAllocator;
///
/// let ids = TransactionIdAllocator::new();
/// assert_eq!(ids.next().get(), 1);
/// assert_eq!(ids.next().get(), 2);
/// ```
#[derive(Debug)]
pub struct TransactionIdAllocator {
    next: AtomicU64,
}

impl TransactionIdAllocator {
    /// Creates an allocator whose first identifier is `1`.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a fresh identifier.
    ///
    /// `Ordering::Relaxed` is enough: the counter only has to be unique, it
    /// does not publish any other memory.
    pub fn next(&self) -> TransactionId {
        TransactionId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of identifiers issued so far.  Diagnostics only.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}

impl Default for TransactionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocator_starts_at_one() {
        // Arrange
        let ids = TransactionIdAllocator::new();

        // Act
        let first = ids.next();

        // Assert
        assert_eq!(first, TransactionId::new(1));
    }

    #[test]
    fn test_allocator_is_strictly_increasing() {
        let ids = TransactionIdAllocator::new();

        let values: Vec<u64> = (0..100).map(|_| ids.next().get()).collect();

        for window in values.windows(2) {
            assert!(window[1] > window[0], "ids must be strictly increasing");
        }
    }

    #[test]
    fn test_allocator_never_repeats_across_threads() {
        // Arrange
        let ids = Arc::new(TransactionIdAllocator::new());

        // Act – allocate from many threads simultaneously
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..500).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();
        let all: Vec<TransactionId> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert – pairwise distinct
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(unique.len(), all.len());
        assert_eq!(ids.issued(), 4000);
    }

    #[test]
    fn test_transaction_id_serializes_as_string() {
        let json = serde_json::to_string(&TransactionId::new(42)).unwrap();
        assert_eq!(json, "\"42\"");
    }

    #[test]
    fn test_transaction_id_rejects_non_numeric_string() {
        let result: Result<TransactionId, _> = serde_json::from_str("\"abc\"");
        assert!(result.is_err());
    }
}
