//! Snapshot requests and their results.
//!
//! # Selecting targets
//!
//! A caller asks for a capture from a list of source ids.  Before anything
//! goes on the wire that list is normalised by [`CaptureSelection`]:
//!
//! - duplicates collapse to a single capture, keeping first-seen order;
//! - ids the current connection never discovered are set aside as
//!   `skipped` rather than reported as failures.
//!
//! The selection is pure so it can be tested without a gateway.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use crate::domain::sources::SourceId;

/// Where a successful capture ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotArtifact {
    pub source_id: SourceId,
    /// Path returned by the save sink.
    pub path: PathBuf,
    /// Size of the stored image in bytes.
    pub bytes: usize,
}

/// The normalised target list for one capture call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSelection {
    /// Known sources to capture from, each exactly once.
    pub targets: Vec<SourceId>,
    /// Requested ids with no matching source on this connection.
    pub skipped: Vec<SourceId>,
}

impl CaptureSelection {
    /// Splits `requested` into capture targets and skipped ids.
    ///
    /// `is_known` decides whether a source exists on the current
    /// connection.
    ///
    /// ```rust
    /// use janus_core::domain::{CaptureSelection, SourceId};
    ///
    /// let known = [SourceId(1), SourceId(2)];
    /// let sel = CaptureSelection::resolve(
    ///     &[SourceId(2), SourceId(3), SourceId(2), SourceId(1)],
    ///     |id| known.contains(&id),
    /// );
    /// assert_eq!(sel.targets, vec![SourceId(2), SourceId(1)]);
    /// assert_eq!(sel.skipped, vec![SourceId(3)]);
    /// ```
    pub fn resolve(requested: &[SourceId], is_known: impl Fn(SourceId) -> bool) -> Self {
        let mut seen = HashSet::with_capacity(requested.len());
        let mut selection = CaptureSelection::default();

        for &id in requested {
            if !seen.insert(id) {
                continue;
            }
            if is_known(id) {
                selection.targets.push(id);
            } else {
                selection.skipped.push(id);
            }
        }
        selection
    }

    /// True when nothing needs to be sent to the gateway.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
