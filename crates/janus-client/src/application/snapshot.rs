//! Snapshot orchestrator: one capture per requested source, all at once.
//!
//! For every known source in the request the orchestrator
//!
//! 1. binds a streaming handle to the source (first capture only),
//! 2. sends `watch` with `snapshot: true` and waits for the plugin's event,
//! 3. asks the [`CaptureBackend`] for the image bytes,
//! 4. hands them to the [`SnapshotSink`] on the blocking pool.
//!
//! The per-source pipelines run concurrently and are joined at the end, so
//! a slow or silent source only ever costs its own deadline.  A failure at
//! any step is recorded for that source alone; partial success is a normal
//! result, not an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Local;
use futures_util::future::join_all;
use janus_core::{CaptureSelection, SnapshotArtifact, SourceId};
use tracing::{debug, info, warn};

use crate::application::error::{GatewayError, Result};
use crate::application::ports::{CaptureBackend, SnapshotSink};
use crate::application::session::{GatewaySession, LiveSession};

/// Outcome of one capture call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotReport {
    /// One entry per known source that was captured from.
    pub outcomes: BTreeMap<SourceId, std::result::Result<SnapshotArtifact, GatewayError>>,
    /// Requested ids the connection never discovered.
    pub skipped: Vec<SourceId>,
}

impl SnapshotReport {
    pub fn artifacts(&self) -> impl Iterator<Item = &SnapshotArtifact> {
        self.outcomes.values().filter_map(|r| r.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (SourceId, &GatewayError)> {
        self.outcomes
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (*id, e)))
    }

    /// True when nothing was attempted.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Drives concurrent captures on the session's current connection.
pub struct SnapshotOrchestrator {
    session: Arc<GatewaySession>,
    backend: Arc<dyn CaptureBackend>,
    sink: Arc<dyn SnapshotSink>,
}

impl SnapshotOrchestrator {
    pub fn new(
        session: Arc<GatewaySession>,
        backend: Arc<dyn CaptureBackend>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        Self {
            session,
            backend,
            sink,
        }
    }

    /// Captures one snapshot from each requested source.
    ///
    /// Duplicate ids are captured once; ids the gateway never listed are
    /// reported in [`SnapshotReport::skipped`].  An empty or fully unknown
    /// request completes immediately without touching the network.
    ///
    /// # Errors
    ///
    /// [`GatewayError::State`] when the session is not `Ready`.  Per-source
    /// failures are inside the report.
    pub async fn capture(&self, requested: &[SourceId]) -> Result<SnapshotReport> {
        let live = self.session.live()?;
        let selection = CaptureSelection::resolve(requested, |id| live.slot(id).is_some());

        if !selection.skipped.is_empty() {
            debug!("skipping unknown sources {:?}", selection.skipped);
        }
        if selection.is_empty() {
            return Ok(SnapshotReport {
                outcomes: BTreeMap::new(),
                skipped: selection.skipped,
            });
        }

        info!("capturing from {} source(s)", selection.targets.len());
        let jobs = selection.targets.iter().map(|&id| {
            let live = &live;
            async move { (id, self.capture_one(live, id).await) }
        });
        let outcomes: BTreeMap<_, _> = join_all(jobs).await.into_iter().collect();

        for (id, outcome) in &outcomes {
            match outcome {
                Ok(artifact) => info!("source {id}: saved {}", artifact.path.display()),
                Err(e) => warn!("source {id}: {e}"),
            }
        }

        Ok(SnapshotReport {
            outcomes,
            skipped: selection.skipped,
        })
    }

    async fn capture_one(&self, live: &LiveSession, id: SourceId) -> Result<SnapshotArtifact> {
        let slot = live
            .slot(id)
            .ok_or_else(|| GatewayError::State(format!("source {id} is not on this connection")))?;

        let handle = live.handle_for(slot).await?;
        live.watch(handle, id).await?;

        let descriptor = slot.descriptor();
        let bytes = self.backend.grab(&descriptor).await?;
        let size = bytes.len();

        let sink = Arc::clone(&self.sink);
        let taken_at = Local::now();
        let path = tokio::task::spawn_blocking(move || sink.save(id, taken_at, &bytes))
            .await
            .map_err(|e| GatewayError::Storage(format!("save task failed: {e}")))??;

        Ok(SnapshotArtifact {
            source_id: id,
            path,
            bytes: size,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
