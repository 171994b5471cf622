//! Callback façade for front-ends that run their own thread of control.
//!
//! A UI toolkit owns its main thread and must not block it on network I/O,
//! but it also must not be called from arbitrary runtime threads.
//! [`JanusClient`] solves both sides:
//!
//! - every entry point (`connect`, `disconnect`, `take_snapshot`) returns
//!   immediately after spawning its work on the client's own Tokio runtime;
//! - every callback (results, errors, status changes, gateway events) is
//!   *posted* to a [`CompletionQueue`] instead of being run in place, and the
//!   front-end runs them on its own thread by calling
//!   [`CompletionPump::pump`] from its event loop (or
//!   [`CompletionPump::pump_blocking`] when it has nothing else to do).
//!
//! ```text
//! UI thread                 client runtime                     gateway
//! ─────────────────────────────────────────────────────────────────────
//! connect(…, ok, err) ───▶  GatewaySession::connect ─────────▶  create/attach/list
//!                           status "Connecting..." ─┐
//!                           result ────────────────┐│
//! pump() ◀── queue ◀───────────────────────────────┴┘
//!   └─ on_status(…), ok(sources)
//! ```
//!
//! Completions run in the order they were posted, so a status change caused
//! by an operation is always seen before that operation's own callback.
//!
//! # DTOs
//!
//! [`ClientStatusDto`], [`SnapshotReportDto`] and the
//! [`ClientCommandResult`] envelope are plain serializable snapshots for
//! front-ends that talk JSON (the CLI's `--json` output uses them):
//! ```json
//! { "success": true,  "data": {...}, "error": null  }
//! { "success": false, "data": null,  "error": "..."  }
//! ```

use std::sync::Arc;

use janus_core::protocol::GatewayEvent;
use janus_core::{
    ConnectionState, GatewayEndpoint, SessionConfig, SourceDescriptor, SourceId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::application::error::GatewayError;
use crate::application::ports::{
    CaptureBackend, Connector, SessionObserver, SnapshotSink, StatusUpdate,
};
use crate::application::{GatewaySession, SnapshotOrchestrator, SnapshotReport};

// ── Completion marshaling ─────────────────────────────────────────────────────

type Completion = Box<dyn FnOnce() + Send>;

/// Posting side of the completion queue.  Cheap to clone.
#[derive(Clone)]
pub struct CompletionQueue {
    tx: mpsc::UnboundedSender<Completion>,
}

impl CompletionQueue {
    /// Queues `job` to run on the pumping thread.
    ///
    /// A job posted after the pump is gone is dropped unrun.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            debug!("completion dropped: pump is gone");
        }
    }
}

/// Running side of the completion queue; lives on the front-end's thread.
pub struct CompletionPump {
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl CompletionPump {
    /// Runs every completion that is ready now and returns how many ran.
    pub fn pump(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Waits for the next completion and runs it.
    ///
    /// Returns `false` once every [`CompletionQueue`] is gone.  Must not be
    /// called from inside a Tokio runtime.
    pub fn pump_blocking(&mut self) -> bool {
        match self.rx.blocking_recv() {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}

/// Creates a connected queue/pump pair.
pub fn completion_channel() -> (CompletionQueue, CompletionPump) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CompletionQueue { tx }, CompletionPump { rx })
}

// ── DTOs ──────────────────────────────────────────────────────────────────────

/// One status change as the front-end sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatusDto {
    /// Lowercase state label, e.g. `"ready"`.
    pub connection_status: String,
    /// Human-readable progress line, e.g. `"Discovered 2 streams"`.
    pub message: String,
}

impl From<StatusUpdate> for ClientStatusDto {
    fn from(update: StatusUpdate) -> Self {
        Self {
            connection_status: update.state.to_string(),
            message: update.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDto {
    pub id: u64,
    pub name: String,
}

impl From<&SourceDescriptor> for SourceDto {
    fn from(source: &SourceDescriptor) -> Self {
        Self {
            id: source.id.0,
            name: source.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSnapshotDto {
    pub source_id: u64,
    pub path: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSnapshotDto {
    pub source_id: u64,
    pub error: String,
}

/// Flattened [`SnapshotReport`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReportDto {
    pub saved: Vec<SavedSnapshotDto>,
    pub failed: Vec<FailedSnapshotDto>,
    pub skipped: Vec<u64>,
}

impl From<&SnapshotReport> for SnapshotReportDto {
    fn from(report: &SnapshotReport) -> Self {
        Self {
            saved: report
                .artifacts()
                .map(|a| SavedSnapshotDto {
                    source_id: a.source_id.0,
                    path: a.path.display().to_string(),
                    bytes: a.bytes,
                })
                .collect(),
            failed: report
                .failures()
                .map(|(id, e)| FailedSnapshotDto {
                    source_id: id.0,
                    error: e.to_string(),
                })
                .collect(),
            skipped: report.skipped.iter().map(|id| id.0).collect(),
        }
    }
}

/// Unified response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientCommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ClientCommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

impl<T: Serialize> From<Result<T, GatewayError>> for ClientCommandResult<T> {
    fn from(result: Result<T, GatewayError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

// ── Observer ──────────────────────────────────────────────────────────────────

pub type StatusCallback = Arc<dyn Fn(ClientStatusDto) + Send + Sync>;
pub type EventCallback = Arc<dyn Fn(GatewayEvent) + Send + Sync>;

/// Forwards session notifications through the completion queue.
struct MarshalingObserver {
    queue: CompletionQueue,
    on_status: Option<StatusCallback>,
    on_event: Option<EventCallback>,
}

impl SessionObserver for MarshalingObserver {
    fn on_status(&self, update: StatusUpdate) {
        if let Some(callback) = &self.on_status {
            let callback = Arc::clone(callback);
            let dto = ClientStatusDto::from(update);
            self.queue.post(move || callback(dto));
        }
    }

    fn on_event(&self, event: GatewayEvent) {
        if let Some(callback) = &self.on_event {
            let callback = Arc::clone(callback);
            self.queue.post(move || callback(event));
        }
    }
}

// ── Client façade ─────────────────────────────────────────────────────────────

/// Everything a [`JanusClient`] is built from.
pub struct ClientOptions {
    pub session: SessionConfig,
    pub connector: Arc<dyn Connector>,
    pub capture: Arc<dyn CaptureBackend>,
    pub sink: Arc<dyn SnapshotSink>,
    pub on_status: Option<StatusCallback>,
    pub on_event: Option<EventCallback>,
}

/// A gateway client with a non-blocking, callback-based API.
///
/// Owns its Tokio runtime, so it can be created and driven from a thread
/// that has no runtime of its own.  Dropping it tears the runtime down
/// without a graceful `destroy`; call [`JanusClient::shutdown`] for that.
pub struct JanusClient {
    runtime: tokio::runtime::Runtime,
    queue: CompletionQueue,
    session: Arc<GatewaySession>,
    orchestrator: Arc<SnapshotOrchestrator>,
}

impl JanusClient {
    /// Builds the client and the pump its callbacks arrive on.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the runtime cannot be started.
    pub fn start(options: ClientOptions) -> std::io::Result<(Self, CompletionPump)> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("janus-client")
            .enable_all()
            .build()?;

        let (queue, pump) = completion_channel();
        let observer: Arc<dyn SessionObserver> = Arc::new(MarshalingObserver {
            queue: queue.clone(),
            on_status: options.on_status,
            on_event: options.on_event,
        });
        let session = Arc::new(GatewaySession::with_observer(
            options.session,
            options.connector,
            Some(observer),
        ));
        let orchestrator = Arc::new(SnapshotOrchestrator::new(
            Arc::clone(&session),
            options.capture,
            options.sink,
        ));

        Ok((
            Self {
                runtime,
                queue,
                session,
                orchestrator,
            },
            pump,
        ))
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Sources of the current connection; empty unless connected.
    pub fn sources(&self) -> Vec<SourceDescriptor> {
        self.session.sources()
    }

    /// Connects in the background.  Exactly one of the callbacks runs.
    pub fn connect(
        &self,
        host: impl Into<String>,
        port: u16,
        secure: bool,
        on_success: impl FnOnce(Vec<SourceDescriptor>) + Send + 'static,
        on_error: impl FnOnce(GatewayError) + Send + 'static,
    ) {
        let endpoint = GatewayEndpoint::new(host, port);
        let session = Arc::clone(&self.session);
        let queue = self.queue.clone();
        self.runtime.spawn(async move {
            let result = session.connect(&endpoint, secure).await;
            queue.post(move || match result {
                Ok(sources) => on_success(sources),
                Err(e) => on_error(e),
            });
        });
    }

    /// Disconnects in the background and runs `on_done` afterwards.
    pub fn disconnect(&self, on_done: impl FnOnce() + Send + 'static) {
        let session = Arc::clone(&self.session);
        let queue = self.queue.clone();
        self.runtime.spawn(async move {
            session.disconnect().await;
            queue.post(on_done);
        });
    }

    /// Captures from `sources` in the background.  Exactly one of the
    /// callbacks runs; per-source failures are inside the report.
    pub fn take_snapshot(
        &self,
        sources: Vec<SourceId>,
        on_success: impl FnOnce(SnapshotReport) + Send + 'static,
        on_error: impl FnOnce(GatewayError) + Send + 'static,
    ) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let queue = self.queue.clone();
        self.runtime.spawn(async move {
            let result = orchestrator.capture(&sources).await;
            queue.post(move || match result {
                Ok(report) => on_success(report),
                Err(e) => on_error(e),
            });
        });
    }

    /// Disconnects gracefully, then stops the runtime.
    ///
    /// Blocks the calling thread; must not be called from inside a Tokio
    /// runtime.  Completions posted meanwhile stay in the pump.
    pub fn shutdown(self) {
        let grace = self.session.config().control_timeout;
        self.runtime.block_on(self.session.disconnect());
        self.runtime.shutdown_timeout(grace);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
