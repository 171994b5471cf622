//! Session state machine: connect, discover, stay alive, disconnect.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──open (secure, then plain once)──▶ Connecting
//! Connecting   ──create──────────────────────────▶ SessionEstablished
//! SessionEstablished ──attach streaming + list───▶ SourcesDiscovered
//! SourcesDiscovered ─────────────────────────────▶ Ready
//! Ready ──disconnect──▶ Disconnecting ──▶ Disconnected
//! ```
//!
//! Any failure while connecting drops straight back to `Disconnected` and
//! the caller gets the reason; nothing half-built stays visible.  Once
//! `Ready`, a lost connection (socket closed, keepalive refused, gateway
//! session timeout) also ends in `Disconnected`.  There is no automatic
//! reconnect.
//!
//! # Serialization
//!
//! `connect` and `disconnect` take the lifecycle lock, so transitions never
//! interleave.  The current phase lives behind a short-lived `std` mutex so
//! that captures and status reads never wait for a connect in progress.
//! A `disconnect` issued while a connect is still running closes that
//! connect's link first, which makes the pending handshake requests fail
//! immediately instead of running into their deadlines.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use janus_core::protocol::{EventKind, GatewayEvent, ReplyPayload};
use janus_core::{
    ConnectAttempt, ConnectionState, GatewayEndpoint, HandleId, PluginRequest, Request,
    SessionConfig, SessionId, SourceDescriptor, SourceId,
};
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

use crate::application::error::{GatewayError, Result};
use crate::application::link::Link;
use crate::application::ports::{Connector, SessionObserver, StatusUpdate, TransportParts};
use crate::application::transactions::AckPolicy;

// ── Live session ──────────────────────────────────────────────────────────────

/// A discovered source plus its lazily attached streaming handle.
pub(crate) struct SourceSlot {
    descriptor: SourceDescriptor,
    handle: OnceCell<HandleId>,
}

impl SourceSlot {
    fn new(descriptor: SourceDescriptor) -> Self {
        Self {
            descriptor,
            handle: OnceCell::new(),
        }
    }

    /// The descriptor with its handle filled in if one is bound.
    pub(crate) fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            handle: self.handle.get().copied(),
            ..self.descriptor.clone()
        }
    }
}

/// Everything that exists only while `Ready`.
pub struct LiveSession {
    link: Arc<Link>,
    session_id: SessionId,
    listing_handle: HandleId,
    sources: Vec<SourceSlot>,
    config: SessionConfig,
}

impl LiveSession {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn listing_handle(&self) -> HandleId {
        self.listing_handle
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Discovered sources in gateway order.
    pub fn sources(&self) -> Vec<SourceDescriptor> {
        self.sources.iter().map(SourceSlot::descriptor).collect()
    }

    pub(crate) fn slot(&self, id: SourceId) -> Option<&SourceSlot> {
        self.sources.iter().find(|s| s.descriptor.id == id)
    }

    /// The streaming handle bound to `slot`, attaching one on first use.
    ///
    /// Concurrent callers for the same source share a single `attach`; if it
    /// fails the next caller tries again.
    pub(crate) async fn handle_for(&self, slot: &SourceSlot) -> Result<HandleId> {
        let handle = slot
            .handle
            .get_or_try_init(|| {
                attach(
                    &self.link,
                    self.session_id,
                    &self.config.listing_plugin,
                    self.config.control_timeout,
                )
            })
            .await?;
        Ok(*handle)
    }

    /// Asks the plugin behind `handle` for a snapshot of `source` and waits
    /// for the matching event.
    pub(crate) async fn watch(&self, handle: HandleId, source: SourceId) -> Result<ReplyPayload> {
        let session = self.session_id;
        self.link
            .request(
                |tx| {
                    Request::message(
                        tx,
                        session,
                        handle,
                        PluginRequest::Watch {
                            id: source,
                            snapshot: true,
                        },
                    )
                },
                AckPolicy::AwaitEvent,
                self.config.capture_timeout,
            )
            .await
    }
}

async fn attach(
    link: &Link,
    session: SessionId,
    plugin: &str,
    deadline: Duration,
) -> Result<HandleId> {
    let reply = link
        .request(
            |tx| Request::attach(tx, session, plugin),
            AckPolicy::Final,
            deadline,
        )
        .await?;
    let handle = reply
        .data_id()
        .map(HandleId)
        .ok_or_else(|| GatewayError::malformed_reply("a handle id"))?;
    debug!("attached {plugin} as handle {handle} in session {session}");
    Ok(handle)
}

// ── Phase ─────────────────────────────────────────────────────────────────────

enum Phase {
    Disconnected,
    Connecting { link: Option<Arc<Link>> },
    SessionEstablished { session: SessionId, link: Arc<Link> },
    SourcesDiscovered { session: SessionId, link: Arc<Link> },
    Ready(Arc<LiveSession>),
    Disconnecting,
}

impl Phase {
    fn state(&self) -> ConnectionState {
        match self {
            Phase::Disconnected => ConnectionState::Disconnected,
            Phase::Connecting { .. } => ConnectionState::Connecting,
            Phase::SessionEstablished { .. } => ConnectionState::SessionEstablished,
            Phase::SourcesDiscovered { .. } => ConnectionState::SourcesDiscovered,
            Phase::Ready(_) => ConnectionState::Ready,
            Phase::Disconnecting => ConnectionState::Disconnecting,
        }
    }

    fn session_id(&self) -> Option<SessionId> {
        match self {
            Phase::SessionEstablished { session, .. } | Phase::SourcesDiscovered { session, .. } => {
                Some(*session)
            }
            Phase::Ready(live) => Some(live.session_id),
            _ => None,
        }
    }

    /// The link of a connect that has not reached `Ready` yet.
    fn setup_link(&self) -> Option<Arc<Link>> {
        match self {
            Phase::Connecting { link } => link.clone(),
            Phase::SessionEstablished { link, .. } | Phase::SourcesDiscovered { link, .. } => {
                Some(Arc::clone(link))
            }
            _ => None,
        }
    }
}

/// State shared with the background tasks of a live session.
struct Shared {
    phase: Mutex<Phase>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl Shared {
    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, state: ConnectionState, message: String) {
        info!("{message}");
        if let Some(observer) = &self.observer {
            observer.on_status(StatusUpdate { state, message });
        }
    }

    /// Replaces the phase and announces it.
    fn transition(&self, next: Phase, message: impl Into<String>) {
        let state = next.state();
        *self.phase() = next;
        self.notify(state, message.into());
    }

    /// Replaces the phase without a notification.
    fn replace(&self, next: Phase) {
        *self.phase() = next;
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One client's connection to one gateway.
///
/// Independent instances never share state, so several clients can live in
/// one process.
pub struct GatewaySession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl GatewaySession {
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        Self::with_observer(config, connector, None)
    }

    pub fn with_observer(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> Self {
        Self {
            config,
            connector,
            shared: Arc::new(Shared {
                phase: Mutex::new(Phase::Disconnected),
                observer,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.phase().state()
    }

    /// The gateway session id, present from `SessionEstablished` until the
    /// connection is torn down.
    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.phase().session_id()
    }

    /// Sources of the current connection; empty unless `Ready`.
    pub fn sources(&self) -> Vec<SourceDescriptor> {
        match &*self.shared.phase() {
            Phase::Ready(live) => live.sources(),
            _ => Vec::new(),
        }
    }

    /// The live session, or [`GatewayError::State`] when not `Ready`.
    pub fn live(&self) -> Result<Arc<LiveSession>> {
        match &*self.shared.phase() {
            Phase::Ready(live) if !live.link.is_closed() => Ok(Arc::clone(live)),
            Phase::Ready(_) => Err(GatewayError::State("connection lost".to_string())),
            other => Err(GatewayError::State(format!(
                "not connected (currently {})",
                other.state()
            ))),
        }
    }

    /// Connects to `endpoint`, creates a session and discovers its sources.
    ///
    /// When `secure` is requested and the TLS connection cannot be opened,
    /// one plain-text attempt follows against the same host and port.
    ///
    /// # Errors
    ///
    /// [`GatewayError::State`] if already connected; otherwise whatever
    /// failed first (transport, rejection or timeout).
    pub async fn connect(
        &self,
        endpoint: &GatewayEndpoint,
        secure: bool,
    ) -> Result<Vec<SourceDescriptor>> {
        let _turn = self.lifecycle.lock().await;
        {
            let phase = self.shared.phase();
            if !matches!(*phase, Phase::Disconnected) {
                return Err(GatewayError::State(format!(
                    "cannot connect while {}",
                    phase.state()
                )));
            }
        }
        self.shared
            .transition(Phase::Connecting { link: None }, "Connecting...");

        let parts = match self.open_transport(endpoint, secure).await {
            Ok(parts) => parts,
            Err(e) => return Err(self.fail_connect(None, e)),
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = Link::start(parts, events_tx);
        self.shared.replace(Phase::Connecting {
            link: Some(Arc::clone(&link)),
        });
        info!("connection {} open to {endpoint}", link.id());

        let live = match self.establish(&link).await {
            Ok(_) if link.is_closed() => {
                let e = GatewayError::Transport("connection closed during setup".to_string());
                return Err(self.fail_connect(Some(&link), e));
            }
            Ok(live) => Arc::new(live),
            Err(e) => return Err(self.fail_connect(Some(&link), e)),
        };

        let sources = live.sources();
        self.shared
            .transition(Phase::Ready(Arc::clone(&live)), "Connected");
        self.spawn_watchers(live, events_rx);
        Ok(sources)
    }

    async fn open_transport(
        &self,
        endpoint: &GatewayEndpoint,
        secure: bool,
    ) -> Result<TransportParts> {
        let mut attempt = ConnectAttempt::first(secure);
        loop {
            let url = endpoint.url(attempt.secure());
            debug!("opening {url}");
            let opened = tokio::time::timeout(
                self.config.connect_timeout,
                self.connector.open(endpoint, attempt.secure()),
            )
            .await
            .unwrap_or_else(|_| {
                Err(GatewayError::Transport(format!(
                    "timed out after {:?} opening {url}",
                    self.config.connect_timeout
                )))
            });

            match opened {
                Ok(parts) => return Ok(parts),
                Err(e) => match attempt.after_failure() {
                    Some(next) => {
                        warn!("could not open {url}: {e}; retrying without TLS");
                        self.shared.notify(
                            ConnectionState::Connecting,
                            "Retrying without SSL...".to_string(),
                        );
                        attempt = next;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    async fn establish(&self, link: &Arc<Link>) -> Result<LiveSession> {
        let control = self.config.control_timeout;

        let created = link.request(Request::create, AckPolicy::Final, control).await?;
        let session = created
            .data_id()
            .map(SessionId)
            .ok_or_else(|| GatewayError::malformed_reply("a session id"))?;
        self.shared.transition(
            Phase::SessionEstablished {
                session,
                link: Arc::clone(link),
            },
            "Session created",
        );

        let listing_handle = attach(link, session, &self.config.listing_plugin, control).await?;
        let listed = link
            .request(
                |tx| Request::message(tx, session, listing_handle, PluginRequest::List),
                AckPolicy::AwaitEvent,
                control,
            )
            .await?;
        let entries = listed
            .stream_list()
            .ok_or_else(|| GatewayError::malformed_reply("a stream list"))?;

        let mut seen = HashSet::new();
        let sources: Vec<SourceSlot> = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.id))
            .map(|entry| {
                SourceSlot::new(SourceDescriptor::from_listing(
                    entry.id,
                    entry.description.as_deref(),
                ))
            })
            .collect();

        self.shared.transition(
            Phase::SourcesDiscovered {
                session,
                link: Arc::clone(link),
            },
            format!("Discovered {} streams", sources.len()),
        );

        Ok(LiveSession {
            link: Arc::clone(link),
            session_id: session,
            listing_handle,
            sources,
            config: self.config.clone(),
        })
    }

    fn fail_connect(&self, link: Option<&Arc<Link>>, e: GatewayError) -> GatewayError {
        if let Some(link) = link {
            link.shut_down(e.clone());
        }
        warn!("connect failed: {e}");
        self.shared
            .transition(Phase::Disconnected, format!("Connection failed: {e}"));
        e
    }

    /// Background tasks of a `Ready` session: loss supervision, event
    /// forwarding and keepalives.  All of them end with the link.
    fn spawn_watchers(&self, live: Arc<LiveSession>, events: mpsc::UnboundedReceiver<GatewayEvent>) {
        tokio::spawn(supervise(Arc::clone(&self.shared), Arc::clone(&live)));
        tokio::spawn(forward_events(
            Arc::clone(&self.shared),
            Arc::clone(&live.link),
            live.session_id,
            events,
        ));
        if let Some(interval) = self.config.keepalive_interval {
            tokio::spawn(keep_alive(
                Arc::clone(&live.link),
                live.session_id,
                interval,
                self.config.control_timeout,
            ));
        }
    }

    /// Ends the session and closes the connection.
    ///
    /// A `destroy` is queued for the gateway ahead of the close.  Every
    /// transaction still pending fails with a transport error.  Calling this
    /// while already disconnected does nothing.
    pub async fn disconnect(&self) {
        let in_setup = self.shared.phase().setup_link();
        if let Some(link) = in_setup {
            link.shut_down(GatewayError::Transport(
                "connect cancelled by disconnect".to_string(),
            ));
        }

        let _turn = self.lifecycle.lock().await;
        let live = {
            let mut phase = self.shared.phase();
            match std::mem::replace(&mut *phase, Phase::Disconnecting) {
                Phase::Ready(live) => live,
                other => {
                    *phase = other;
                    return;
                }
            }
        };
        self.shared.notify(
            ConnectionState::Disconnecting,
            "Disconnecting...".to_string(),
        );

        let session = live.session_id;
        if let Err(e) = live.link.post(|tx| Request::destroy(tx, session)) {
            debug!("not sending destroy for session {session}: {e}");
        }
        live.link
            .shut_down(GatewayError::Transport("disconnected".to_string()));
        live.link.drained(self.config.control_timeout).await;

        self.shared.transition(Phase::Disconnected, "Disconnected");
    }
}

// ── Background tasks ──────────────────────────────────────────────────────────

/// Moves the session to `Disconnected` when its link dies on its own.
async fn supervise(shared: Arc<Shared>, live: Arc<LiveSession>) {
    live.link.closed().await;
    let lost = {
        let mut phase = shared.phase();
        let current = matches!(&*phase, Phase::Ready(ready) if Arc::ptr_eq(ready, &live));
        if current {
            *phase = Phase::Disconnected;
        }
        current
    };
    if lost {
        warn!("connection {} lost", live.link.id());
        shared.notify(ConnectionState::Disconnected, "Disconnected".to_string());
    }
}

async fn forward_events(
    shared: Arc<Shared>,
    link: Arc<Link>,
    session: SessionId,
    mut events: mpsc::UnboundedReceiver<GatewayEvent>,
) {
    while let Some(event) = events.recv().await {
        if event.kind == EventKind::Timeout && event.session_id == Some(session) {
            warn!("gateway expired session {session}");
            link.shut_down(GatewayError::Transport(format!(
                "gateway expired session {session}"
            )));
        }
        if let Some(observer) = &shared.observer {
            observer.on_event(event);
        }
    }
}

async fn keep_alive(link: Arc<Link>, session: SessionId, every: Duration, deadline: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = link.closed() => break,
            _ = ticker.tick() => {}
        }
        match link
            .request(|tx| Request::keepalive(tx, session), AckPolicy::Final, deadline)
            .await
        {
            Ok(_) => debug!("keepalive acknowledged for session {session}"),
            Err(e) if e.is_protocol() => {
                warn!("keepalive for session {session} refused: {e}");
                link.shut_down(GatewayError::Transport(format!("session lost: {e}")));
                break;
            }
            Err(e) if e.is_timeout() => warn!("keepalive for session {session}: {e}"),
            Err(_) => break,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::mock::{MockGateway, MockGatewayConfig};

    fn session(gateway: &MockGateway) -> GatewaySession {
        GatewaySession::new(
            SessionConfig {
                control_timeout: Duration::from_millis(300),
                keepalive_interval: None,
                ..SessionConfig::default()
            },
            Arc::new(gateway.clone()),
        )
    }

    #[test]
    fn test_phase_reports_public_state() {
        assert_eq!(Phase::Disconnected.state(), ConnectionState::Disconnected);
        assert_eq!(
            Phase::Connecting { link: None }.state(),
            ConnectionState::Connecting
        );
        assert_eq!(Phase::Disconnecting.state(), ConnectionState::Disconnecting);
        assert!(Phase::Connecting { link: None }.session_id().is_none());
    }

    #[test]
    fn test_new_session_is_disconnected_and_not_live() {
        // Arrange
        let gateway = MockGateway::new(MockGatewayConfig::default());

        // Act
        let session = session(&gateway);

        // Assert
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.sources().is_empty());
        assert!(session.live().is_err_and(|e| e.is_state()));
    }

    #[tokio::test]
    async fn test_duplicate_listed_ids_are_kept_once() {
        // Arrange
        let gateway = MockGateway::new(MockGatewayConfig {
            streams: vec![(4, Some("Deck".into())), (4, Some("Deck again".into())), (5, None)],
            ..MockGatewayConfig::default()
        });
        let session = session(&gateway);

        // Act
        let sources = session
            .connect(&GatewayEndpoint::new("gw", 8188), false)
            .await
            .unwrap();

        // Assert
        let ids: Vec<_> = sources.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![SourceId(4), SourceId(5)]);
        assert_eq!(sources[0].name, "Deck");
    }

    #[tokio::test]
    async fn test_listing_handle_is_attached_to_streaming_plugin() {
        let gateway = MockGateway::new(MockGatewayConfig::default());
        let session = session(&gateway);

        session
            .connect(&GatewayEndpoint::new("gw", 8188), false)
            .await
            .unwrap();

        let attach = gateway
            .requests()
            .into_iter()
            .find(|r| r["janus"] == "attach")
            .unwrap();
        assert_eq!(attach["plugin"], "janus.plugin.streaming");
        assert_eq!(session.live().unwrap().listing_handle(), HandleId(1002));
    }
}
