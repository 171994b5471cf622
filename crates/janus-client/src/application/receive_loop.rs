//! The receive loop: the single reader of a connection.
//!
//! Every inbound frame is decoded and routed:
//!
//! - a reply with a transaction id goes to the transaction registry;
//! - a frame without one is an unsolicited event and goes to the event
//!   channel (dropped quietly if nobody listens);
//! - a reply nobody is waiting for is logged and dropped.
//!
//! The loop stops when the connection closes, a read fails or a frame cannot
//! be decoded, and in each case it runs the same teardown as an explicit
//! disconnect.  It also stops when the link is torn down from elsewhere.

use std::sync::Arc;

use janus_core::protocol::{decode_frame, GatewayEvent, InboundFrame};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::error::GatewayError;
use crate::application::link::Link;
use crate::application::ports::FrameSource;
use crate::application::transactions::Resolution;

pub(crate) async fn run(
    link: Arc<Link>,
    mut source: Box<dyn FrameSource>,
    events: mpsc::UnboundedSender<GatewayEvent>,
) {
    let failure = loop {
        let next = tokio::select! {
            _ = link.closed() => break None,
            next = source.next() => next,
        };

        match next {
            None => break Some(GatewayError::Transport("connection closed by gateway".into())),
            Some(Err(e)) => break Some(e),
            Some(Ok(text)) => match decode_frame(&text) {
                Ok(frame) => dispatch(&link, frame, &events),
                Err(e) => {
                    warn!("connection {}: undecodable frame: {e}", link.id());
                    break Some(GatewayError::from(e));
                }
            },
        }
    };

    if let Some(reason) = failure {
        link.shut_down(reason);
    }
    debug!("connection {}: receive loop stopped", link.id());
}

fn dispatch(link: &Link, frame: InboundFrame, events: &mpsc::UnboundedSender<GatewayEvent>) {
    match frame {
        InboundFrame::Reply { transaction, reply } => {
            match link.registry().resolve(transaction, reply) {
                Resolution::Delivered => debug!("connection {}: <- reply {transaction}", link.id()),
                Resolution::AckIgnored => {
                    debug!("connection {}: <- ack {transaction}, awaiting event", link.id())
                }
                Resolution::Unknown => debug!(
                    "connection {}: dropping reply for unknown transaction {transaction}",
                    link.id()
                ),
            }
        }
        InboundFrame::Event(event) => {
            debug!("connection {}: <- event {:?}", link.id(), event.kind);
            let _ = events.send(event);
        }
        InboundFrame::Stray { transaction, kind } => {
            warn!(
                "connection {}: dropping {kind} with foreign transaction {transaction:?}",
                link.id()
            );
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
