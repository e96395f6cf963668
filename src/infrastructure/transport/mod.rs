//! Transport seam between a charger session and the Central System
//!
//! A session never talks to a socket directly. It asks a
//! [`TransportConnector`] for a [`TransportLink`], pushes outbound text
//! frames into it and consumes [`TransportEvent`]s from it. Dropping the
//! link closes the underlying connection.

pub mod loopback;
pub mod websocket;

use tokio::sync::mpsc;

use crate::domain::{SimResult, SimulatorError};

pub use loopback::{LoopbackConnector, LoopbackPeer};
pub use websocket::{build_ocpp_url, WsConnector};

/// Connection-level events delivered to the owning session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is established and frames can flow.
    Opened,
    /// An inbound text frame.
    Message(String),
    /// The remote side closed the connection.
    Closed(Option<String>),
    /// Connecting or I/O failed; the connection is gone.
    Failed(String),
}

/// Owned handle to one connection.
///
/// Exclusively owned by a session and replaced, never reused, on reconnect.
#[derive(Debug)]
pub struct TransportLink {
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, events }
    }

    /// Queue a text frame for the remote side.
    pub fn send(&self, text: String) -> SimResult<()> {
        self.outbound
            .send(text)
            .map_err(|_| SimulatorError::Transport("connection closed".to_string()))
    }

    /// Next connection event; `None` once the I/O side has gone away.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// Opens connections to the Central System on behalf of a charger.
///
/// `open` must not block: the connection is established in the background
/// and reported through [`TransportEvent::Opened`] or [`TransportEvent::Failed`].
pub trait TransportConnector: Send + Sync + 'static {
    fn open(&self, charger_id: &str) -> TransportLink;
}
