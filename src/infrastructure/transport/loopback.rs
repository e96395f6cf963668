//! In-process transport
//!
//! Every `open` hands the remote end of the new link to the owner of the
//! connector as a [`LoopbackPeer`]. The peer sees the frames a charger sends
//! and can inject results, errors, calls and disconnects. Used by the test
//! suites and by embedders driving simulated chargers without a network.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::{TransportConnector, TransportEvent, TransportLink};
use crate::support::ocpp_frame::OcppFrame;

pub struct LoopbackConnector {
    peers: mpsc::UnboundedSender<LoopbackPeer>,
    auto_open: bool,
}

impl LoopbackConnector {
    /// Links report `Opened` immediately.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LoopbackPeer>) {
        Self::build(true)
    }

    /// Links stay in the connecting phase until [`LoopbackPeer::open`] is called.
    pub fn manual() -> (Self, mpsc::UnboundedReceiver<LoopbackPeer>) {
        Self::build(false)
    }

    fn build(auto_open: bool) -> (Self, mpsc::UnboundedReceiver<LoopbackPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (Self { peers, auto_open }, rx)
    }
}

impl TransportConnector for LoopbackConnector {
    fn open(&self, charger_id: &str) -> TransportLink {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        if self.auto_open {
            let _ = events_tx.send(TransportEvent::Opened);
        }

        let _ = self.peers.send(LoopbackPeer {
            charger_id: charger_id.to_string(),
            frames: outbound_rx,
            events: events_tx,
        });

        TransportLink::new(outbound_tx, events_rx)
    }
}

/// Remote end of a loopback link, standing in for the Central System.
#[derive(Debug)]
pub struct LoopbackPeer {
    charger_id: String,
    frames: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl LoopbackPeer {
    pub fn charger_id(&self) -> &str {
        &self.charger_id
    }

    /// Complete the connection handshake.
    pub fn open(&self) -> bool {
        self.events.send(TransportEvent::Opened).is_ok()
    }

    /// Deliver a raw text frame to the charger.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.events
            .send(TransportEvent::Message(text.into()))
            .is_ok()
    }

    /// Answer a charger call with a CallResult.
    pub fn reply(&self, unique_id: &str, payload: Value) -> bool {
        self.send_text(
            OcppFrame::CallResult {
                unique_id: unique_id.to_string(),
                payload,
            }
            .serialize(),
        )
    }

    /// Answer a charger call with a CallError.
    pub fn reply_error(&self, unique_id: &str, code: &str, description: &str) -> bool {
        self.send_text(OcppFrame::error_response(unique_id, code, description).serialize())
    }

    /// Simulate the Central System dropping the connection.
    pub fn close(&self, reason: Option<&str>) -> bool {
        self.events
            .send(TransportEvent::Closed(reason.map(str::to_string)))
            .is_ok()
    }

    /// Next frame sent by the charger; `None` once the charger dropped the link.
    pub async fn next_frame(&mut self) -> Option<OcppFrame> {
        loop {
            let text = self.frames.recv().await?;
            if let Ok(frame) = OcppFrame::parse(&text) {
                return Some(frame);
            }
        }
    }

    /// Next Call with the given action, skipping every other frame.
    /// Returns `(unique_id, payload)`.
    pub async fn next_call(&mut self, wanted: &str) -> Option<(String, Value)> {
        loop {
            if let OcppFrame::Call {
                unique_id,
                action,
                payload,
            } = self.next_frame().await?
            {
                if action == wanted {
                    return Some((unique_id, payload));
                }
            }
        }
    }

    /// Frames already queued, without waiting.
    pub fn drain(&mut self) -> Vec<OcppFrame> {
        let mut frames = Vec::new();
        while let Ok(text) = self.frames.try_recv() {
            if let Ok(frame) = OcppFrame::parse(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// `true` once the charger has dropped its end and every queued frame was read.
    pub fn is_closed(&mut self) -> bool {
        matches!(self.frames.try_recv(), Err(TryRecvError::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_open_reports_opened_first() {
        let (connector, mut peers) = LoopbackConnector::new();
        let mut link = connector.open("CP1");
        let peer = peers.recv().await.unwrap();
        assert_eq!(peer.charger_id(), "CP1");
        assert_eq!(link.next_event().await, Some(TransportEvent::Opened));
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (connector, mut peers) = LoopbackConnector::manual();
        let mut link = connector.open("CP1");
        let mut peer = peers.recv().await.unwrap();

        link.send(r#"[2,"CP1-1","Heartbeat",{}]"#.to_string()).unwrap();
        let (id, payload) = peer.next_call("Heartbeat").await.unwrap();
        assert_eq!(id, "CP1-1");
        assert!(payload.as_object().unwrap().is_empty());

        peer.reply(&id, serde_json::json!({"currentTime": "2024-01-01T00:00:00Z"}));
        match link.next_event().await {
            Some(TransportEvent::Message(text)) => assert!(text.starts_with("[3,")),
            other => panic!("Expected Message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropping_link_closes_peer() {
        let (connector, mut peers) = LoopbackConnector::new();
        let link = connector.open("CP1");
        let mut peer = peers.recv().await.unwrap();
        assert!(!peer.is_closed());
        drop(link);
        assert!(peer.is_closed());
        assert!(peer.next_frame().await.is_none());
    }
}
