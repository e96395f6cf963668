//! WebSocket transport (OCPP-J over tokio-tungstenite)

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::{TransportConnector, TransportEvent, TransportLink};
use crate::config::CentralSystemConfig;

/// Connects chargers to `<base_url>/<charger_id>` with the OCPP subprotocol.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: String,
    subprotocol: String,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>, subprotocol: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            subprotocol: subprotocol.into(),
        }
    }

    pub fn from_config(cfg: &CentralSystemConfig) -> Self {
        Self::new(cfg.url.clone(), cfg.subprotocol.clone())
    }
}

impl TransportConnector for WsConnector {
    fn open(&self, charger_id: &str) -> TransportLink {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let url = build_ocpp_url(&self.base_url, charger_id);
        tokio::spawn(run_connection(
            charger_id.to_string(),
            url,
            self.subprotocol.clone(),
            outbound_rx,
            events_tx,
        ));

        TransportLink::new(outbound_tx, events_rx)
    }
}

/// Build the full OCPP WebSocket URL
pub fn build_ocpp_url(base_url: &str, charger_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), charger_id)
}

fn build_request(url: &str, subprotocol: &str) -> Result<Request, String> {
    let mut request = url.into_client_request().map_err(|e| e.to_string())?;
    let protocol = HeaderValue::from_str(subprotocol).map_err(|e| e.to_string())?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    Ok(request)
}

/// Drive one connection until either side goes away.
///
/// The task ends when the owning link is dropped (its event receiver closes),
/// sending a Close frame first if the socket is up.
async fn run_connection(
    charger_id: String,
    url: String,
    subprotocol: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let request = match build_request(&url, &subprotocol) {
        Ok(r) => r,
        Err(e) => {
            warn!(charger_id = charger_id.as_str(), url = url.as_str(), error = %e, "Invalid Central System URL");
            let _ = events.send(TransportEvent::Failed(e));
            return;
        }
    };

    info!(charger_id = charger_id.as_str(), url = url.as_str(), "Connecting to Central System");

    let (ws_stream, response) = tokio::select! {
        result = connect_async(request) => match result {
            Ok(ok) => ok,
            Err(e) => {
                warn!(charger_id = charger_id.as_str(), error = %e, "WebSocket connection failed");
                let _ = events.send(TransportEvent::Failed(e.to_string()));
                return;
            }
        },
        _ = events.closed() => {
            debug!(charger_id = charger_id.as_str(), "Link dropped before connection completed");
            return;
        }
    };

    let accepted = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok());
    if accepted != Some(subprotocol.as_str()) {
        warn!(
            charger_id = charger_id.as_str(),
            requested = subprotocol.as_str(),
            accepted = ?accepted,
            "Central System did not accept the OCPP subprotocol"
        );
    }

    if events.send(TransportEvent::Opened).is_err() {
        return;
    }
    info!(charger_id = charger_id.as_str(), "WebSocket connected");

    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        warn!(charger_id = charger_id.as_str(), error = %e, "Send error");
                        let _ = events.send(TransportEvent::Failed(e.to_string()));
                        break;
                    }
                }
                None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    if events.send(TransportEvent::Message(text)).is_err() {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    warn!(
                        charger_id = charger_id.as_str(),
                        bytes = data.len(),
                        "Binary message received, ignoring"
                    );
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(charger_id = charger_id.as_str(), ?frame, "Close frame received");
                    let reason = frame.map(|f| f.reason.to_string());
                    let _ = events.send(TransportEvent::Closed(reason));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(charger_id = charger_id.as_str(), error = %e, "WebSocket error");
                    let _ = events.send(TransportEvent::Failed(e.to_string()));
                    break;
                }
                None => {
                    let _ = events.send(TransportEvent::Closed(None));
                    break;
                }
            },
            _ = events.closed() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }

    debug!(charger_id = charger_id.as_str(), "Connection task finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_appends_charger_id() {
        assert_eq!(
            build_ocpp_url("ws://centralsystem.example.com/ocpp", "CP-001"),
            "ws://centralsystem.example.com/ocpp/CP-001"
        );
        assert_eq!(
            build_ocpp_url("ws://centralsystem.example.com/ocpp/", "CP-001"),
            "ws://centralsystem.example.com/ocpp/CP-001"
        );
    }

    #[test]
    fn request_carries_subprotocol() {
        let request = build_request("ws://localhost:9000/ocpp/CP1", "ocpp1.6").unwrap();
        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "ocpp1.6"
        );
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(build_request("not a url", "ocpp1.6").is_err());
    }

    #[tokio::test]
    async fn unreachable_server_reports_failure() {
        // Port 9 (discard) on localhost is closed in test environments.
        let connector = WsConnector::new("ws://127.0.0.1:9/ocpp", "ocpp1.6");
        let mut link = connector.open("CP1");
        match link.next_event().await {
            Some(TransportEvent::Failed(_)) => {}
            other => panic!("Expected Failed, got {:?}", other),
        }
    }
}
