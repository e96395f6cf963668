//! Event stream for dashboard clients
//!
//! `GET /ws/events?charger_id=&event_types=` upgrades to a WebSocket and
//! forwards every matching [`EventMessage`] as a JSON text frame.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::select;
use tracing::{debug, error, info, warn};

use crate::application::events::{EventMessage, SharedEventBus};
use crate::support::shutdown::ShutdownSignal;

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub charger_id: Option<String>,
    /// Comma-separated event type names, e.g. `meter_sampled,call_rejected`
    pub event_types: Option<String>,
}

impl EventFilter {
    pub fn matches(&self, message: &EventMessage) -> bool {
        if let Some(ref charger_id) = self.charger_id {
            if message.event.charger_id() != charger_id {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            let event_type = message.event.event_type();
            if !types.split(',').map(str::trim).any(|t| t == event_type) {
                return false;
            }
        }

        true
    }
}

#[derive(Clone)]
pub struct NotificationState {
    pub event_bus: SharedEventBus,
    pub shutdown: ShutdownSignal,
}

pub async fn ws_notifications_handler(
    ws: WebSocketUpgrade,
    State(state): State<NotificationState>,
    Query(filter): Query<EventFilter>,
) -> impl IntoResponse {
    info!(
        charger_id = ?filter.charger_id,
        event_types = ?filter.event_types,
        "New event stream connection"
    );

    ws.on_upgrade(move |socket| handle_notification_socket(socket, state, filter))
}

async fn handle_notification_socket(socket: WebSocket, state: NotificationState, filter: EventFilter) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscriber = state.event_bus.subscribe();

    let welcome = serde_json::json!({
        "type": "connected",
        "message": "Connected to simulator event stream",
        "filter": {
            "charger_id": filter.charger_id,
            "event_types": filter.event_types
        }
    });

    if let Err(e) = sender.send(Message::Text(welcome.to_string().into())).await {
        error!("Failed to send welcome message: {}", e);
        return;
    }

    loop {
        select! {
            _ = state.shutdown.wait() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Event stream client closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Event stream socket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            event = subscriber.recv() => {
                let Some(message) = event else {
                    warn!("Event bus closed");
                    break;
                };
                if !filter.matches(&message) {
                    continue;
                }
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if let Err(e) = sender.send(Message::Text(json.into())).await {
                            error!("Failed to send event: {}", e);
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize event: {}", e),
                }
            }
        }
    }

    info!("Event stream client disconnected");
}

pub fn create_notification_state(event_bus: SharedEventBus, shutdown: ShutdownSignal) -> NotificationState {
    NotificationState { event_bus, shutdown }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::application::events::{ChargerCreatedEvent, Event, MeterSampledEvent};

    fn created(id: &str) -> EventMessage {
        EventMessage::new(Event::ChargerCreated(ChargerCreatedEvent {
            charger_id: id.into(),
            timestamp: Utc::now(),
        }))
    }

    fn sampled(id: &str) -> EventMessage {
        EventMessage::new(Event::MeterSampled(MeterSampledEvent {
            charger_id: id.into(),
            transaction_id: Some(1),
            energy_wh: 20.4,
            power_w: 3680.0,
            current_a: 16.0,
            voltage_v: 230.0,
            timestamp: Utc::now(),
        }))
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = EventFilter::default();
        assert!(filter.matches(&created("CP1")));
        assert!(filter.matches(&sampled("CP2")));
    }

    #[test]
    fn filters_by_charger_and_type() {
        let filter = EventFilter {
            charger_id: Some("CP1".into()),
            event_types: Some("meter_sampled, call_rejected".into()),
        };
        assert!(filter.matches(&sampled("CP1")));
        assert!(!filter.matches(&sampled("CP2")));
        assert!(!filter.matches(&created("CP1")));
    }
}
