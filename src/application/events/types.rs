//! Fleet events
//!
//! Published by the registry and the session actors, streamed to dashboard
//! clients over `/ws/events`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionState, TransactionPhase};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    ChargerCreated(ChargerCreatedEvent),
    ChargerDeleted(ChargerDeletedEvent),
    ConnectionStateChanged(ConnectionStateChangedEvent),
    TransactionStateChanged(TransactionStateChangedEvent),
    MeterSampled(MeterSampledEvent),
    /// The Central System answered one of our calls with a CallError or a
    /// non-accepting status.
    CallRejected(CallRejectedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::ChargerCreated(_) => "charger_created",
            Event::ChargerDeleted(_) => "charger_deleted",
            Event::ConnectionStateChanged(_) => "connection_state_changed",
            Event::TransactionStateChanged(_) => "transaction_state_changed",
            Event::MeterSampled(_) => "meter_sampled",
            Event::CallRejected(_) => "call_rejected",
        }
    }

    pub fn charger_id(&self) -> &str {
        match self {
            Event::ChargerCreated(e) => &e.charger_id,
            Event::ChargerDeleted(e) => &e.charger_id,
            Event::ConnectionStateChanged(e) => &e.charger_id,
            Event::TransactionStateChanged(e) => &e.charger_id,
            Event::MeterSampled(e) => &e.charger_id,
            Event::CallRejected(e) => &e.charger_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerCreatedEvent {
    pub charger_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerDeletedEvent {
    pub charger_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStateChangedEvent {
    pub charger_id: String,
    pub old_state: ConnectionState,
    pub new_state: ConnectionState,
    /// Set when the change was not caller-driven (transport loss, boot rejection)
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStateChangedEvent {
    pub charger_id: String,
    pub phase: TransactionPhase,
    pub transaction_id: Option<i32>,
    pub id_tag: Option<String>,
    pub energy_wh: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterSampledEvent {
    pub charger_id: String,
    pub transaction_id: Option<i32>,
    pub energy_wh: f64,
    pub power_w: f64,
    pub current_a: f64,
    pub voltage_v: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRejectedEvent {
    pub charger_id: String,
    pub action: String,
    pub unique_id: String,
    pub error_code: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper for sending events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_flattens_tagged_event() {
        let msg = EventMessage::new(Event::ConnectionStateChanged(
            ConnectionStateChangedEvent {
                charger_id: "CP1".into(),
                old_state: ConnectionState::Connected,
                new_state: ConnectionState::Operational,
                reason: None,
                timestamp: Utc::now(),
            },
        ));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ConnectionStateChanged");
        assert_eq!(json["data"]["charger_id"], "CP1");
        assert_eq!(json["data"]["new_state"], "Operational");
        assert_eq!(json["id"].as_str().unwrap().len(), 36);
        assert_eq!(msg.event.event_type(), "connection_state_changed");
    }
}
