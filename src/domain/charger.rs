//! Charger connection and transaction states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle of a simulated charge point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No transport.
    Disconnected,
    /// Transport is being opened.
    Connecting,
    /// Transport open, BootNotification not (yet) accepted.
    Connected,
    /// Boot accepted; heartbeats running.
    Operational,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Operational => "Operational",
        };
        f.write_str(s)
    }
}

/// Transaction sub-state, orthogonal to [`ConnectionState::Operational`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionPhase {
    Idle,
    /// StartTransaction sent, no transactionId received yet.
    #[serde(rename = "TransactionPending")]
    Pending,
    /// transactionId assigned by the Central System.
    #[serde(rename = "TransactionActive")]
    Active,
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Pending => "TransactionPending",
            Self::Active => "TransactionActive",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a charger session. Never carries the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargerSummary {
    pub id: String,
    pub state: ConnectionState,
    pub transaction_sub_state: TransactionPhase,
    pub transaction_id: Option<i32>,
    pub id_tag: Option<String>,
    pub energy_wh: f64,
}

/// Outcome of a power-on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerOutcome {
    /// A new transport was opened.
    Connecting,
    /// BootNotification re-sent after an earlier rejection.
    Rebooting,
    /// Already powered; nothing changed.
    AlreadyOn(ConnectionState),
    /// Powered off (also when it already was).
    Off,
}

impl PowerOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Connecting => "Charger powering on".to_string(),
            Self::Rebooting => "BootNotification re-sent".to_string(),
            Self::AlreadyOn(state) => format!("Charger already powered on ({})", state),
            Self::Off => "Charger powered off".to_string(),
        }
    }
}
