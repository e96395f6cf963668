//! Charger registry - the fleet of simulated charge points
//!
//! Maps charger ids to session handles. Map mutation is serialized per shard
//! by `DashMap`; the session calls themselves run outside any map lock, so
//! operations on different chargers proceed in parallel.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use tracing::{info, warn};

use super::session::{ChargerHandle, SessionSettings};
use crate::application::events::{ChargerCreatedEvent, ChargerDeletedEvent, Event, SharedEventBus};
use crate::domain::{ChargerSummary, PowerOutcome, SimResult, SimulatorError};
use crate::infrastructure::transport::TransportConnector;

pub struct ChargerRegistry {
    sessions: DashMap<String, ChargerHandle>,
    connector: Arc<dyn TransportConnector>,
    settings: Arc<SessionSettings>,
    events: SharedEventBus,
}

pub type SharedChargerRegistry = Arc<ChargerRegistry>;

impl ChargerRegistry {
    pub fn new(
        connector: Arc<dyn TransportConnector>,
        settings: SessionSettings,
        events: SharedEventBus,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            connector,
            settings: Arc::new(settings),
            events,
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared(
        connector: Arc<dyn TransportConnector>,
        settings: SessionSettings,
        events: SharedEventBus,
    ) -> SharedChargerRegistry {
        Arc::new(Self::new(connector, settings, events))
    }

    /// Register a new charger and power it on.
    pub async fn create(&self, id: &str) -> SimResult<ChargerSummary> {
        let handle = match self.sessions.entry(id.to_string()) {
            Entry::Occupied(_) => return Err(SimulatorError::AlreadyExists(id.to_string())),
            Entry::Vacant(slot) => {
                let handle = ChargerHandle::spawn(
                    id,
                    self.connector.clone(),
                    self.settings.clone(),
                    self.events.clone(),
                );
                slot.insert(handle.clone());
                handle
            }
        };

        info!(charger_id = id, "Charger created");
        self.record_count();
        self.events.publish(Event::ChargerCreated(ChargerCreatedEvent {
            charger_id: id.to_string(),
            timestamp: Utc::now(),
        }));

        handle.power_on().await?;
        handle.snapshot().await
    }

    /// Remove a charger. Its timers and transport are torn down before the
    /// id leaves the map, so the id cannot be reused while the old link is
    /// still open. An active transaction is abandoned without StopTransaction.
    pub async fn delete(&self, id: &str) -> SimResult<()> {
        let handle = self.handle(id)?;
        handle.shutdown().await;

        // a concurrent delete of the same session may have won the removal
        self.sessions
            .remove_if(id, |_, current| current.same_session(&handle))
            .ok_or_else(|| SimulatorError::NotFound(id.to_string()))?;

        info!(charger_id = id, "Charger deleted");
        self.record_count();
        self.events.publish(Event::ChargerDeleted(ChargerDeletedEvent {
            charger_id: id.to_string(),
            timestamp: Utc::now(),
        }));
        Ok(())
    }

    pub async fn set_power(&self, id: &str, on: bool) -> SimResult<PowerOutcome> {
        let handle = self.handle(id)?;
        if on {
            handle.power_on().await
        } else {
            handle.power_off().await
        }
    }

    pub async fn start_transaction(&self, id: &str, id_tag: &str) -> SimResult<()> {
        self.handle(id)?.start_transaction(id_tag).await
    }

    pub async fn stop_transaction(&self, id: &str) -> SimResult<()> {
        self.handle(id)?.stop_transaction().await
    }

    pub async fn get(&self, id: &str) -> SimResult<ChargerSummary> {
        self.handle(id)?.snapshot().await
    }

    /// Summaries of every charger, sorted by id.
    pub async fn list(&self) -> Vec<ChargerSummary> {
        let handles: Vec<ChargerHandle> = self.sessions.iter().map(|e| e.value().clone()).collect();

        // a charger deleted while we wait simply drops out
        let mut summaries: Vec<ChargerSummary> = join_all(handles.iter().map(|h| h.snapshot()))
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Remove and tear down every charger.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        if ids.is_empty() {
            return;
        }
        info!(count = ids.len(), "Powering off all chargers");

        let results = join_all(ids.iter().map(|id| self.delete(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                warn!(charger_id = id.as_str(), error = %e, "Charger already gone during shutdown");
            }
        }
    }

    fn handle(&self, id: &str) -> SimResult<ChargerHandle> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SimulatorError::NotFound(id.to_string()))
    }

    fn record_count(&self) {
        metrics::gauge!("ocpp_sim_chargers").set(self.sessions.len() as f64);
    }
}
