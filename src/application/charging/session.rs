//! Charger session actor
//!
//! One tokio task per simulated charge point owns the transport link, the
//! pending-call table, the timers and the transaction. Every operation on a
//! session is a message to that task, so commands, inbound frames and timer
//! ticks are handled strictly one at a time.
//!
//! ```text
//! Disconnected --power_on--> Connecting --Opened--> Connected --Boot Accepted--> Operational
//!       ^                                                                             |
//!       +------------------ power_off / transport loss / shutdown -------------------+
//! ```
//!
//! While `Operational` the transaction phase moves
//! `Idle -> TransactionPending -> TransactionActive -> Idle`.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_ocpp::v1_6::messages::boot_notification::BootNotificationResponse;
use rust_ocpp::v1_6::messages::start_transaction::StartTransactionResponse;
use rust_ocpp::v1_6::types::{AuthorizationStatus, ChargePointStatus, RegistrationStatus};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::messages::{self, CallAction};
use super::pending::PendingCalls;
use super::scheduler::{Scheduler, TimerKind, TimerTick};
use crate::application::events::{
    CallRejectedEvent, ConnectionStateChangedEvent, Event, MeterSampledEvent, SharedEventBus,
    TransactionStateChangedEvent,
};
use crate::config::{AppConfig, IdentityConfig};
use crate::domain::{
    ChargerSummary, ConnectionState, LoadProfile, MeterSample, PowerOutcome, SimResult,
    SimulatorError, Transaction, TransactionPhase,
};
use crate::infrastructure::transport::{TransportConnector, TransportEvent, TransportLink};
use crate::support::ocpp_frame::{CallIdGenerator, OcppFrame};

const COMMAND_BUFFER: usize = 64;

/// Per-session timing, load and identity, shared by every session of a fleet.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub heartbeat_interval: Duration,
    pub meter_sample_interval: Duration,
    pub finishing_delay: Duration,
    pub call_timeout: Option<Duration>,
    pub load: LoadProfile,
    pub identity: IdentityConfig,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let sim = &config.simulation;
        Self {
            heartbeat_interval: sim.heartbeat_interval(),
            meter_sample_interval: sim.meter_sample_interval(),
            finishing_delay: sim.finishing_delay(),
            call_timeout: sim.call_timeout(),
            load: sim.load(),
            identity: config.identity.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

enum SessionCommand {
    PowerOn {
        reply: oneshot::Sender<PowerOutcome>,
    },
    PowerOff {
        reply: oneshot::Sender<PowerOutcome>,
    },
    StartTransaction {
        id_tag: String,
        reply: oneshot::Sender<SimResult<()>>,
    },
    StopTransaction {
        reply: oneshot::Sender<SimResult<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<ChargerSummary>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PowerOn { .. } => "PowerOn",
            Self::PowerOff { .. } => "PowerOff",
            Self::StartTransaction { .. } => "StartTransaction",
            Self::StopTransaction { .. } => "StopTransaction",
            Self::Snapshot { .. } => "Snapshot",
            Self::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}

/// Cloneable mailbox of a running session.
///
/// Calls return as soon as the session has applied the command locally; none
/// of them waits for the Central System to answer.
#[derive(Debug, Clone)]
pub struct ChargerHandle {
    id: Arc<str>,
    commands: mpsc::Sender<SessionCommand>,
}

impl ChargerHandle {
    /// Spawn a Disconnected session. Nothing is opened until [`power_on`](Self::power_on).
    pub fn spawn(
        id: impl Into<String>,
        connector: Arc<dyn TransportConnector>,
        settings: Arc<SessionSettings>,
        events: SharedEventBus,
    ) -> Self {
        let id: String = id.into();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();

        let session = ChargerSession {
            ids: CallIdGenerator::new(id.clone()),
            id: id.clone(),
            settings,
            connector,
            events,
            state: ConnectionState::Disconnected,
            link: None,
            pending: PendingCalls::new(),
            scheduler: Scheduler::new(ticks_tx),
            ticks: ticks_rx,
            transaction: None,
            commands: commands_rx,
        };
        tokio::spawn(session.run());

        Self {
            id: Arc::from(id),
            commands: commands_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True when both handles address the same running session.
    pub fn same_session(&self, other: &ChargerHandle) -> bool {
        self.commands.same_channel(&other.commands)
    }

    pub async fn power_on(&self) -> SimResult<PowerOutcome> {
        self.request(|reply| SessionCommand::PowerOn { reply }).await
    }

    pub async fn power_off(&self) -> SimResult<PowerOutcome> {
        self.request(|reply| SessionCommand::PowerOff { reply }).await
    }

    pub async fn start_transaction(&self, id_tag: impl Into<String>) -> SimResult<()> {
        let id_tag = id_tag.into();
        self.request(|reply| SessionCommand::StartTransaction { id_tag, reply })
            .await?
    }

    pub async fn stop_transaction(&self) -> SimResult<()> {
        self.request(|reply| SessionCommand::StopTransaction { reply })
            .await?
    }

    pub async fn snapshot(&self) -> SimResult<ChargerSummary> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Tear the session down and wait until its timers and transport are gone.
    /// Returns immediately if the session already stopped.
    pub async fn shutdown(&self) {
        let _ = self.request(|reply| SessionCommand::Shutdown { reply }).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> SimResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SimulatorError::SessionUnavailable(self.id.to_string()))?;
        rx.await
            .map_err(|_| SimulatorError::SessionUnavailable(self.id.to_string()))
    }
}

struct ChargerSession {
    id: String,
    settings: Arc<SessionSettings>,
    connector: Arc<dyn TransportConnector>,
    events: SharedEventBus,
    state: ConnectionState,
    link: Option<TransportLink>,
    ids: CallIdGenerator,
    pending: PendingCalls,
    scheduler: Scheduler,
    ticks: mpsc::UnboundedReceiver<TimerTick>,
    transaction: Option<Transaction>,
    commands: mpsc::Receiver<SessionCommand>,
}

async fn next_transport_event(link: &mut Option<TransportLink>) -> TransportEvent {
    match link {
        Some(link) => link
            .next_event()
            .await
            .unwrap_or(TransportEvent::Closed(None)),
        None => pending().await,
    }
}

async fn call_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

impl ChargerSession {
    async fn run(mut self) {
        debug!(charger_id = %self.id, "Session task started");

        loop {
            let deadline = self.pending.next_deadline();

            tokio::select! {
                biased;

                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Shutdown { reply }) => {
                        self.teardown(None);
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        self.teardown(None);
                        break;
                    }
                },

                event = next_transport_event(&mut self.link) => {
                    self.handle_transport_event(event);
                }

                Some(tick) = self.ticks.recv() => {
                    self.handle_tick(tick);
                }

                _ = call_deadline(deadline) => {
                    self.expire_calls();
                }
            }
        }

        debug!(charger_id = %self.id, "Session task stopped");
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::PowerOn { reply } => {
                let _ = reply.send(self.power_on());
            }
            SessionCommand::PowerOff { reply } => {
                self.teardown(None);
                let _ = reply.send(PowerOutcome::Off);
            }
            SessionCommand::StartTransaction { id_tag, reply } => {
                let _ = reply.send(self.start_transaction(id_tag));
            }
            SessionCommand::StopTransaction { reply } => {
                let _ = reply.send(self.stop_transaction());
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.summary());
            }
            // handled by the run loop
            SessionCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    // ── Connection lifecycle ───────────────────────────────

    fn power_on(&mut self) -> PowerOutcome {
        match self.state {
            ConnectionState::Disconnected => {
                self.link = Some(self.connector.open(&self.id));
                self.set_state(ConnectionState::Connecting, None);
                PowerOutcome::Connecting
            }
            ConnectionState::Connected
                if !self.pending.contains_action(CallAction::BootNotification) =>
            {
                info!(charger_id = %self.id, "Re-sending BootNotification");
                self.send_boot_notification();
                PowerOutcome::Rebooting
            }
            state => {
                info!(charger_id = %self.id, %state, "Power on ignored, charger already on");
                PowerOutcome::AlreadyOn(state)
            }
        }
    }

    /// Drop timers, pending calls, transaction and transport. Idempotent.
    fn teardown(&mut self, reason: Option<String>) {
        self.scheduler.cancel_all();
        self.pending.clear();
        self.link = None;

        if let Some(tx) = self.transaction.take() {
            warn!(
                charger_id = %self.id,
                transaction_id = ?tx.transaction_id(),
                energy_wh = tx.energy_wh(),
                "Transaction abandoned without StopTransaction"
            );
            self.publish_transaction(None);
        }

        if self.state != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected, reason);
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.state == ConnectionState::Connecting {
                    self.set_state(ConnectionState::Connected, None);
                    self.send_boot_notification();
                } else {
                    debug!(charger_id = %self.id, state = %self.state, "Ignoring duplicate open");
                }
            }
            TransportEvent::Message(text) => self.handle_message(&text),
            TransportEvent::Closed(reason) => {
                let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                warn!(charger_id = %self.id, %reason, "Transport closed");
                self.teardown(Some(reason));
            }
            TransportEvent::Failed(error) => {
                let err = SimulatorError::Transport(error);
                warn!(charger_id = %self.id, error = %err, "Transport failed");
                self.teardown(Some(err.to_string()));
            }
        }
    }

    fn set_state(&mut self, new_state: ConnectionState, reason: Option<String>) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        self.state = new_state;
        info!(
            charger_id = %self.id,
            from = %old_state,
            to = %new_state,
            reason = reason.as_deref().unwrap_or(""),
            "Connection state changed"
        );
        self.events
            .publish(Event::ConnectionStateChanged(ConnectionStateChangedEvent {
                charger_id: self.id.clone(),
                old_state,
                new_state,
                reason,
                timestamp: Utc::now(),
            }));
    }

    // ── Outbound calls ─────────────────────────────────────

    fn send_call(&mut self, action: CallAction, payload: Value) -> SimResult<String> {
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| SimulatorError::NoActiveConnection(self.id.clone()))?;

        let pending = &self.pending;
        let call = self
            .ids
            .encode_call(action.as_str(), payload, |id| pending.contains(id));

        debug!(charger_id = %self.id, %action, unique_id = %call.unique_id, "-> {}", call.text);
        link.send(call.text)?;

        self.pending
            .insert(call.unique_id.clone(), action, self.settings.call_timeout);
        metrics::counter!("ocpp_sim_calls_sent_total", "action" => action.as_str()).increment(1);
        Ok(call.unique_id)
    }

    /// Fire-and-forget call; failures are logged, the transport event that
    /// follows a broken link performs the teardown.
    fn emit(&mut self, action: CallAction, payload: Value) {
        if let Err(e) = self.send_call(action, payload) {
            warn!(charger_id = %self.id, %action, error = %e, "Failed to send call");
        }
    }

    fn send_boot_notification(&mut self) {
        let payload = messages::boot_notification(&self.id, &self.settings.identity);
        self.emit(CallAction::BootNotification, payload);
    }

    fn send_status(&mut self, status: ChargePointStatus) {
        debug!(charger_id = %self.id, ?status, "StatusNotification");
        self.emit(
            CallAction::StatusNotification,
            messages::status_notification(status, Utc::now()),
        );
    }

    // ── Inbound frames ─────────────────────────────────────

    fn handle_message(&mut self, text: &str) {
        debug!(charger_id = %self.id, "<- {}", text);

        let frame = match OcppFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                let err = SimulatorError::from(e);
                warn!(charger_id = %self.id, error = %err, "Discarding frame");
                metrics::counter!("ocpp_sim_frames_discarded_total", "reason" => "malformed")
                    .increment(1);
                return;
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id, action, ..
            } => {
                warn!(charger_id = %self.id, %action, %unique_id, "Central System call not supported");
                if let Some(link) = &self.link {
                    let reply = OcppFrame::error_response(
                        unique_id,
                        "NotImplemented",
                        format!("{} is not supported by this charge point", action),
                    );
                    let _ = link.send(reply.serialize());
                }
            }
            OcppFrame::CallResult { unique_id, payload } => match self.pending.take(&unique_id) {
                Some(call) => {
                    let rtt = call.sent_at.elapsed();
                    debug!(
                        charger_id = %self.id,
                        action = %call.action,
                        %unique_id,
                        rtt_ms = rtt.as_millis() as u64,
                        "CallResult received"
                    );
                    metrics::histogram!("ocpp_sim_call_rtt_seconds", "action" => call.action.as_str())
                        .record(rtt.as_secs_f64());
                    self.handle_result(call.action, &unique_id, payload)
                }
                None => self.discard_unmatched(&unique_id),
            },
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => match self.pending.take(&unique_id) {
                Some(call) => {
                    self.handle_call_error(call.action, &unique_id, error_code, error_description)
                }
                None => self.discard_unmatched(&unique_id),
            },
        }
    }

    fn discard_unmatched(&self, unique_id: &str) {
        warn!(charger_id = %self.id, %unique_id, "Discarding response with unknown correlation id");
        metrics::counter!("ocpp_sim_frames_discarded_total", "reason" => "unmatched").increment(1);
    }

    fn handle_result(&mut self, action: CallAction, unique_id: &str, payload: Value) {
        match action {
            CallAction::BootNotification => self.on_boot_result(unique_id, payload),
            CallAction::StartTransaction => self.on_start_result(unique_id, payload),
            _ => debug!(charger_id = %self.id, %action, %unique_id, "Call acknowledged"),
        }
    }

    fn on_boot_result(&mut self, unique_id: &str, payload: Value) {
        let status = match serde_json::from_value::<BootNotificationResponse>(payload) {
            Ok(resp) => resp.status,
            Err(e) => {
                warn!(charger_id = %self.id, error = %e, "Unreadable BootNotification result");
                RegistrationStatus::Rejected
            }
        };

        if !matches!(status, RegistrationStatus::Accepted) {
            self.boot_rejected(unique_id, format!("{:?}", status), String::new());
            return;
        }
        if self.state != ConnectionState::Connected {
            debug!(charger_id = %self.id, state = %self.state, "Late boot acceptance ignored");
            return;
        }

        self.set_state(ConnectionState::Operational, None);
        self.scheduler
            .start_heartbeat(self.settings.heartbeat_interval);
        self.send_status(ChargePointStatus::Available);
    }

    fn boot_rejected(&mut self, unique_id: &str, status: String, description: String) {
        let err = SimulatorError::BootRejected(status.clone());
        warn!(charger_id = %self.id, error = %err, "Charger stays connected without heartbeat");
        self.publish_rejection(CallAction::BootNotification, unique_id, status, description);
    }

    fn on_start_result(&mut self, unique_id: &str, payload: Value) {
        let Some(tx) = self
            .transaction
            .as_mut()
            .filter(|tx| tx.start_call_id() == unique_id)
        else {
            warn!(charger_id = %self.id, %unique_id, "StartTransaction result for a transaction no longer pending");
            return;
        };

        let transaction_id = match serde_json::from_value::<StartTransactionResponse>(payload.clone()) {
            Ok(resp) => {
                if !matches!(resp.id_tag_info.status, AuthorizationStatus::Accepted) {
                    warn!(
                        charger_id = %self.id,
                        id_tag = tx.id_tag(),
                        status = ?resp.id_tag_info.status,
                        "Id-tag not accepted, charging anyway"
                    );
                }
                Some(resp.transaction_id)
            }
            Err(_) => payload
                .get("transactionId")
                .and_then(Value::as_i64)
                .and_then(|id| i32::try_from(id).ok()),
        };

        match transaction_id {
            Some(transaction_id) => {
                tx.activate(transaction_id);
                info!(charger_id = %self.id, transaction_id, "Transaction active");
                self.publish_transaction(None);
            }
            None => {
                warn!(charger_id = %self.id, "StartTransaction result without transactionId, staying pending");
            }
        }
    }

    fn handle_call_error(
        &mut self,
        action: CallAction,
        unique_id: &str,
        error_code: String,
        description: String,
    ) {
        warn!(
            charger_id = %self.id,
            %action,
            %unique_id,
            %error_code,
            %description,
            "Call rejected by Central System"
        );

        match action {
            CallAction::BootNotification => self.boot_rejected(unique_id, error_code, description),
            CallAction::StartTransaction => {
                self.publish_rejection(action, unique_id, error_code, description);
                self.rollback_start(unique_id);
            }
            _ => self.publish_rejection(action, unique_id, error_code, description),
        }
    }

    fn expire_calls(&mut self) {
        for (unique_id, call) in self.pending.take_expired(Instant::now()) {
            let err = SimulatorError::CallTimedOut {
                action: call.action.to_string(),
                unique_id: unique_id.clone(),
            };
            warn!(charger_id = %self.id, error = %err, "No response from Central System");
            if call.action == CallAction::StartTransaction {
                self.rollback_start(&unique_id);
            }
        }
    }

    /// Undo an optimistic start whose StartTransaction never succeeded.
    fn rollback_start(&mut self, start_call_id: &str) {
        let matches_pending = self
            .transaction
            .as_ref()
            .is_some_and(|tx| tx.start_call_id() == start_call_id && tx.transaction_id().is_none());
        if !matches_pending {
            return;
        }

        self.transaction = None;
        self.scheduler.stop(TimerKind::MeterSample);
        info!(charger_id = %self.id, "Transaction start rolled back");
        self.publish_transaction(None);
        if self.state == ConnectionState::Operational {
            self.send_status(ChargePointStatus::Available);
        }
    }

    // ── Transactions ───────────────────────────────────────

    fn start_transaction(&mut self, id_tag: String) -> SimResult<()> {
        if self.state != ConnectionState::Operational {
            return Err(SimulatorError::NoActiveConnection(self.id.clone()));
        }
        if self.transaction.is_some() {
            return Err(SimulatorError::TransactionAlreadyActive(self.id.clone()));
        }

        self.scheduler.stop(TimerKind::Finishing);
        let payload = messages::start_transaction(&id_tag, 0, Utc::now());
        let unique_id = self.send_call(CallAction::StartTransaction, payload)?;

        info!(charger_id = %self.id, %id_tag, %unique_id, "Transaction pending");
        self.transaction = Some(Transaction::pending(id_tag, unique_id));
        self.send_status(ChargePointStatus::Charging);
        self.scheduler
            .start_meter(self.settings.meter_sample_interval);
        self.publish_transaction(None);
        Ok(())
    }

    fn stop_transaction(&mut self) -> SimResult<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| SimulatorError::NoActiveTransaction(self.id.clone()))?;

        self.scheduler.stop(TimerKind::MeterSample);

        match tx.transaction_id() {
            Some(transaction_id) => {
                let payload = messages::stop_transaction(
                    transaction_id,
                    tx.id_tag(),
                    tx.meter_stop(),
                    Utc::now(),
                );
                self.emit(CallAction::StopTransaction, payload);
                info!(
                    charger_id = %self.id,
                    transaction_id,
                    energy_wh = tx.energy_wh(),
                    duration_s = (Utc::now() - tx.started_at()).num_seconds(),
                    "Transaction stopped"
                );
            }
            None => {
                info!(charger_id = %self.id, "Pending transaction dropped, no StopTransaction sent");
            }
        }

        self.send_status(ChargePointStatus::Finishing);
        self.scheduler.schedule_finishing(self.settings.finishing_delay);
        self.publish_transaction(Some(&tx));
        Ok(())
    }

    // ── Timers ─────────────────────────────────────────────

    fn handle_tick(&mut self, tick: TimerTick) {
        if !self.scheduler.accepts(&tick) {
            debug!(charger_id = %self.id, kind = ?tick.kind, "Stale timer tick dropped");
            return;
        }
        self.scheduler.complete(&tick);

        match tick.kind {
            TimerKind::Heartbeat => {
                if self.state == ConnectionState::Operational {
                    self.emit(CallAction::Heartbeat, messages::heartbeat());
                }
            }
            TimerKind::MeterSample => self.sample_meter(),
            TimerKind::Finishing => {
                if self.state == ConnectionState::Operational && self.transaction.is_none() {
                    self.send_status(ChargePointStatus::Available);
                }
            }
        }
    }

    fn sample_meter(&mut self) {
        let load = self.settings.load;
        let interval = self.settings.meter_sample_interval;
        let Some(tx) = self.transaction.as_mut() else {
            return;
        };

        tx.add_energy(load.energy_over(interval));
        let sample = MeterSample {
            energy_wh: tx.energy_wh(),
            current_a: load.current,
            voltage_v: load.voltage,
            power_w: load.power_w(),
        };
        let transaction_id = tx.transaction_id();

        self.emit(
            CallAction::MeterValues,
            messages::meter_values(transaction_id, &sample, Utc::now()),
        );
        self.events.publish(Event::MeterSampled(MeterSampledEvent {
            charger_id: self.id.clone(),
            transaction_id,
            energy_wh: sample.energy_wh,
            power_w: sample.power_w,
            current_a: sample.current_a,
            voltage_v: sample.voltage_v,
            timestamp: Utc::now(),
        }));
    }

    // ── Views and events ───────────────────────────────────

    fn phase(&self) -> TransactionPhase {
        self.transaction
            .as_ref()
            .map_or(TransactionPhase::Idle, Transaction::phase)
    }

    fn summary(&self) -> ChargerSummary {
        let tx = self.transaction.as_ref();
        ChargerSummary {
            id: self.id.clone(),
            state: self.state,
            transaction_sub_state: self.phase(),
            transaction_id: tx.and_then(Transaction::transaction_id),
            id_tag: tx.map(|t| t.id_tag().to_string()),
            energy_wh: tx.map_or(0.0, Transaction::energy_wh),
        }
    }

    /// Publish the current phase; `finished` carries the totals of a
    /// transaction that was just stopped.
    fn publish_transaction(&self, finished: Option<&Transaction>) {
        let tx = finished.or(self.transaction.as_ref());
        self.events
            .publish(Event::TransactionStateChanged(TransactionStateChangedEvent {
                charger_id: self.id.clone(),
                phase: self.phase(),
                transaction_id: tx.and_then(Transaction::transaction_id),
                id_tag: tx.map(|t| t.id_tag().to_string()),
                energy_wh: tx.map_or(0.0, Transaction::energy_wh),
                timestamp: Utc::now(),
            }));
    }

    fn publish_rejection(
        &self,
        action: CallAction,
        unique_id: &str,
        error_code: String,
        description: String,
    ) {
        self.events.publish(Event::CallRejected(CallRejectedEvent {
            charger_id: self.id.clone(),
            action: action.to_string(),
            unique_id: unique_id.to_string(),
            error_code,
            description,
            timestamp: Utc::now(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::infrastructure::transport::{LoopbackConnector, LoopbackPeer};
    use serde_json::json;

    fn test_settings() -> SessionSettings {
        SessionSettings {
            heartbeat_interval: Duration::from_secs(10),
            meter_sample_interval: Duration::from_secs(20),
            finishing_delay: Duration::from_secs(5),
            call_timeout: Some(Duration::from_secs(30)),
            load: LoadProfile::new(230.0, 16.0),
            identity: IdentityConfig::default(),
        }
    }

    fn spawn_session() -> (ChargerHandle, mpsc::UnboundedReceiver<LoopbackPeer>) {
        let (connector, peers) = LoopbackConnector::new();
        let handle = ChargerHandle::spawn(
            "CP1",
            Arc::new(connector),
            Arc::new(test_settings()),
            create_event_bus(),
        );
        (handle, peers)
    }

    fn boot_accepted() -> Value {
        json!({"status": "Accepted", "currentTime": "2024-01-01T00:00:00Z", "interval": 10})
    }

    /// Power on, accept the boot and consume the initial Available status.
    async fn operational(
        handle: &ChargerHandle,
        peers: &mut mpsc::UnboundedReceiver<LoopbackPeer>,
    ) -> LoopbackPeer {
        assert_eq!(handle.power_on().await.unwrap(), PowerOutcome::Connecting);
        let mut peer = peers.recv().await.unwrap();
        let (boot_id, boot) = peer.next_call("BootNotification").await.unwrap();
        assert_eq!(boot["chargePointSerialNumber"], "CP1");
        peer.reply(&boot_id, boot_accepted());

        let (_, status) = peer.next_call("StatusNotification").await.unwrap();
        assert_eq!(status["status"], "Available");
        assert_eq!(handle.snapshot().await.unwrap().state, ConnectionState::Operational);
        peer
    }

    /// Start a transaction and have the Central System assign `transaction_id`.
    async fn active(handle: &ChargerHandle, peer: &mut LoopbackPeer, transaction_id: i32) {
        handle.start_transaction("TAG1").await.unwrap();
        let (start_id, start) = peer.next_call("StartTransaction").await.unwrap();
        assert_eq!(start["idTag"], "TAG1");
        assert_eq!(start["meterStart"], 0);
        peer.reply(
            &start_id,
            json!({"transactionId": transaction_id, "idTagInfo": {"status": "Accepted"}}),
        );
        let (_, status) = peer.next_call("StatusNotification").await.unwrap();
        assert_eq!(status["status"], "Charging");
    }

    fn assert_elapsed(since: Instant, secs: u64) {
        let elapsed = since.elapsed();
        let expected = Duration::from_secs(secs);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "elapsed {:?}, expected {:?}",
            elapsed,
            expected
        );
    }

    fn actions(frames: &[OcppFrame]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|f| match f {
                OcppFrame::Call { action, .. } => Some(action.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn boot_acceptance_makes_charger_operational() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;

        let started = Instant::now();
        let (_, payload) = peer.next_call("Heartbeat").await.unwrap();
        assert!(payload.as_object().unwrap().is_empty());
        assert_elapsed(started, 10);

        let summary = handle.snapshot().await.unwrap();
        assert_eq!(summary.transaction_sub_state, TransactionPhase::Idle);
        assert_eq!(summary.energy_wh, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_before_boot_acceptance_is_rejected() {
        let (handle, mut peers) = spawn_session();
        handle.power_on().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        peer.next_call("BootNotification").await.unwrap();

        let state = handle.snapshot().await.unwrap().state;
        assert!(matches!(
            state,
            ConnectionState::Connecting | ConnectionState::Connected
        ));
        assert_eq!(
            handle.start_transaction("TAG1").await,
            Err(SimulatorError::NoActiveConnection("CP1".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_boot_keeps_connected_until_power_on_retries() {
        let (handle, mut peers) = spawn_session();
        handle.power_on().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        let (boot_id, _) = peer.next_call("BootNotification").await.unwrap();
        peer.reply(
            &boot_id,
            json!({"status": "Rejected", "currentTime": "2024-01-01T00:00:00Z", "interval": 60}),
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(handle.snapshot().await.unwrap().state, ConnectionState::Connected);
        assert!(!actions(&peer.drain()).contains(&"Heartbeat".to_string()));

        assert_eq!(handle.power_on().await.unwrap(), PowerOutcome::Rebooting);
        let (boot_id, _) = peer.next_call("BootNotification").await.unwrap();
        assert_eq!(
            handle.power_on().await.unwrap(),
            PowerOutcome::AlreadyOn(ConnectionState::Connected)
        );
        peer.reply(&boot_id, boot_accepted());
        let (_, status) = peer.next_call("StatusNotification").await.unwrap();
        assert_eq!(status["status"], "Available");
    }

    #[tokio::test(start_paused = true)]
    async fn energy_accumulates_per_meter_tick() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;
        active(&handle, &mut peer, 42).await;

        let per_tick = 230.0 * 16.0 * (20.0 / 3600.0);
        let mut last = 0.0;
        for tick in 1..=3 {
            let (_, payload) = peer.next_call("MeterValues").await.unwrap();
            assert_eq!(payload["transactionId"], 42);
            assert_eq!(payload["connectorId"], 1);
            let energy: f64 = payload["meterValue"][0]["sampledValue"][0]["value"]
                .as_str()
                .unwrap()
                .parse()
                .unwrap();
            assert!(energy >= last);
            assert!((energy - per_tick * tick as f64).abs() < 0.01);
            last = energy;
        }

        let summary = handle.snapshot().await.unwrap();
        assert_eq!(summary.transaction_sub_state, TransactionPhase::Active);
        assert_eq!(summary.transaction_id, Some(42));
        assert!((summary.energy_wh - per_tick * 3.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_while_pending() {
        let (handle, mut peers) = spawn_session();
        let _peer = operational(&handle, &mut peers).await;

        handle.start_transaction("TAG1").await.unwrap();
        assert_eq!(
            handle.snapshot().await.unwrap().transaction_sub_state,
            TransactionPhase::Pending
        );
        assert_eq!(
            handle.start_transaction("TAG2").await,
            Err(SimulatorError::TransactionAlreadyActive("CP1".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_sends_meter_stop_and_returns_to_available() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;
        active(&handle, &mut peer, 7).await;
        peer.next_call("MeterValues").await.unwrap();

        handle.stop_transaction().await.unwrap();
        let stopped_at = Instant::now();
        assert_eq!(
            handle.stop_transaction().await,
            Err(SimulatorError::NoActiveTransaction("CP1".into()))
        );

        let (_, stop) = peer.next_call("StopTransaction").await.unwrap();
        assert_eq!(stop["transactionId"], 7);
        assert_eq!(stop["idTag"], "TAG1");
        assert_eq!(stop["meterStop"], 20);

        let (_, finishing) = peer.next_call("StatusNotification").await.unwrap();
        assert_eq!(finishing["status"], "Finishing");
        let (_, available) = peer.next_call("StatusNotification").await.unwrap();
        assert_eq!(available["status"], "Available");
        assert_elapsed(stopped_at, 5);

        let summary = handle.snapshot().await.unwrap();
        assert_eq!(summary.transaction_sub_state, TransactionPhase::Idle);
        assert_eq!(summary.transaction_id, None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!actions(&peer.drain()).contains(&"MeterValues".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_pending_sends_no_stop_transaction() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;

        handle.start_transaction("TAG1").await.unwrap();
        handle.stop_transaction().await.unwrap();

        let frames = actions(&peer.drain());
        assert_eq!(
            frames,
            vec!["StartTransaction", "StatusNotification", "StatusNotification"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_during_finishing_suppresses_available() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;
        active(&handle, &mut peer, 7).await;
        peer.drain();

        handle.stop_transaction().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.start_transaction("TAG2").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let statuses: Vec<String> = peer
            .drain()
            .into_iter()
            .filter_map(|f| match f {
                OcppFrame::Call { action, payload, .. } if action == "StatusNotification" => {
                    payload["status"].as_str().map(str::to_string)
                }
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec!["Finishing", "Charging"]);
        assert_eq!(
            handle.snapshot().await.unwrap().transaction_sub_state,
            TransactionPhase::Pending
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_start_times_out_and_rolls_back() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;

        handle.start_transaction("TAG1").await.unwrap();
        let started = Instant::now();
        peer.next_call("StartTransaction").await.unwrap();
        let (_, charging) = peer.next_call("StatusNotification").await.unwrap();
        assert_eq!(charging["status"], "Charging");

        let (_, meter) = peer.next_call("MeterValues").await.unwrap();
        assert!(meter.get("transactionId").map_or(true, Value::is_null));

        let (_, available) = peer.next_call("StatusNotification").await.unwrap();
        assert_eq!(available["status"], "Available");
        assert_elapsed(started, 30);
        assert_eq!(
            handle.snapshot().await.unwrap().transaction_sub_state,
            TransactionPhase::Idle
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!actions(&peer.drain()).contains(&"MeterValues".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn start_call_error_rolls_back() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;

        handle.start_transaction("TAG1").await.unwrap();
        let (start_id, _) = peer.next_call("StartTransaction").await.unwrap();
        peer.reply_error(&start_id, "InternalError", "database down");

        peer.next_call("StatusNotification").await.unwrap();
        let (_, available) = peer.next_call("StatusNotification").await.unwrap();
        assert_eq!(available["status"], "Available");
        assert_eq!(
            handle.snapshot().await.unwrap().transaction_sub_state,
            TransactionPhase::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn power_cycle_reboots_without_restoring_transaction() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;
        active(&handle, &mut peer, 9).await;

        assert_eq!(handle.power_off().await.unwrap(), PowerOutcome::Off);
        assert_eq!(handle.power_off().await.unwrap(), PowerOutcome::Off);
        peer.drain();
        assert!(peer.is_closed());

        let summary = handle.snapshot().await.unwrap();
        assert_eq!(summary.state, ConnectionState::Disconnected);
        assert_eq!(summary.transaction_sub_state, TransactionPhase::Idle);

        assert_eq!(handle.power_on().await.unwrap(), PowerOutcome::Connecting);
        let mut fresh = peers.recv().await.unwrap();
        let (boot_id, _) = fresh.next_call("BootNotification").await.unwrap();
        fresh.reply(&boot_id, boot_accepted());
        fresh.next_call("StatusNotification").await.unwrap();

        let summary = handle.snapshot().await.unwrap();
        assert_eq!(summary.state, ConnectionState::Operational);
        assert_eq!(summary.transaction_id, None);
        assert_eq!(summary.energy_wh, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn stray_and_malformed_frames_are_discarded() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;

        assert!(peer.send_text(r#"[3,"unknown-id",{}]"#));
        assert!(peer.send_text(r#"[4,"unknown-id","InternalError","oops",{}]"#));
        assert!(peer.send_text("not json"));
        assert!(peer.send_text(r#"[9,"x",{}]"#));
        assert!(peer.send_text(r#"{"status":"Accepted"}"#));

        let summary = handle.snapshot().await.unwrap();
        assert_eq!(summary.state, ConnectionState::Operational);
        assert!(peer.next_call("Heartbeat").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn central_system_calls_get_not_implemented() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;

        peer.send_text(r#"[2,"cs-1","Reset",{"type":"Soft"}]"#);
        loop {
            match peer.next_frame().await.unwrap() {
                OcppFrame::CallError {
                    unique_id,
                    error_code,
                    ..
                } => {
                    assert_eq!(unique_id, "cs-1");
                    assert_eq!(error_code, "NotImplemented");
                    break;
                }
                _ => continue,
            }
        }
        assert_eq!(handle.snapshot().await.unwrap().state, ConnectionState::Operational);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_loss_tears_down_session() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;
        active(&handle, &mut peer, 3).await;

        peer.close(Some("server restart"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let summary = handle.snapshot().await.unwrap();
        assert_eq!(summary.state, ConnectionState::Disconnected);
        assert_eq!(summary.transaction_sub_state, TransactionPhase::Idle);
        peer.drain();
        assert!(peer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_all_traffic() {
        let (handle, mut peers) = spawn_session();
        let mut peer = operational(&handle, &mut peers).await;
        active(&handle, &mut peer, 11).await;

        handle.shutdown().await;
        peer.drain();
        assert!(peer.is_closed());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(peer.drain().is_empty());
        assert_eq!(
            handle.snapshot().await,
            Err(SimulatorError::SessionUnavailable("CP1".into()))
        );
    }
}
