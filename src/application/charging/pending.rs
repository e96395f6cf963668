//! Calls awaiting a CallResult/CallError, keyed by unique id

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::messages::CallAction;

#[derive(Debug, Clone)]
pub struct PendingCall {
    pub action: CallAction,
    pub sent_at: Instant,
    /// `None` when call timeouts are disabled.
    pub deadline: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: HashMap<String, PendingCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, unique_id: String, action: CallAction, timeout: Option<Duration>) {
        let sent_at = Instant::now();
        self.calls.insert(
            unique_id,
            PendingCall {
                action,
                sent_at,
                deadline: timeout.map(|t| sent_at + t),
            },
        );
    }

    /// Remove and return the call a result correlates to.
    pub fn take(&mut self, unique_id: &str) -> Option<PendingCall> {
        self.calls.remove(unique_id)
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.calls.contains_key(unique_id)
    }

    pub fn contains_action(&self, action: CallAction) -> bool {
        self.calls.values().any(|c| c.action == action)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Earliest deadline among calls still in flight.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.calls.values().filter_map(|c| c.deadline).min()
    }

    /// Remove every call whose deadline is at or before `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<(String, PendingCall)> {
        let expired: Vec<String> = self
            .calls
            .iter()
            .filter(|(_, c)| c.deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.calls.remove(&id).map(|c| (id, c)))
            .collect()
    }
}
