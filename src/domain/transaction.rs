//! Transaction tracker for a single connector

use chrono::{DateTime, Utc};

use super::charger::TransactionPhase;

/// An in-progress charging session.
///
/// Created when StartTransaction is sent (pending), activated once the
/// Central System assigns a `transactionId`, dropped on stop.
#[derive(Debug, Clone)]
pub struct Transaction {
    id_tag: String,
    transaction_id: Option<i32>,
    energy_wh: f64,
    start_call_id: String,
    started_at: DateTime<Utc>,
}

impl Transaction {
    pub fn pending(id_tag: impl Into<String>, start_call_id: impl Into<String>) -> Self {
        Self {
            id_tag: id_tag.into(),
            transaction_id: None,
            energy_wh: 0.0,
            start_call_id: start_call_id.into(),
            started_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> TransactionPhase {
        match self.transaction_id {
            Some(_) => TransactionPhase::Active,
            None => TransactionPhase::Pending,
        }
    }

    pub fn activate(&mut self, transaction_id: i32) {
        self.transaction_id = Some(transaction_id);
    }

    /// Accumulate delivered energy. Negative or non-finite amounts are ignored
    /// so the register never decreases.
    pub fn add_energy(&mut self, wh: f64) {
        if wh.is_finite() && wh > 0.0 {
            self.energy_wh += wh;
        }
    }

    pub fn id_tag(&self) -> &str {
        &self.id_tag
    }

    pub fn transaction_id(&self) -> Option<i32> {
        self.transaction_id
    }

    pub fn energy_wh(&self) -> f64 {
        self.energy_wh
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Correlation id of the StartTransaction call that created this transaction.
    pub fn start_call_id(&self) -> &str {
        &self.start_call_id
    }

    /// Meter register in whole Wh, as reported in StopTransaction.meterStop.
    pub fn meter_stop(&self) -> i32 {
        self.energy_wh.round() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_pending_to_active() {
        let mut tx = Transaction::pending("TAG1", "CP1-7");
        assert_eq!(tx.phase(), TransactionPhase::Pending);
        assert_eq!(tx.transaction_id(), None);
        assert_eq!(tx.start_call_id(), "CP1-7");

        tx.activate(42);
        assert_eq!(tx.phase(), TransactionPhase::Active);
        assert_eq!(tx.transaction_id(), Some(42));
    }

    #[test]
    fn energy_is_non_decreasing() {
        let mut tx = Transaction::pending("TAG1", "CP1-1");
        assert_eq!(tx.energy_wh(), 0.0);
        tx.add_energy(10.5);
        tx.add_energy(-3.0);
        tx.add_energy(f64::NAN);
        tx.add_energy(0.25);
        assert_eq!(tx.energy_wh(), 10.75);
        assert_eq!(tx.meter_stop(), 11);
    }
}
