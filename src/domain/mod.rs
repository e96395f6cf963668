//! Domain layer - charger states, transactions and errors
//!
//! Pure types with no I/O; the session actor drives them.

pub mod charger;
pub mod error;
pub mod meter;
pub mod transaction;

pub use charger::{ChargerSummary, ConnectionState, PowerOutcome, TransactionPhase};
pub use error::{SimResult, SimulatorError};
pub use meter::{LoadProfile, MeterSample};
pub use transaction::Transaction;
