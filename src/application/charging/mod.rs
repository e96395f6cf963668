//! Simulated charge points: session actor, timers, pending calls and the fleet registry

pub mod messages;
pub mod pending;
pub mod registry;
pub mod scheduler;
pub mod session;

pub use messages::CallAction;
pub use registry::{ChargerRegistry, SharedChargerRegistry};
pub use session::{ChargerHandle, SessionSettings};
