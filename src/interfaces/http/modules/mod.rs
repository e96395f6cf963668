pub mod chargers;
pub mod health;
pub mod metrics;
