//! Charger module: fleet CRUD, power and transactions

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
