//! # OCPP Charger Simulator
//!
//! Simulates a fleet of OCPP 1.6 charge points against a real Central System.
//! Each charger boots, heartbeats, runs transactions and reports meter values
//! over its own WebSocket connection; an HTTP API drives the fleet.
//!
//! ## Architecture
//!
//! - **domain**: connection/transaction states, the transaction tracker, errors
//! - **application**: per-charger session actor, timers, registry, event bus
//! - **infrastructure**: transport connectors (WebSocket client, in-process loopback)
//! - **interfaces**: HTTP control API and the fleet event stream
//! - **support**: OCPP-J frame codec, shutdown coordination
//! - **server**: runtime bootstrap shared by the CLI and embedders

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod support;

pub use config::{default_config_path, AppConfig, ConfigError};

pub use application::{
    create_event_bus, ChargerHandle, ChargerRegistry, Event, EventBus, EventMessage,
    SessionSettings, SharedChargerRegistry, SharedEventBus,
};
pub use domain::{ChargerSummary, ConnectionState, PowerOutcome, SimResult, SimulatorError, TransactionPhase};
pub use infrastructure::{LoopbackConnector, LoopbackPeer, TransportConnector, WsConnector};
pub use interfaces::create_api_router;
pub use server::{init_tracing, ServerHandle, ServerOptions};
