//! Interface adapters: the HTTP control API and the event WebSocket

pub mod http;
pub mod ws;

pub use http::create_api_router;
