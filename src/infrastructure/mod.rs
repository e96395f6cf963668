//! Infrastructure layer - connections to the Central System

pub mod transport;

pub use transport::{
    LoopbackConnector, LoopbackPeer, TransportConnector, TransportEvent, TransportLink,
    WsConnector,
};
