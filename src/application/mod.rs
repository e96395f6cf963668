pub mod charging;
pub mod events;

pub use charging::{ChargerHandle, ChargerRegistry, SessionSettings, SharedChargerRegistry};
pub use events::{create_event_bus, Event, EventBus, EventMessage, EventSubscriber, SharedEventBus};
