//! Domain traits - Abstractions for infrastructure implementations

pub mod gateway;
pub mod store;

pub use gateway::{EventSink, Gateway, GatewayEvent};
pub use store::StateStore;
