//! Wire envelope types, channel naming, and the in-process message bus
//! standing in for the external broker.
pub mod bus;
pub mod channels;
pub mod envelope;
pub mod messages;

pub use bus::InMemoryBus;
pub use bus::MessageBus;
pub use envelope::Envelope;
