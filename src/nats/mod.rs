// Pub/sub bus seam and its NATS / in-process implementations

mod bus;
mod client;
mod local;

pub use bus::{Bus, BusMessage, BusSubscriber, Subscriber};
pub use client::{NatsBus, NatsConfig};
pub use local::LocalBus;
