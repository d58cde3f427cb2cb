use crate::topic::TopicPattern;
use anyhow::Result;
use futures::future::BoxFuture;
use futures::Stream;
use tokio::sync::watch;

/// One message as it came off the wire
#[derive(Clone, Debug)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Live subscription on the bus. Dropping it also unsubscribes, but only
/// `unsubscribe` reports failure.
pub trait BusSubscriber: Stream<Item = BusMessage> + Send + Unpin {
    fn unsubscribe(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

pub type Subscriber = Box<dyn BusSubscriber>;

/// Pub/sub connection, shared by every subscription of a session.
pub trait Bus: Send + Sync {
    /// Register interest in `pattern`. Messages published after this
    /// resolves are delivered to the returned subscriber.
    fn subscribe<'a>(&'a self, pattern: &'a TopicPattern) -> BoxFuture<'a, Result<Subscriber>>;

    fn publish<'a>(&'a self, subject: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<()>>;

    /// Counter bumped each time the connection comes back after a drop.
    fn reconnects(&self) -> watch::Receiver<u64>;
}
