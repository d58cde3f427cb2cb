use super::bus::{Bus, BusMessage, BusSubscriber, Subscriber};
use crate::topic::{Topic, TopicPattern};
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

struct Route {
    sid: u64,
    pattern: TopicPattern,
    tx: mpsc::UnboundedSender<BusMessage>,
}

#[derive(Default)]
struct Routes {
    next_sid: u64,
    routes: Vec<Route>,
}

/// In-process bus with NATS subject semantics.
///
/// Used for offline replay and for exercising views without a server.
pub struct LocalBus {
    routes: Arc<Mutex<Routes>>,
    reconnect_tx: watch::Sender<u64>,
    fail_unsubscribe: Arc<AtomicBool>,
}

impl LocalBus {
    pub fn new() -> Self {
        let (reconnect_tx, _) = watch::channel(0);
        Self {
            routes: Arc::new(Mutex::new(Routes::default())),
            reconnect_tx,
            fail_unsubscribe: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver `payload` to every matching subscriber. Returns the number of
    /// subscribers reached.
    pub fn publish_now(&self, subject: &str, payload: Vec<u8>) -> Result<usize> {
        let topic = Topic::parse(subject)?;
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let mut delivered = 0;
        routes.routes.retain(|route| {
            if !route.pattern.matches(&topic) {
                return true;
            }
            let sent = route
                .tx
                .send(BusMessage {
                    subject: subject.to_string(),
                    payload: payload.clone(),
                })
                .is_ok();
            if sent {
                delivered += 1;
            }
            sent
        });
        debug!(subject = %subject, delivered, "Local publish");
        Ok(delivered)
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .routes
            .len()
    }

    /// Pretend the connection dropped and came back
    pub fn simulate_reconnect(&self) {
        self.reconnect_tx.send_modify(|n| *n += 1);
    }

    /// Make every following `unsubscribe` call report failure
    pub fn fail_unsubscribes(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for LocalBus {
    fn subscribe<'a>(&'a self, pattern: &'a TopicPattern) -> BoxFuture<'a, Result<Subscriber>> {
        async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let sid = {
                let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
                routes.next_sid += 1;
                let sid = routes.next_sid;
                routes.routes.push(Route {
                    sid,
                    pattern: pattern.clone(),
                    tx,
                });
                sid
            };
            Ok(Box::new(LocalSubscriber {
                sid,
                stream: UnboundedReceiverStream::new(rx),
                routes: Arc::downgrade(&self.routes),
                fail: Arc::clone(&self.fail_unsubscribe),
            }) as Subscriber)
        }
        .boxed()
    }

    fn publish<'a>(&'a self, subject: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        async move { self.publish_now(subject, payload).map(|_| ()) }.boxed()
    }

    fn reconnects(&self) -> watch::Receiver<u64> {
        self.reconnect_tx.subscribe()
    }
}

struct LocalSubscriber {
    sid: u64,
    stream: UnboundedReceiverStream<BusMessage>,
    routes: Weak<Mutex<Routes>>,
    fail: Arc<AtomicBool>,
}

impl LocalSubscriber {
    fn detach(&self) {
        if let Some(routes) = self.routes.upgrade() {
            let mut routes = routes.lock().unwrap_or_else(|e| e.into_inner());
            routes.routes.retain(|r| r.sid != self.sid);
        }
    }
}

impl Stream for LocalSubscriber {
    type Item = BusMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

impl BusSubscriber for LocalSubscriber {
    fn unsubscribe(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        async move {
            self.detach();
            if self.fail.load(Ordering::SeqCst) {
                bail!("local bus refused unsubscribe for sid {}", self.sid);
            }
            Ok(())
        }
        .boxed()
    }
}

impl Drop for LocalSubscriber {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers_only() {
        let bus = LocalBus::new();
        let placed = TopicPattern::parse("simulation.1.agent.*.placed").unwrap();
        let mut sub = bus.subscribe(&placed).await.unwrap();

        assert_eq!(bus.publish_now("simulation.1.agent.a1.placed", b"{}".to_vec()).unwrap(), 1);
        assert_eq!(bus.publish_now("simulation.1.agent.a1.moved", b"{}".to_vec()).unwrap(), 0);

        let msg = sub.next().await.unwrap();
        assert_eq!(msg.subject, "simulation.1.agent.a1.placed");
    }

    #[tokio::test]
    async fn test_unsubscribe_detaches_route() {
        let bus = LocalBus::new();
        let pattern = TopicPattern::parse("simulation.1.>").unwrap();
        let sub = bus.subscribe(&pattern).await.unwrap();
        assert_eq!(bus.subscription_count(), 1);

        sub.unsubscribe().await.unwrap();
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_unsubscribe_still_detaches() {
        let bus = LocalBus::new();
        bus.fail_unsubscribes(true);
        let pattern = TopicPattern::parse("simulation.1.tick").unwrap();
        let sub = bus.subscribe(&pattern).await.unwrap();

        assert!(sub.unsubscribe().await.is_err());
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_counter() {
        let bus = LocalBus::new();
        let rx = bus.reconnects();
        bus.simulate_reconnect();
        assert_eq!(*rx.borrow(), 1);
    }
}
