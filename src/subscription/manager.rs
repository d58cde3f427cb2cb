use super::stats::SubscriptionStats;
use crate::error::SyncError;
use crate::event::{BusEvent, TypedEvent};
use crate::nats::{Bus, BusMessage};
use crate::topic::{Topic, TopicPattern};
use anyhow::Result;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Owns the bus handle and hands out subscriptions against it.
///
/// The bus may be attached after construction; until then every subscribe is
/// a logged no-op.
pub struct SubscriptionManager {
    bus: RwLock<Option<Arc<dyn Bus>>>,
    stats: SubscriptionStats,
}

impl SubscriptionManager {
    pub fn new(bus: Arc<dyn Bus>) -> Arc<Self> {
        Arc::new(Self {
            bus: RwLock::new(Some(bus)),
            stats: SubscriptionStats::new(),
        })
    }

    /// Manager whose connection is not established yet
    pub fn not_connected() -> Arc<Self> {
        Arc::new(Self {
            bus: RwLock::new(None),
            stats: SubscriptionStats::new(),
        })
    }

    pub fn attach(&self, bus: Arc<dyn Bus>) {
        *self.bus.write().unwrap_or_else(|e| e.into_inner()) = Some(bus);
        info!("Bus connection attached");
    }

    pub fn bus(&self) -> Option<Arc<dyn Bus>> {
        self.bus.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.bus().is_some()
    }

    pub fn stats(&self) -> &SubscriptionStats {
        &self.stats
    }

    /// New resource scope whose subscriptions end together
    pub fn scope(self: &Arc<Self>) -> SubscriptionScope {
        SubscriptionScope {
            manager: Arc::clone(self),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe `handler` to every event matching `pattern` that arrives
    /// after this resolves.
    ///
    /// Never fails: without a connection, or if the bus refuses, the returned
    /// subscription is inert. Dropping the last clone of the returned handle
    /// unsubscribes.
    pub async fn subscribe<F>(&self, pattern: &TopicPattern, handler: F) -> Subscription
    where
        F: Fn(BusEvent) -> Result<()> + Send + Sync + 'static,
    {
        let Some(bus) = self.bus() else {
            warn!(topic = %pattern, error = %SyncError::ConnectionNotReady, "Subscription is a no-op");
            self.stats.record_not_ready();
            return Subscription::inert(pattern);
        };

        let mut subscriber = match bus.subscribe(pattern).await {
            Ok(s) => s,
            Err(e) => {
                error!(topic = %pattern, error = %e, "Bus refused subscription, degrading to no-op");
                return Subscription::inert(pattern);
            }
        };

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let subscription = Subscription {
            inner: Arc::new(SubscriptionInner {
                pattern: pattern.to_string(),
                active: Arc::new(AtomicBool::new(true)),
                stop: Mutex::new(Some(stop_tx)),
            }),
        };

        let active = Arc::clone(&subscription.inner.active);
        let stats = self.stats.clone();
        let topic = pattern.to_string();
        stats.opened();
        debug!(topic = %topic, "Subscribed");

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    next = subscriber.next() => match next {
                        Some(msg) => {
                            // One message may already be in hand when unsubscribe lands
                            if !active.load(Ordering::SeqCst) {
                                break;
                            }
                            deliver(&topic, msg, &handler, &stats);
                        }
                        None => {
                            debug!(topic = %topic, "Bus closed subscription stream");
                            stats.closed();
                            return;
                        }
                    }
                }
            }

            if let Err(e) = subscriber.unsubscribe().await {
                let failure = SyncError::UnsubscribeFailure {
                    topic: topic.clone(),
                    reason: format!("{e:#}"),
                };
                error!(topic = %topic, error = %failure, "Unsubscribe failed");
                stats.record_unsubscribe_failure();
            } else {
                debug!(topic = %topic, "Unsubscribed");
            }
            stats.closed();
        });

        subscription
    }

    /// Like [`subscribe`](Self::subscribe), but validates payloads first.
    /// Malformed events are logged, counted and dropped.
    pub async fn subscribe_typed<F>(&self, pattern: &TopicPattern, handler: F) -> Subscription
    where
        F: Fn(TypedEvent) -> Result<()> + Send + Sync + 'static,
    {
        let stats = self.stats.clone();
        self.subscribe(pattern, move |event| match event.decode() {
            Ok(typed) => handler(typed),
            Err(e) => {
                warn!(topic = %event.topic, error = %e, "Dropping event");
                stats.record_malformed();
                Ok(())
            }
        })
        .await
    }
}

fn deliver<F>(pattern: &str, msg: BusMessage, handler: &F, stats: &SubscriptionStats)
where
    F: Fn(BusEvent) -> Result<()>,
{
    let topic = match Topic::parse(&msg.subject) {
        Ok(t) => t,
        Err(e) => {
            warn!(subscription = %pattern, error = %e, "Dropping message with unparseable subject");
            stats.record_malformed();
            return;
        }
    };
    stats.record_delivered();
    if let Err(e) = handler(BusEvent::new(topic, msg.payload)) {
        error!(subscription = %pattern, subject = %msg.subject, error = %e, "Error handling message");
        stats.record_handler_failure();
    }
}

struct SubscriptionInner {
    pattern: String,
    active: Arc<AtomicBool>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl SubscriptionInner {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Handle returned by `subscribe`. Cloning shares the same subscription.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    fn inert(pattern: &TopicPattern) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                pattern: pattern.to_string(),
                active: Arc::new(AtomicBool::new(false)),
                stop: Mutex::new(None),
            }),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.inner.pattern
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Stop deliveries. Idempotent and always safe, including after the
    /// connection has dropped. No delivery starts for this subscription once
    /// this returns.
    pub fn unsubscribe(&self) {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let stop = self
            .inner
            .stop
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(stop) = stop {
            // Pump already gone when the bus closed the stream
            let _ = stop.send(());
        }
    }
}

/// Subscriptions belonging to one consumer. Torn down together on
/// `teardown` or drop.
pub struct SubscriptionScope {
    manager: Arc<SubscriptionManager>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl SubscriptionScope {
    pub fn manager(&self) -> &Arc<SubscriptionManager> {
        &self.manager
    }

    pub async fn subscribe<F>(&self, pattern: &TopicPattern, handler: F) -> Subscription
    where
        F: Fn(BusEvent) -> Result<()> + Send + Sync + 'static,
    {
        let sub = self.manager.subscribe(pattern, handler).await;
        self.track(sub.clone());
        sub
    }

    pub async fn subscribe_typed<F>(&self, pattern: &TopicPattern, handler: F) -> Subscription
    where
        F: Fn(TypedEvent) -> Result<()> + Send + Sync + 'static,
    {
        let sub = self.manager.subscribe_typed(pattern, handler).await;
        self.track(sub.clone());
        sub
    }

    fn track(&self, sub: Subscription) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sub);
    }

    /// Number of subscriptions still delivering
    pub fn active_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.is_active())
            .count()
    }

    /// Unsubscribe everything in this scope. Safe to call repeatedly.
    pub fn teardown(&self) {
        let subs: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for sub in &subs {
            sub.unsubscribe();
        }
        if !subs.is_empty() {
            debug!(count = subs.len(), "Scope torn down");
        }
    }
}

impl Drop for SubscriptionScope {
    fn drop(&mut self) {
        self.teardown();
    }
}
