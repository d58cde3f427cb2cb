use super::bus::{Bus, BusMessage, BusSubscriber, Subscriber};
use crate::topic::TopicPattern;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use serde::Deserialize;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::watch;
use tracing::{info, warn};

/// NATS configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

fn default_name() -> String {
    "simwatch".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            name: default_name(),
        }
    }
}

/// Bus backed by a single multiplexed NATS connection
pub struct NatsBus {
    client: async_nats::Client,
    reconnects: watch::Receiver<u64>,
}

impl NatsBus {
    /// Connect to NATS and start tracking reconnects
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let (reconnect_tx, reconnects) = watch::channel(0u64);
        let reconnect_tx = Arc::new(reconnect_tx);
        let dropped = Arc::new(AtomicBool::new(false));

        let client = async_nats::ConnectOptions::new()
            .name(&config.name)
            .event_callback(move |event| {
                let reconnect_tx = Arc::clone(&reconnect_tx);
                let dropped = Arc::clone(&dropped);
                async move {
                    match event {
                        async_nats::Event::Disconnected => {
                            warn!("NATS connection dropped");
                            dropped.store(true, Ordering::SeqCst);
                        }
                        async_nats::Event::Connected => {
                            // Only a connect that follows a drop is a reconnect
                            if dropped.swap(false, Ordering::SeqCst) {
                                info!("NATS connection re-established");
                                reconnect_tx.send_modify(|n| *n += 1);
                            }
                        }
                        other => warn!(event = %other, "NATS connection event"),
                    }
                }
            })
            .connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        Ok(Self { client, reconnects })
    }

    /// Get underlying NATS client
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }
}

impl Bus for NatsBus {
    fn subscribe<'a>(&'a self, pattern: &'a TopicPattern) -> BoxFuture<'a, Result<Subscriber>> {
        async move {
            let inner = self
                .client
                .subscribe(pattern.to_string())
                .await
                .context(format!("Failed to subscribe to '{}'", pattern))?;
            Ok(Box::new(NatsSubscriber { inner }) as Subscriber)
        }
        .boxed()
    }

    fn publish<'a>(&'a self, subject: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        async move {
            self.client
                .publish(subject.to_string(), payload.into())
                .await
                .context(format!("Failed to publish to '{}'", subject))
        }
        .boxed()
    }

    fn reconnects(&self) -> watch::Receiver<u64> {
        self.reconnects.clone()
    }
}

struct NatsSubscriber {
    inner: async_nats::Subscriber,
}

impl Stream for NatsSubscriber {
    type Item = BusMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx).map(|msg| {
            msg.map(|m| BusMessage {
                subject: m.subject.to_string(),
                payload: m.payload.to_vec(),
            })
        })
    }
}

impl BusSubscriber for NatsSubscriber {
    fn unsubscribe(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        async move {
            self.inner
                .unsubscribe()
                .await
                .context("Failed to unsubscribe from NATS")
        }
        .boxed()
    }
}
