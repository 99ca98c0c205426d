//! An in-process [`BrokerSession`] with subject wildcards.
//!
//! Handlers are invoked sequentially in the publisher's task, so a handler that
//! suspends (for example on a blocked topic buffer) applies backpressure to the
//! publisher.

use crate::error::{Error, Result};
use crate::session::{BrokerSession, MessageHandler, SubscriptionHandle};
use crate::subject::SubjectMatcher;
use crate::{BrokerConfig, BrokerStats, SubscriberId};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Statistics counters for the broker
#[derive(Default)]
struct Counters {
    subscribe_calls: AtomicU64,
    messages_published: AtomicU64,
    messages_delivered: AtomicU64,
}

struct SubscriptionEntry {
    matcher: SubjectMatcher,
    handler: MessageHandler,
}

struct Shared {
    subscriptions: RwLock<HashMap<SubscriberId, SubscriptionEntry>>,
    counters: Counters,
    reachable: AtomicBool,
    config: BrokerConfig,
}

/// The broker keeps subscriptions in memory and delivers published payloads to
/// every subscription whose pattern matches the subject.
#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    /// Create a new broker instance
    pub fn new(config: BrokerConfig) -> Result<Self> {
        info!("Creating in-memory broker with config: {:?}", config);

        if config.max_subscriptions == 0 {
            return Err(Error::InvalidConfig(
                "Subscription limit cannot be zero".into(),
            ));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                subscriptions: RwLock::new(HashMap::new()),
                counters: Counters::default(),
                reachable: AtomicBool::new(true),
                config,
            }),
        })
    }

    /// Simulate the transport going away; subsequent subscribes fail.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.store(reachable, Ordering::Release);
    }

    /// Deliver a raw payload, including absent or empty ones, to every matching
    /// subscription. Returns the number of handlers invoked.
    pub async fn publish_raw(&self, subject: &str, payload: Option<Bytes>) -> usize {
        let handlers: Vec<MessageHandler> = {
            let subs = self.shared.subscriptions.read();
            subs.values()
                .filter(|entry| entry.matcher.matches(subject))
                .map(|entry| Arc::clone(&entry.handler))
                .collect()
        };

        self.shared
            .counters
            .messages_published
            .fetch_add(1, Ordering::Relaxed);
        debug!(
            "Delivering message on subject {} to {} subscription(s)",
            subject,
            handlers.len()
        );

        for handler in &handlers {
            handler(payload.clone()).await;
            self.shared
                .counters
                .messages_delivered
                .fetch_add(1, Ordering::Relaxed);
        }

        handlers.len()
    }

    /// Get broker statistics
    pub fn stats(&self) -> BrokerStats {
        let counters = &self.shared.counters;
        BrokerStats {
            active_subscriptions: self.shared.subscriptions.read().len(),
            subscribe_calls: counters.subscribe_calls.load(Ordering::Relaxed),
            messages_published: counters.messages_published.load(Ordering::Relaxed),
            messages_delivered: counters.messages_delivered.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl BrokerSession for InMemoryBroker {
    async fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> Result<Box<dyn SubscriptionHandle>> {
        if !self.shared.reachable.load(Ordering::Acquire) {
            warn!("Broker {} unreachable, cannot subscribe to {}", self.shared.config.name, topic);
            return Err(Error::Connection {
                topic: topic.to_string(),
                reason: format!("broker {} is unreachable", self.shared.config.name),
            });
        }

        let mut subs = self.shared.subscriptions.write();
        if subs.len() >= self.shared.config.max_subscriptions {
            warn!(
                "Subscription limit exceeded for broker {}: {}",
                self.shared.config.name, self.shared.config.max_subscriptions
            );
            return Err(Error::SubscriptionLimitExceeded(
                self.shared.config.name.clone(),
            ));
        }

        let id = SubscriberId::new();
        debug!("Subscription {} registered for pattern: {}", id, topic);
        subs.insert(
            id,
            SubscriptionEntry {
                matcher: SubjectMatcher::new(topic),
                handler,
            },
        );
        self.shared
            .counters
            .subscribe_calls
            .fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(InMemorySubscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.publish_raw(topic, Some(payload)).await;
        Ok(())
    }
}

struct InMemorySubscription {
    id: SubscriberId,
    shared: Weak<Shared>,
}

impl SubscriptionHandle for InMemorySubscription {
    fn dispose(&self) {
        if let Some(shared) = self.shared.upgrade() {
            if let Some(entry) = shared.subscriptions.write().remove(&self.id) {
                debug!("Subscription {} removed for pattern: {}", self.id, entry.matcher);
            }
        }
    }
}
