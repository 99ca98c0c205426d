//! The topic engine.
//!
//! A topic holds one [`Session`] on the broker while it has at least one local
//! subscriber. Lifecycle changes (connect on the first subscriber, teardown on
//! the last) are serialized by an async gate so a topic never connects twice.
//! The subscriber set, the connection and the completion flag share one short
//! synchronous lock which is never held across an await, so the broker
//! callback can publish or complete while a connect is in flight.

mod buffer;
mod dispatch;
mod subscription;

pub use subscription::TopicSubscription;

use crate::diagnostics::DiagnosticEvents;
use crate::error::{Error, Result};
use crate::serializer::MessageSerializer;
use crate::session::{BrokerSession, Session};
use crate::{SubscriberId, TopicBufferFullMode, TopicConfig, TopicName};
use buffer::{PushOutcome, SubscriberBuffer};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Lifecycle state of a topic
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TopicStatus {
    Unconnected,
    Connected,
    Completed,
}

struct TopicState<T> {
    subscribers: HashMap<SubscriberId, Arc<SubscriberBuffer<T>>>,
    connection: Option<Session>,
    completed: bool,
}

pub(crate) struct TopicInner<T> {
    name: TopicName,
    capacity: usize,
    full_mode: TopicBufferFullMode,
    broker: Arc<dyn BrokerSession>,
    serializer: Arc<dyn MessageSerializer<T>>,
    diagnostics: Arc<dyn DiagnosticEvents>,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<TopicState<T>>,
}

/// A named channel multiplexing one broker subscription to many local
/// subscribers. Cloning is cheap and yields a handle to the same topic.
pub struct Topic<T> {
    inner: Arc<TopicInner<T>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Topic<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an unconnected topic. Fails if `config` is invalid.
    pub fn new(
        name: TopicName,
        config: &TopicConfig,
        broker: Arc<dyn BrokerSession>,
        serializer: Arc<dyn MessageSerializer<T>>,
        diagnostics: Arc<dyn DiagnosticEvents>,
    ) -> Result<Self> {
        config.validate()?;
        debug!(
            "Creating topic {} (capacity {}, {:?})",
            name, config.buffer_capacity, config.full_mode
        );

        Ok(Self {
            inner: Arc::new(TopicInner {
                name,
                capacity: config.buffer_capacity,
                full_mode: config.full_mode,
                broker,
                serializer,
                diagnostics,
                gate: tokio::sync::Mutex::new(()),
                state: Mutex::new(TopicState {
                    subscribers: HashMap::new(),
                    connection: None,
                    completed: false,
                }),
            }),
        })
    }

    /// Get the topic name
    pub fn name(&self) -> &TopicName {
        &self.inner.name
    }

    /// Get the per-subscriber buffer capacity
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Get the policy applied when a subscriber buffer is full
    pub fn full_mode(&self) -> TopicBufferFullMode {
        self.inner.full_mode
    }

    /// Get the lifecycle state
    pub fn status(&self) -> TopicStatus {
        self.inner.status()
    }

    /// Check whether the topic holds a broker subscription
    pub fn is_connected(&self) -> bool {
        self.inner.status() == TopicStatus::Connected
    }

    /// Get the number of attached local subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Attach a local subscriber, connecting to the broker if it is the first.
    ///
    /// A failed connect is returned to the caller and leaves the topic without
    /// a connection or subscriber; subscribing again retries.
    pub async fn subscribe(&self) -> Result<TopicSubscription<T>> {
        self.inner.subscribe().await
    }

    /// Detach a subscriber by id. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        self.inner.unsubscribe(id).await
    }

    /// Offer `message` to every attached subscriber.
    ///
    /// Returns `false` if the topic has completed or a blocked delivery was
    /// abandoned through `cancel`.
    pub async fn publish(&self, message: T, cancel: &CancellationToken) -> bool {
        self.inner.publish(message, cancel).await
    }

    /// Mark the topic completed. Returns `false` if it already was.
    pub fn try_complete(&self) -> bool {
        self.inner.try_complete()
    }

    /// True when nothing but this handle refers to the topic and it has no
    /// connection, no subscribers and no lifecycle change in flight.
    pub(crate) fn is_idle(&self) -> bool {
        if Arc::strong_count(&self.inner) > 1 {
            return false;
        }
        let Ok(_gate) = self.inner.gate.try_lock() else {
            return false;
        };
        let state = self.inner.state.lock();
        state.connection.is_none() && state.subscribers.is_empty()
    }
}

impl<T> TopicInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn status(&self) -> TopicStatus {
        let state = self.state.lock();
        if state.completed {
            TopicStatus::Completed
        } else if state.connection.is_some() {
            TopicStatus::Connected
        } else {
            TopicStatus::Unconnected
        }
    }

    async fn subscribe(self: &Arc<Self>) -> Result<TopicSubscription<T>> {
        let _gate = self.gate.lock().await;

        let needs_connect = {
            let state = self.state.lock();
            if state.completed {
                return Err(Error::TopicCompleted(self.name.to_string()));
            }
            state.connection.is_none()
        };

        let session = if needs_connect {
            match dispatch::connect(self).await {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!("Failed to connect topic {}: {}", self.name, e);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let id = SubscriberId::new();
        let buffer = Arc::new(SubscriberBuffer::new(self.capacity, self.full_mode));
        {
            let mut state = self.state.lock();
            if state.completed {
                drop(state);
                if let Some(session) = session {
                    session.dispose();
                }
                return Err(Error::TopicCompleted(self.name.to_string()));
            }
            if let Some(session) = session {
                state.connection = Some(session);
            }
            state.subscribers.insert(id, Arc::clone(&buffer));
        }

        debug!("Subscriber {} attached to topic {}", id, self.name);
        self.diagnostics.subscribe(self.name.as_str());
        Ok(TopicSubscription::new(
            id,
            self.name.clone(),
            buffer,
            Arc::downgrade(self),
        ))
    }

    pub(crate) async fn unsubscribe(&self, id: SubscriberId) {
        let _gate = self.gate.lock().await;

        let released = {
            let mut state = self.state.lock();
            let Some(buffer) = state.subscribers.remove(&id) else {
                trace!("Subscriber {} already detached from topic {}", id, self.name);
                return;
            };
            buffer.close();
            if state.subscribers.is_empty() {
                state.connection.take()
            } else {
                None
            }
        };

        debug!("Subscriber {} detached from topic {}", id, self.name);
        self.diagnostics.unsubscribe(self.name.as_str());
        if let Some(session) = released {
            info!("Last subscriber left topic {}, disconnecting", self.name);
            session.dispose();
        }
    }

    async fn publish(&self, message: T, cancel: &CancellationToken) -> bool {
        let targets: Vec<Arc<SubscriberBuffer<T>>> = {
            let state = self.state.lock();
            if state.completed {
                trace!("Publish to completed topic {} ignored", self.name);
                return false;
            }
            state.subscribers.values().cloned().collect()
        };

        let outcomes = join_all(
            targets
                .iter()
                .map(|buffer| buffer.push(message.clone(), cancel)),
        )
        .await;

        let mut delivered = true;
        for outcome in outcomes {
            match outcome {
                PushOutcome::Enqueued | PushOutcome::Closed => {}
                PushOutcome::EvictedOldest => self
                    .diagnostics
                    .message_dropped(self.name.as_str(), TopicBufferFullMode::DropOldest),
                PushOutcome::DroppedNewest => self
                    .diagnostics
                    .message_dropped(self.name.as_str(), TopicBufferFullMode::DropNewest),
                PushOutcome::Cancelled | PushOutcome::Completed => delivered = false,
            }
        }
        delivered
    }

    fn try_complete(&self) -> bool {
        let (connection, buffers) = {
            let mut state = self.state.lock();
            if state.completed {
                return false;
            }
            state.completed = true;
            let buffers: Vec<_> = state.subscribers.drain().map(|(_, buffer)| buffer).collect();
            (state.connection.take(), buffers)
        };

        info!(
            "Topic {} completed with {} subscriber(s) draining",
            self.name,
            buffers.len()
        );
        for buffer in buffers {
            buffer.complete();
        }
        if let Some(session) = connection {
            session.dispose();
        }
        true
    }
}

impl<T> Drop for TopicInner<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.subscribers.is_empty() && state.connection.is_none() {
            return;
        }

        debug!(
            "Topic {} dropped with {} subscriber(s) attached, completing them",
            self.name,
            state.subscribers.len()
        );
        for (_, buffer) in state.subscribers.drain() {
            buffer.complete();
        }
        if let Some(session) = state.connection.take() {
            session.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BrokerConfig, InMemoryBroker, JsonSerializer, NoopDiagnostics, TracingDiagnostics};
    use std::time::Duration;
    use tokio_test::{assert_pending, task};
    use tracing_test::traced_test;

    fn topic(broker: &InMemoryBroker, config: TopicConfig) -> Topic<String> {
        Topic::new(
            TopicName::new("prices").unwrap(),
            &config,
            Arc::new(broker.clone()),
            Arc::new(JsonSerializer),
            Arc::new(NoopDiagnostics),
        )
        .unwrap()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let broker = InMemoryBroker::new(BrokerConfig::default()).unwrap();
        let result: Result<Topic<String>> = Topic::new(
            TopicName::new("prices").unwrap(),
            &TopicConfig {
                buffer_capacity: 0,
                ..Default::default()
            },
            Arc::new(broker),
            Arc::new(JsonSerializer),
            Arc::new(NoopDiagnostics),
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let broker = InMemoryBroker::new(BrokerConfig::default()).unwrap();
        let topic = topic(&broker, TopicConfig::default());
        assert_eq!(topic.status(), TopicStatus::Unconnected);

        let sub = topic.subscribe().await.unwrap();
        assert_eq!(topic.status(), TopicStatus::Connected);

        sub.unsubscribe().await;
        assert_eq!(topic.status(), TopicStatus::Unconnected);

        let _sub = topic.subscribe().await.unwrap();
        assert!(topic.try_complete());
        assert!(!topic.try_complete());
        assert_eq!(topic.status(), TopicStatus::Completed);
        assert_eq!(topic.subscriber_count(), 0);
        assert_eq!(broker.stats().active_subscriptions, 0);
    }

    #[tokio::test]
    async fn test_subscribe_after_completion_fails() {
        let broker = InMemoryBroker::new(BrokerConfig::default()).unwrap();
        let topic = topic(&broker, TopicConfig::default());
        topic.try_complete();

        assert!(matches!(
            topic.subscribe().await,
            Err(Error::TopicCompleted(_))
        ));
        assert_eq!(broker.stats().subscribe_calls, 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let broker = InMemoryBroker::new(BrokerConfig::default()).unwrap();
        let topic = topic(&broker, TopicConfig::default());
        assert!(topic.publish("x".into(), &CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn test_idle_only_without_users() {
        let broker = InMemoryBroker::new(BrokerConfig::default()).unwrap();
        let topic = topic(&broker, TopicConfig::default());
        assert!(topic.is_idle());

        let other = topic.clone();
        assert!(!topic.is_idle());
        drop(other);

        let sub = topic.subscribe().await.unwrap();
        assert!(!topic.is_idle());
        sub.unsubscribe().await;
        assert!(topic.is_idle());

        let _gate = topic.inner.gate.lock().await;
        assert!(!topic.is_idle());
    }

    #[tokio::test]
    async fn test_abandoned_unsubscribe_still_detaches() {
        let broker = InMemoryBroker::new(BrokerConfig::default()).unwrap();
        let topic = topic(&broker, TopicConfig::default());
        let sub = topic.subscribe().await.unwrap();

        let gate = topic.inner.gate.lock().await;
        let mut unsubscribing = task::spawn(sub.unsubscribe());
        assert_pending!(unsubscribing.poll());
        drop(unsubscribing);
        drop(gate);

        for _ in 0..100 {
            if topic.subscriber_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(topic.subscriber_count(), 0);
        assert!(!topic.is_connected());
        assert_eq!(broker.stats().active_subscriptions, 0);
    }

    #[tokio::test]
    async fn test_dropping_last_handle_completes_subscribers() {
        let broker = InMemoryBroker::new(BrokerConfig::default()).unwrap();
        let topic = topic(&broker, TopicConfig::default());
        let mut sub = topic.subscribe().await.unwrap();
        topic.publish("last".into(), &CancellationToken::new()).await;

        drop(topic);
        assert_eq!(broker.stats().active_subscriptions, 0);
        assert_eq!(sub.try_recv().unwrap(), "last");
        assert!(matches!(sub.try_recv(), Err(Error::EndOfStream)));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_lifecycle_is_logged() {
        let broker = InMemoryBroker::new(BrokerConfig::default()).unwrap();
        let topic: Topic<String> = Topic::new(
            TopicName::new("prices").unwrap(),
            &TopicConfig::default(),
            Arc::new(broker.clone()),
            Arc::new(JsonSerializer),
            Arc::new(TracingDiagnostics),
        )
        .unwrap();

        let sub = topic.subscribe().await.unwrap();
        sub.unsubscribe().await;

        assert!(logs_contain("subscribed to broker topic"));
        assert!(logs_contain("Last subscriber left topic prices"));
        assert!(logs_contain("unsubscribed from broker topic"));
    }
}
