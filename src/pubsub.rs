//! Registry of topics over one broker session.
//!
//! `PubSub` creates topics on first use, publishes encoded envelopes through
//! the broker and evicts topics that no longer serve anyone.

use crate::diagnostics::DiagnosticEvents;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::serializer::MessageSerializer;
use crate::session::BrokerSession;
use crate::topic::{Topic, TopicStatus, TopicSubscription};
use crate::TopicConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PubSub<T> {
    broker: Arc<dyn BrokerSession>,
    serializer: Arc<dyn MessageSerializer<T>>,
    diagnostics: Arc<dyn DiagnosticEvents>,
    config: TopicConfig,
    topics: RwLock<HashMap<String, Topic<T>>>,
}

impl<T> PubSub<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a registry over `broker`. Fails if `config` is invalid.
    pub fn new(
        broker: Arc<dyn BrokerSession>,
        serializer: Arc<dyn MessageSerializer<T>>,
        diagnostics: Arc<dyn DiagnosticEvents>,
        config: TopicConfig,
    ) -> Result<Self> {
        config.validate()?;
        info!("Creating pub/sub with config: {:?}", config);

        Ok(Self {
            broker,
            serializer,
            diagnostics,
            config,
            topics: RwLock::new(HashMap::new()),
        })
    }

    /// Get the configuration applied to every topic
    pub fn config(&self) -> &TopicConfig {
        &self.config
    }

    /// Get the topic registered under `name`, creating it if needed.
    ///
    /// A completed topic is replaced by a fresh one.
    pub fn topic(&self, name: &str) -> Result<Topic<T>> {
        let qualified = self.config.qualify(name)?;

        if let Some(topic) = self.topics.read().get(qualified.as_str()) {
            if topic.status() != TopicStatus::Completed {
                return Ok(topic.clone());
            }
        }

        let mut topics = self.topics.write();
        if let Some(topic) = topics.get(qualified.as_str()) {
            if topic.status() != TopicStatus::Completed {
                return Ok(topic.clone());
            }
        }

        debug!("Registering topic {}", qualified);
        let topic = Topic::new(
            qualified.clone(),
            &self.config,
            Arc::clone(&self.broker),
            Arc::clone(&self.serializer),
            Arc::clone(&self.diagnostics),
        )?;
        topics.insert(qualified.as_str().to_string(), topic.clone());
        Ok(topic)
    }

    /// Subscribe to the topic registered under `name`
    pub async fn subscribe(&self, name: &str) -> Result<TopicSubscription<T>> {
        self.topic(name)?.subscribe().await
    }

    /// Encode `message` and publish it to the broker under `name`.
    pub async fn send(&self, name: &str, message: T) -> Result<()> {
        self.send_envelope(name, &Envelope::Data(message)).await
    }

    /// Publish the completion signal under `name`.
    pub async fn complete(&self, name: &str) -> Result<()> {
        self.send_envelope(name, &Envelope::Completed).await
    }

    async fn send_envelope(&self, name: &str, envelope: &Envelope<T>) -> Result<()> {
        let qualified = self.config.qualify(name)?;
        let payload = self.serializer.encode(envelope)?;

        debug!(
            "Publishing {:?} to topic {} ({} bytes)",
            envelope.kind(),
            qualified,
            payload.len()
        );
        self.diagnostics.send(qualified.as_str(), &payload);
        self.broker.publish(qualified.as_str(), payload).await
    }

    /// Drop topics nobody uses: no connection, no subscribers, no subscribe
    /// in flight and no outside handle. Returns the number of topics removed.
    pub fn evict_idle(&self) -> usize {
        let mut topics = self.topics.write();
        let before = topics.len();
        topics.retain(|_, topic| !topic.is_idle());
        let evicted = before - topics.len();
        if evicted > 0 {
            debug!("Evicted {} idle topic(s)", evicted);
        }
        evicted
    }

    /// Get the qualified names of registered topics, sorted
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.topics.read().keys().cloned().collect();
        names.sort();
        names
    }
}
