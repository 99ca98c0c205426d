//! Lazily connected, backpressure-aware topics over an external pub/sub broker.
//!
//! A [`Topic`] multiplexes one broker subscription to any number of local
//! subscribers. The broker subscription is opened when the first subscriber
//! attaches and released when the last one detaches. Every subscriber drains
//! its own bounded buffer, governed by a [`TopicBufferFullMode`].

pub mod broker;
pub mod diagnostics;
pub mod envelope;
pub mod error;
pub mod pubsub;
pub mod serializer;
pub mod session;
mod subject;
pub mod topic;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use broker::InMemoryBroker;
pub use diagnostics::{DiagnosticEvents, NoopDiagnostics, ProviderTopicEvent, TracingDiagnostics};
pub use envelope::{Envelope, MessageKind};
pub use error::{Error, Result};
pub use pubsub::PubSub;
pub use serializer::{BincodeSerializer, JsonSerializer, MessageSerializer};
pub use session::{BrokerSession, MessageHandler, Session, SubscriptionHandle};
pub use topic::{Topic, TopicStatus, TopicSubscription};

/// Maximum length for topic names
pub const MAX_TOPIC_LENGTH: usize = 256;

/// What a subscriber buffer does when a message arrives while it is full.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum TopicBufferFullMode {
    /// Suspend delivery to that subscriber until it drains or the dispatch is cancelled.
    Block,
    /// Discard the incoming message.
    DropNewest,
    /// Evict the oldest buffered message to make room.
    #[default]
    DropOldest,
}

/// Configuration applied to every topic created by a [`PubSub`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Per-subscriber buffer capacity
    pub buffer_capacity: usize,
    /// Overflow policy for full subscriber buffers
    pub full_mode: TopicBufferFullMode,
    /// Prefix prepended to every topic name before it reaches the broker
    pub topic_prefix: Option<String>,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 64,
            full_mode: TopicBufferFullMode::DropOldest,
            topic_prefix: None,
        }
    }
}

impl TopicConfig {
    /// Check the configuration for values a topic cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(Error::InvalidConfig("Buffer capacity cannot be zero".into()));
        }
        if let Some(prefix) = &self.topic_prefix {
            if prefix.chars().any(char::is_whitespace) {
                return Err(Error::InvalidConfig(format!(
                    "Topic prefix contains whitespace: {prefix:?}"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the broker-facing name of a topic
    pub fn qualify(&self, name: &str) -> Result<TopicName> {
        match &self.topic_prefix {
            Some(prefix) => TopicName::new(&format!("{prefix}{name}")),
            None => TopicName::new(name),
        }
    }
}

/// Configuration for the in-memory broker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Name used in logs and errors
    pub name: String,
    /// Maximum number of concurrent broker subscriptions
    pub max_subscriptions: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: "in-memory".to_string(),
            max_subscriptions: 1000,
        }
    }
}

/// Unique identifier for a local subscriber or a broker subscription
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberId {
    /// Create a new random subscriber ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated topic name
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TopicName {
    name: String,
}

impl TopicName {
    /// Create a new topic name
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidTopic("Topic name cannot be empty".into()));
        }
        if name.len() > MAX_TOPIC_LENGTH {
            return Err(Error::TopicTooLong);
        }
        if name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidTopic(format!(
                "Topic name contains whitespace: {name:?}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Get the topic name
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Statistics about the in-memory broker's operation
#[derive(Debug, Clone)]
pub struct BrokerStats {
    /// Number of live broker subscriptions
    pub active_subscriptions: usize,
    /// Total number of subscribe calls that succeeded
    pub subscribe_calls: u64,
    /// Total number of messages published
    pub messages_published: u64,
    /// Total number of handler invocations
    pub messages_delivered: u64,
}
