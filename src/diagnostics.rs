//! Side-channel diagnostic events.
//!
//! Sinks are fire-and-forget: every method has a no-op default, must return
//! quickly and never fails back into the caller.

use crate::error::Error;
use crate::TopicBufferFullMode;
use std::fmt;
use tracing::{debug, info, trace, warn};

/// Broker-side lifecycle event of a topic
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProviderTopicEvent {
    /// The broker subscription for the topic was established
    Subscribed,
    /// The broker subscription for the topic was released
    Unsubscribed,
}

impl fmt::Display for ProviderTopicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderTopicEvent::Subscribed => f.write_str("subscribed to broker topic"),
            ProviderTopicEvent::Unsubscribed => f.write_str("unsubscribed from broker topic"),
        }
    }
}

pub trait DiagnosticEvents: Send + Sync {
    fn provider_topic_info(&self, _topic: &str, _event: ProviderTopicEvent) {}

    /// A non-empty payload arrived from the broker, before decoding.
    fn received(&self, _topic: &str, _payload: &[u8]) {}

    /// An inbound payload could not be processed and was dropped.
    fn message_processing_error(&self, _topic: &str, _error: &Error) {}

    /// A subscriber buffer was full and a message was discarded.
    fn message_dropped(&self, _topic: &str, _mode: TopicBufferFullMode) {}

    fn subscribe(&self, _topic: &str) {}

    fn unsubscribe(&self, _topic: &str) {}

    /// A message was handed to the broker for publishing.
    fn send(&self, _topic: &str, _payload: &[u8]) {}
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl DiagnosticEvents for NoopDiagnostics {}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticEvents for TracingDiagnostics {
    fn provider_topic_info(&self, topic: &str, event: ProviderTopicEvent) {
        info!(topic, "{}", event);
    }

    fn received(&self, topic: &str, payload: &[u8]) {
        trace!(topic, bytes = payload.len(), "Received message");
    }

    fn message_processing_error(&self, topic: &str, error: &Error) {
        warn!(topic, %error, "Dropped inbound message");
    }

    fn message_dropped(&self, topic: &str, mode: TopicBufferFullMode) {
        debug!(topic, ?mode, "Subscriber buffer full, message dropped");
    }

    fn subscribe(&self, topic: &str) {
        debug!(topic, "Local subscriber attached");
    }

    fn unsubscribe(&self, topic: &str) {
        debug!(topic, "Local subscriber detached");
    }

    fn send(&self, topic: &str, payload: &[u8]) {
        trace!(topic, bytes = payload.len(), "Sending message");
    }
}
