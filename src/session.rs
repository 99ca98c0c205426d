//! Broker session contract and the disposal guard around its subscriptions.

use crate::diagnostics::{DiagnosticEvents, ProviderTopicEvent};
use crate::error::Result;
use crate::TopicName;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Callback invoked once per inbound wire message. `None` is an absent payload.
pub type MessageHandler = Arc<dyn Fn(Option<Bytes>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A live subscription on the external broker.
pub trait SubscriptionHandle: Send + Sync {
    /// Release the subscription. Must be callable from any thread.
    fn dispose(&self);
}

/// Connect and publish primitives of an external pub/sub transport.
#[async_trait]
pub trait BrokerSession: Send + Sync + 'static {
    /// Subscribe to `topic`, invoking `handler` for every inbound message.
    ///
    /// Fails with [`Error::Connection`](crate::Error::Connection) when the
    /// transport cannot be reached.
    async fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> Result<Box<dyn SubscriptionHandle>>;

    /// Publish an encoded payload under `topic`.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;
}

/// Owns one broker subscription and releases it exactly once.
///
/// Disposal cancels the dispatch token handed to the broker callback, so any
/// delivery blocked on a full subscriber buffer is abandoned.
pub struct Session {
    topic: TopicName,
    handle: Box<dyn SubscriptionHandle>,
    diagnostics: Arc<dyn DiagnosticEvents>,
    dispatch: CancellationToken,
    disposed: AtomicBool,
}

impl Session {
    /// Wrap a live broker subscription and its dispatch token
    pub fn new(
        topic: TopicName,
        handle: Box<dyn SubscriptionHandle>,
        diagnostics: Arc<dyn DiagnosticEvents>,
        dispatch: CancellationToken,
    ) -> Self {
        Self {
            topic,
            handle,
            diagnostics,
            dispatch,
            disposed: AtomicBool::new(false),
        }
    }

    /// Get the topic this session subscribes to
    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    /// Check whether the subscription has been released
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Release the subscription. Only the first call has any effect.
    pub fn dispose(&self) {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        debug!("Releasing broker subscription for topic {}", self.topic);
        self.dispatch.cancel();
        self.handle.dispose();
        self.diagnostics
            .provider_topic_info(self.topic.as_str(), ProviderTopicEvent::Unsubscribed);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}
