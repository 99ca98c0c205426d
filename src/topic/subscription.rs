use super::buffer::SubscriberBuffer;
use super::TopicInner;
use crate::error::{Error, Result};
use crate::{SubscriberId, TopicName};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

/// A local subscriber attached to a [`Topic`](super::Topic).
///
/// Messages are drained from the subscriber's own bounded buffer. Dropping the
/// handle without calling [`unsubscribe`](Self::unsubscribe) closes the buffer
/// and detaches from the topic on the current Tokio runtime, if there is one.
pub struct TopicSubscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: SubscriberId,
    topic_name: TopicName,
    buffer: Arc<SubscriberBuffer<T>>,
    topic: Weak<TopicInner<T>>,
    detached: bool,
}

impl<T> TopicSubscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(super) fn new(
        id: SubscriberId,
        topic_name: TopicName,
        buffer: Arc<SubscriberBuffer<T>>,
        topic: Weak<TopicInner<T>>,
    ) -> Self {
        Self {
            id,
            topic_name,
            buffer,
            topic,
            detached: false,
        }
    }

    /// Get the subscriber ID
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Get the name of the topic this subscriber is attached to
    pub fn topic_name(&self) -> &TopicName {
        &self.topic_name
    }

    /// Number of buffered, undelivered messages
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Receive the next message; `None` marks the end of the stream.
    pub async fn recv(&mut self) -> Option<T> {
        self.buffer.pop().await
    }

    /// Receive without waiting. Fails with [`Error::BufferEmpty`] when nothing
    /// is buffered and [`Error::EndOfStream`] once the topic has completed.
    pub fn try_recv(&mut self) -> Result<T> {
        self.buffer.try_pop()
    }

    /// Receive a message with timeout
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, self.buffer.pop()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(Error::EndOfStream),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Receive whatever is buffered, up to `max_messages`
    pub fn recv_batch(&mut self, max_messages: usize) -> Result<Vec<T>> {
        let mut messages = Vec::with_capacity(max_messages);

        for _ in 0..max_messages {
            match self.buffer.try_pop() {
                Ok(message) => messages.push(message),
                Err(Error::BufferEmpty) => break,
                Err(e) if messages.is_empty() => return Err(e),
                Err(_) => break,
            }
        }

        Ok(messages)
    }

    /// Detach from the topic, disconnecting it if this was the last subscriber.
    pub async fn unsubscribe(mut self) {
        if let Some(topic) = self.topic.upgrade() {
            topic.unsubscribe(self.id).await;
        }
        self.detached = true;
    }
}

impl<T> Drop for TopicSubscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        self.buffer.close();

        let Some(topic) = self.topic.upgrade() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let id = self.id;
                runtime.spawn(async move { topic.unsubscribe(id).await });
            }
            Err(_) => debug!(
                "Subscriber {} dropped outside a runtime, topic {} keeps it until completion",
                self.id, self.topic_name
            ),
        }
    }
}
