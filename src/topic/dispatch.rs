//! Connect and the per-message dispatch path from the broker into a topic.

use super::TopicInner;
use crate::diagnostics::ProviderTopicEvent;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::session::{MessageHandler, Session};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Subscribe to the broker under the topic's name and wrap the handle.
///
/// The token created here governs every delivery made by the callback and is
/// cancelled when the returned session is disposed.
pub(super) async fn connect<T>(topic: &Arc<TopicInner<T>>) -> Result<Session>
where
    T: Clone + Send + Sync + 'static,
{
    let dispatch = CancellationToken::new();
    let handler = message_handler(Arc::downgrade(topic), dispatch.clone());

    let handle = topic.broker.subscribe(topic.name.as_str(), handler).await?;

    info!("Topic {} subscribed on broker", topic.name);
    topic
        .diagnostics
        .provider_topic_info(topic.name.as_str(), ProviderTopicEvent::Subscribed);

    Ok(Session::new(
        topic.name.clone(),
        handle,
        Arc::clone(&topic.diagnostics),
        dispatch,
    ))
}

fn message_handler<T>(topic: Weak<TopicInner<T>>, dispatch: CancellationToken) -> MessageHandler
where
    T: Clone + Send + Sync + 'static,
{
    Arc::new(move |payload: Option<Bytes>| -> BoxFuture<'static, ()> {
        let topic = topic.clone();
        let dispatch = dispatch.clone();
        Box::pin(async move {
            if let Some(topic) = topic.upgrade() {
                deliver(&topic, payload, &dispatch).await;
            }
        })
    })
}

async fn deliver<T>(topic: &TopicInner<T>, payload: Option<Bytes>, dispatch: &CancellationToken)
where
    T: Clone + Send + Sync + 'static,
{
    if dispatch.is_cancelled() {
        trace!("Session for topic {} already released, ignoring message", topic.name);
        return;
    }

    let payload = match payload {
        Some(payload) if !payload.is_empty() => payload,
        _ => {
            trace!("Ignoring empty payload on topic {}", topic.name);
            return;
        }
    };

    topic.diagnostics.received(topic.name.as_str(), &payload);

    match topic.serializer.decode(&payload) {
        Ok(Envelope::Completed) => {
            topic.try_complete();
        }
        Ok(Envelope::Data(body)) => {
            // Losing a race against completion is expected here.
            if !topic.publish(body, dispatch).await {
                debug!("Message on topic {} was not fully delivered", topic.name);
            }
        }
        Err(error) => {
            warn!("Dropping undecodable message on topic {}: {}", topic.name, error);
            topic
                .diagnostics
                .message_processing_error(topic.name.as_str(), &error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::MessageSerializer;
    use crate::topic::Topic;
    use crate::{BrokerConfig, InMemoryBroker, JsonSerializer, NoopDiagnostics, TopicConfig, TopicName};

    fn payload(body: &str) -> Bytes {
        JsonSerializer.encode(&Envelope::Data(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_released_session_callback_delivers_nothing() {
        let broker = InMemoryBroker::new(BrokerConfig::default()).unwrap();
        let topic: Topic<String> = Topic::new(
            TopicName::new("quotes").unwrap(),
            &TopicConfig::default(),
            Arc::new(broker),
            Arc::new(JsonSerializer),
            Arc::new(NoopDiagnostics),
        )
        .unwrap();
        let mut sub = topic.subscribe().await.unwrap();

        let released = CancellationToken::new();
        released.cancel();
        let stale = message_handler(Arc::downgrade(&topic.inner), released);
        stale(Some(payload("stale"))).await;
        assert_eq!(sub.pending(), 0);

        let live = message_handler(Arc::downgrade(&topic.inner), CancellationToken::new());
        live(Some(payload("fresh"))).await;
        assert_eq!(sub.try_recv().unwrap(), "fresh");
    }
}
