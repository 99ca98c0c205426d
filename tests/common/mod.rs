#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use topic_bridge::{
    BrokerConfig, BrokerSession, DiagnosticEvents, Envelope, Error, InMemoryBroker,
    JsonSerializer, MessageHandler, MessageSerializer, ProviderTopicEvent, Result,
    SubscriptionHandle, Topic, TopicBufferFullMode, TopicConfig, TopicName,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Provider(String, ProviderTopicEvent),
    Received(String, Vec<u8>),
    ProcessingError(String),
    Dropped(String, TopicBufferFullMode),
    Subscribe(String),
    Unsubscribe(String),
    Send(String),
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn provider_events(&self) -> Vec<ProviderTopicEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Provider(_, event) => Some(*event),
                _ => None,
            })
            .collect()
    }
}

impl DiagnosticEvents for Recorder {
    fn provider_topic_info(&self, topic: &str, event: ProviderTopicEvent) {
        self.events.lock().push(Event::Provider(topic.into(), event));
    }

    fn received(&self, topic: &str, payload: &[u8]) {
        self.events
            .lock()
            .push(Event::Received(topic.into(), payload.to_vec()));
    }

    fn message_processing_error(&self, topic: &str, _error: &Error) {
        self.events.lock().push(Event::ProcessingError(topic.into()));
    }

    fn message_dropped(&self, topic: &str, mode: TopicBufferFullMode) {
        self.events.lock().push(Event::Dropped(topic.into(), mode));
    }

    fn subscribe(&self, topic: &str) {
        self.events.lock().push(Event::Subscribe(topic.into()));
    }

    fn unsubscribe(&self, topic: &str) {
        self.events.lock().push(Event::Unsubscribe(topic.into()));
    }

    fn send(&self, topic: &str, _payload: &[u8]) {
        self.events.lock().push(Event::Send(topic.into()));
    }
}

/// Counts decode calls on top of the JSON serializer
#[derive(Default)]
pub struct CountingSerializer {
    pub decodes: AtomicUsize,
}

impl MessageSerializer<String> for CountingSerializer {
    fn encode(&self, envelope: &Envelope<String>) -> Result<Bytes> {
        JsonSerializer.encode(envelope)
    }

    fn decode(&self, payload: &[u8]) -> Result<Envelope<String>> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        JsonSerializer.decode(payload)
    }
}

/// Delays every subscribe to widen race windows
pub struct SlowBroker {
    pub inner: InMemoryBroker,
    pub delay: Duration,
}

#[async_trait]
impl BrokerSession for SlowBroker {
    async fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> Result<Box<dyn SubscriptionHandle>> {
        tokio::time::sleep(self.delay).await;
        self.inner.subscribe(topic, handler).await
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.inner.publish(topic, payload).await
    }
}

pub fn broker() -> InMemoryBroker {
    InMemoryBroker::new(BrokerConfig::default()).unwrap()
}

pub fn topic_with(
    broker: Arc<dyn BrokerSession>,
    name: &str,
    capacity: usize,
    full_mode: TopicBufferFullMode,
    diagnostics: Arc<Recorder>,
) -> Topic<String> {
    Topic::new(
        TopicName::new(name).unwrap(),
        &TopicConfig {
            buffer_capacity: capacity,
            full_mode,
            topic_prefix: None,
        },
        broker,
        Arc::new(JsonSerializer),
        diagnostics,
    )
    .unwrap()
}

pub fn data(body: &str) -> Bytes {
    JsonSerializer
        .encode(&Envelope::Data(body.to_string()))
        .unwrap()
}

pub fn completed() -> Bytes {
    MessageSerializer::<String>::encode(&JsonSerializer, &Envelope::Completed).unwrap()
}
