use serde::{Deserialize, Serialize};

/// Kind of a message as carried on the wire
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum MessageKind {
    Default,
    Completed,
}

/// A decoded wire message: either a data body or the completion signal.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Envelope<T> {
    Completed,
    Data(T),
}

impl<T> Envelope<T> {
    /// Get the wire kind of this envelope
    pub fn kind(&self) -> MessageKind {
        match self {
            Envelope::Completed => MessageKind::Completed,
            Envelope::Data(_) => MessageKind::Default,
        }
    }
}

/// Wire record shared by the bundled serializers.
#[derive(Serialize, Deserialize)]
pub(crate) struct WireEnvelope<T> {
    pub(crate) kind: MessageKind,
    pub(crate) body: Option<T>,
}

impl<'a, T> From<&'a Envelope<T>> for WireEnvelope<&'a T> {
    fn from(envelope: &'a Envelope<T>) -> Self {
        match envelope {
            Envelope::Completed => WireEnvelope {
                kind: MessageKind::Completed,
                body: None,
            },
            Envelope::Data(body) => WireEnvelope {
                kind: MessageKind::Default,
                body: Some(body),
            },
        }
    }
}

impl<T> WireEnvelope<T> {
    /// A completion record drops any body it happens to carry.
    pub(crate) fn into_envelope(self) -> Option<Envelope<T>> {
        match (self.kind, self.body) {
            (MessageKind::Completed, _) => Some(Envelope::Completed),
            (MessageKind::Default, Some(body)) => Some(Envelope::Data(body)),
            (MessageKind::Default, None) => None,
        }
    }
}
