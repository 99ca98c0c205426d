//! Wire encodings for [`Envelope`]s.
//!
//! Both bundled serializers write the same `{ kind, body }` record, one as JSON
//! text and one with `bincode`.

use crate::envelope::{Envelope, WireEnvelope};
use crate::error::{Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes envelopes to and decodes them from the broker's wire representation.
pub trait MessageSerializer<T>: Send + Sync {
    /// Encode an envelope into a wire payload
    fn encode(&self, envelope: &Envelope<T>) -> Result<Bytes>;

    /// Decode a wire payload, failing with `Error::Serialization` on malformed input
    fn decode(&self, payload: &[u8]) -> Result<Envelope<T>>;
}

fn require_body<T>(wire: WireEnvelope<T>) -> Result<Envelope<T>> {
    wire.into_envelope()
        .ok_or_else(|| Error::Serialization("Data envelope without body".into()))
}

/// JSON encoding via `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl<T> MessageSerializer<T> for JsonSerializer
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, envelope: &Envelope<T>) -> Result<Bytes> {
        let wire: WireEnvelope<&T> = envelope.into();
        Ok(Bytes::from(serde_json::to_vec(&wire)?))
    }

    fn decode(&self, payload: &[u8]) -> Result<Envelope<T>> {
        require_body(serde_json::from_slice::<WireEnvelope<T>>(payload)?)
    }
}

/// Compact binary encoding via `bincode`
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl<T> MessageSerializer<T> for BincodeSerializer
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, envelope: &Envelope<T>) -> Result<Bytes> {
        let wire: WireEnvelope<&T> = envelope.into();
        Ok(Bytes::from(bincode::serialize(&wire)?))
    }

    fn decode(&self, payload: &[u8]) -> Result<Envelope<T>> {
        require_body(bincode::deserialize::<WireEnvelope<T>>(payload)?)
    }
}
