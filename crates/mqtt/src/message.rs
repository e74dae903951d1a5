//! Messages and events produced by an inbound session.

use std::fmt;

use bytes::Bytes;
use rumqttc::{Publish, QoS};

/// A message delivered by the broker.
///
/// Immutable once received. The payload is kept as `Bytes` so handing it to
/// the outbound side is a reference-count bump, not a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Concrete topic the message was published on.
    pub topic: String,

    /// Raw payload, exactly as received.
    pub payload: Bytes,

    /// QoS level of the delivery.
    pub qos: QoS,

    /// Whether the broker flagged the message as retained.
    pub retain: bool,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
        }
    }

    /// Payload rendered for log output. Invalid UTF-8 is replaced, the
    /// payload itself is never modified.
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

impl From<Publish> for Message {
    fn from(publish: Publish) -> Self {
        Self {
            topic: publish.topic,
            payload: publish.payload,
            qos: publish.qos,
            retain: publish.retain,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (qos {}, {} bytes)",
            self.topic,
            self.qos as u8,
            self.payload.len()
        )
    }
}

/// An event yielded by [`Session::next_event`](crate::Session::next_event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// One broker delivery.
    Message(Message),

    /// The session ended. Carries the reason when one is known.
    Disconnected(Option<String>),
}
