//! The bus transport boundary.
//!
//! The adapter never speaks to a broker directly.  It publishes and
//! subscribes through a [`Transport`], so the same correlation engine runs
//! against an MQTT broker in production and the in-process
//! [`EventBus`][crate::bus::EventBus] in tests.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use temi_types::{QoS, TemiError};

/// A message delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Full topic, e.g. `temi/00119260058/status/utils/battery`.
    pub topic: String,
    pub payload: Vec<u8>,
    /// Delivery tier the message was published with.
    pub qos: QoS,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
        }
    }

    /// Payload as UTF-8 text, replacing invalid sequences.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Every bus backend must implement this trait.
///
/// # Contract
///
/// * `publish` – hand `payload` to the bus on `topic` with the requested
///   delivery tier.  Publishing with nobody listening is not an error.
///
/// * `subscribe` – return a live stream of every message whose topic matches
///   `filter` (MQTT wildcards `+` and `#`).  The stream ends when the
///   transport shuts down.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), TemiError>;

    async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
    ) -> Result<BoxStream<'static, InboundMessage>, TemiError>;
}
