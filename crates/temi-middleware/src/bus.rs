//! In-process publish/subscribe bus.
//!
//! Uses a [`tokio::sync::broadcast`] channel under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Subscribers filter by MQTT topic filter, which makes the bus
//! a drop-in [`Transport`] for headless tests and the simulator.
//!
//! Delivery tiers are recorded on each message but not enforced: an
//! in-process channel never loses a message unless a subscriber lags.

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use temi_types::{QoS, TemiError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::topic::{filter_matches, is_valid_filter};
use crate::transport::{InboundMessage, Transport};

/// Default channel capacity (number of buffered messages before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared in-process bus. Clone it cheaply – all clones share the same
/// underlying broadcast channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<InboundMessage>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a message to every subscriber.
    ///
    /// Returns the number of receivers that were handed the message, or a
    /// [`TemiError::Transport`] error when nobody is subscribed.
    pub fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        qos: QoS,
    ) -> Result<usize, TemiError> {
        let message = InboundMessage::new(topic, payload, qos);
        let topic = message.topic.clone();
        self.sender
            .send(message)
            .map_err(|_| TemiError::Transport(format!("no subscribers for topic {topic}")))
    }

    /// Subscribe to every message on the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.sender.subscribe()
    }

    /// Subscribe and return a [`TopicSubscriber`] bound to an MQTT filter.
    pub fn subscribe_filter(&self, filter: impl Into<String>) -> TopicSubscriber {
        TopicSubscriber {
            filter: filter.into(),
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl Transport for EventBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), TemiError> {
        match EventBus::publish(self, topic, payload, qos) {
            Ok(receivers) => {
                debug!(topic, receivers, qos = qos.level(), "published");
                Ok(())
            }
            // A broker accepts publishes with nobody listening; so do we.
            Err(_) => {
                debug!(topic, "published with no subscribers");
                Ok(())
            }
        }
    }

    async fn subscribe(
        &self,
        filter: &str,
        _qos: QoS,
    ) -> Result<BoxStream<'static, InboundMessage>, TemiError> {
        if !is_valid_filter(filter) {
            return Err(TemiError::Transport(format!("invalid topic filter '{filter}'")));
        }
        let subscriber = self.subscribe_filter(filter);
        Ok(stream::unfold(subscriber, |mut sub| async move {
            sub.recv().await.map(|msg| (msg, sub))
        })
        .boxed())
    }
}

/// A subscriber that only delivers messages whose topic matches its filter.
pub struct TopicSubscriber {
    filter: String,
    receiver: broadcast::Receiver<InboundMessage>,
}

impl TopicSubscriber {
    /// Wait for the next message that matches this subscriber's filter.
    ///
    /// Returns `None` when the bus is closed and no further messages will
    /// arrive.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) if filter_matches(&self.filter, &msg.topic) => return Some(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(filter = %self.filter, lagged_by = n, "TopicSubscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
