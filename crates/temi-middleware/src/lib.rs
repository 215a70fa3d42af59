//! `temi-middleware` – bus plumbing between the adapter and the robot.
//!
//! Moves raw topic/payload pairs without caring what they mean.
//!
//! # Modules
//!
//! - [`transport`] – the [`Transport`] trait every bus backend implements
//!   (an MQTT client in production, the in-process bus in tests).
//! - [`bus`] – in-process publish/subscribe bus built on Tokio broadcast
//!   channels, implementing [`Transport`].
//! - [`topic`] – MQTT-style topic filter matching (`+` and `#`).

pub mod bus;
pub mod topic;
pub mod transport;

pub use bus::{EventBus, TopicSubscriber};
pub use topic::filter_matches;
pub use transport::{InboundMessage, Transport};
