//! # bridge-mqtt: inbound side of pubsub-bridge
//!
//! Wraps a single MQTT broker connection and its active session on top of
//! `rumqttc`:
//!
//! - **Connect** with optional credentials and TLS, bounded by a timeout
//! - **Subscribe** to one topic filter and wait for the SUBACK
//! - **Receive** broker deliveries as a stream of [`InboundEvent`]s
//! - **Detect disconnection** and report it exactly once per session
//!
//! The crate deliberately does not reconnect. A session that loses its
//! connection is finished; the caller decides when to ask the
//! [`Connector`] for a new one.
//!
//! # Quick Start
//!
//! ```ignore
//! use bridge_mqtt::{Config, Connector, InboundEvent, MqttConnector};
//!
//! let connector = MqttConnector::new(Config {
//!     host: "broker.plant.local".into(),
//!     ..Default::default()
//! })?;
//! let mut session = connector.connect().await?;
//! session.subscribe("plant-floor/data/#").await?;
//!
//! while let Some(event) = session.next_event().await {
//!     match event {
//!         InboundEvent::Message(message) => println!("{}", message),
//!         InboundEvent::Disconnected(reason) => println!("gone: {:?}", reason),
//!     }
//! }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! host = "broker.plant.local"
//! port = 8883
//! topic = "plant-floor/data/#"
//! keep_alive = 60
//!
//! [tls]
//! ca_cert_path = "/etc/mqtt/ca.pem"
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;

#[cfg(test)]
mod test_support;

pub use client::ClientBuilder;
pub use config::{Config, TlsConfig};
pub use connection::{Connector, MqttConnector, MqttSession, Session};
pub use error::{InboundError, Severity};
pub use message::{InboundEvent, Message};
pub use rumqttc::QoS;
