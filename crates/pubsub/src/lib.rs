//! # bridge-pubsub: outbound side of pubsub-bridge
//!
//! A [`Sink`] accepts a payload and a destination and reports the service
//! assigned message id or a [`SinkError`]. [`PubSubSink`] implements it
//! against the Google Cloud Pub/Sub REST API.
//!
//! Credentials come from a static token, the GCE metadata server or, when
//! talking to the emulator, nowhere at all.
//!
//! ```ignore
//! use bridge_pubsub::{Config, PubSubSink, Sink};
//!
//! let sink = PubSubSink::from_config(&config)?;
//! let id = sink.publish(&config.topic, payload).await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod sink;

#[cfg(test)]
mod test_support;

pub use auth::TokenSource;
pub use client::PubSubSink;
pub use config::Config;
pub use error::SinkError;
pub use sink::Sink;
