//! pubsub-bridge: relays MQTT messages into Google Cloud Pub/Sub.
//!
//! The bridge subscribes to one topic filter on an MQTT broker and forwards
//! every delivery, payload untouched, to one Pub/Sub topic. It keeps no local
//! state: a message is either handed to Pub/Sub or logged as lost.
//!
//! ## Modules
//!
//! * `config`: defaults, optional TOML file and environment overrides,
//!   validated with `validator`.
//!
//! * `core`: the runtime.
//!   - `ConnectionSupervisor`: connect, subscribe, relay, reconnect after a
//!     fixed delay, stop on cancellation
//!   - `OutboundRelay`: fire-and-forget publishing with outcome logging
//!   - connection state, backoff and OS signal helpers
//!
//! * `logger`: `tracing` subscriber setup with console formats (compact,
//!   pretty, JSON) and optional systemd journald output.
//!
//! The MQTT and Pub/Sub specifics live in the `bridge-mqtt` and
//! `bridge-pubsub` workspace crates.

pub mod config;
pub mod core;
pub mod logger;
