//! Broker connections and the sessions they produce.
//!
//! Two traits describe the inbound surface the bridge depends on:
//! - [`Connector`]: performs one connection attempt and hands back a session
//! - [`Session`]: an established connection; subscribe, receive, disconnect
//!
//! [`MqttConnector`] and [`MqttSession`] implement them on top of rumqttc.
//! Every call to `connect` builds a fresh client and event loop, so a session
//! never outlives its connection and never reconnects on its own: when the
//! event loop reports an error the session emits a single
//! `InboundEvent::Disconnected` and is finished. Reconnecting is the caller's
//! decision.
//!
//! # Architecture
//!
//! ```text
//! ConnectionSupervisor
//!     ↓ connect()
//! MqttConnector ── ClientBuilder ──► AsyncClient + EventLoop
//!     ↓
//! MqttSession (subscribe, next_event, disconnect)
//!     ↓
//! Network (TCP/TLS)
//! ```

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, QoS, SubscribeReasonCode,
};
use tokio::time::{timeout, Instant};
use tracing::{debug, trace, warn};

use super::{
    client::ClientBuilder,
    config::Config,
    error::InboundError,
    message::{InboundEvent, Message},
};

/// Produces broker sessions, one per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes transport and protocol handshake.
    async fn connect(&self) -> Result<Box<dyn Session>, InboundError>;

    /// Human readable broker address for log output.
    fn endpoint(&self) -> String;
}

/// One established broker connection.
#[async_trait]
pub trait Session: Send {
    /// Subscribes to `filter` and waits for the broker's acknowledgement.
    async fn subscribe(&mut self, filter: &str) -> Result<(), InboundError>;

    /// Next event of the session.
    ///
    /// Yields one `InboundEvent::Message` per broker delivery and exactly
    /// one `InboundEvent::Disconnected` when the connection ends. After
    /// that, `None` forever.
    async fn next_event(&mut self) -> Option<InboundEvent>;

    /// Best-effort DISCONNECT. Ends the session.
    async fn disconnect(&mut self);
}

/// rumqttc based [`Connector`].
#[derive(Debug, Clone)]
pub struct MqttConnector {
    config: Config,
}

impl MqttConnector {
    /// Validates the configuration up front so that connect attempts only
    /// fail for runtime reasons.
    pub fn new(config: Config) -> Result<Self, InboundError> {
        ClientBuilder::from_config(&config)?;
        Ok(Self { config })
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, InboundError> {
        let (client, event_loop) = ClientBuilder::from_config(&self.config)?.build()?;
        let session =
            MqttSession::establish(client, event_loop, self.config.connection_timeout()).await?;
        Ok(Box::new(session))
    }

    fn endpoint(&self) -> String {
        self.config.address()
    }
}

/// A live rumqttc connection.
pub struct MqttSession {
    /// Client used to send SUBSCRIBE and DISCONNECT
    client: AsyncClient,

    /// Event loop driving the connection
    event_loop: EventLoop,

    /// Bound for protocol acknowledgements
    ack_timeout: Duration,

    /// Deliveries that arrived while waiting for an acknowledgement
    pending: VecDeque<Message>,

    /// Set once the disconnect event has been emitted
    closed: bool,
}

impl MqttSession {
    /// Polls the event loop until the broker accepts the CONNECT.
    async fn establish(
        client: AsyncClient,
        mut event_loop: EventLoop,
        ack_timeout: Duration,
    ) -> Result<Self, InboundError> {
        timeout(ack_timeout, await_connack(&mut event_loop))
            .await
            .map_err(|_| InboundError::Timeout("CONNACK"))??;

        debug!("MQTT handshake completed");

        Ok(Self {
            client,
            event_loop,
            ack_timeout,
            pending: VecDeque::new(),
            closed: false,
        })
    }

    /// Marks the session finished and builds the terminal event.
    fn close(&mut self, reason: Option<String>) -> Option<InboundEvent> {
        self.closed = true;
        Some(InboundEvent::Disconnected(reason))
    }
}

#[async_trait]
impl Session for MqttSession {
    async fn subscribe(&mut self, filter: &str) -> Result<(), InboundError> {
        self.client.subscribe(filter, QoS::AtLeastOnce).await?;

        let deadline = Instant::now() + self.ack_timeout;
        loop {
            let event = tokio::time::timeout_at(deadline, self.event_loop.poll())
                .await
                .map_err(|_| InboundError::Timeout("SUBACK"))??;

            match event {
                Event::Incoming(Packet::SubAck(sub_ack)) => {
                    if sub_ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(InboundError::SubscribeRejected(filter.to_string()));
                    }
                    debug!("SUBACK received for '{}': {:?}", filter, sub_ack.return_codes);
                    return Ok(());
                }
                Event::Incoming(Packet::Publish(publish)) => {
                    self.pending.push_back(Message::from(publish));
                }
                Event::Incoming(Packet::Disconnect) => {
                    return Err(InboundError::SessionClosed(
                        "broker disconnected before SUBACK".into(),
                    ));
                }
                event => trace!("Subscribe event: {:?}", event),
            }
        }
    }

    async fn next_event(&mut self) -> Option<InboundEvent> {
        if let Some(message) = self.pending.pop_front() {
            return Some(InboundEvent::Message(message));
        }
        if self.closed {
            return None;
        }

        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Some(InboundEvent::Message(Message::from(publish)));
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return self.close(Some("Disconnected by broker".into()));
                }
                Ok(event) => trace!("Session event: {:?}", event),
                Err(e) => {
                    let err = InboundError::from(e);
                    return self.close(Some(err.root_cause()));
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.client.disconnect().await {
            warn!("Error sending disconnect packet: {:?}", e);
            return;
        }

        // The DISCONNECT is only written when the event loop is polled.
        let ack_timeout = self.ack_timeout;
        if timeout(ack_timeout, flush_disconnect(&mut self.event_loop))
            .await
            .is_err()
        {
            warn!("Timed out flushing disconnect packet");
        }
    }
}

/// Polls until the broker answers the CONNECT.
async fn await_connack(event_loop: &mut EventLoop) -> Result<(), InboundError> {
    loop {
        match event_loop.poll().await? {
            Event::Incoming(Packet::ConnAck(conn_ack)) => {
                return match conn_ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(rumqttc::ConnectionError::ConnectionRefused(code).into()),
                };
            }
            event => trace!("Handshake event: {:?}", event),
        }
    }
}

/// Polls until the DISCONNECT has been written or the connection is gone.
async fn flush_disconnect(event_loop: &mut EventLoop) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
            Ok(event) => trace!("Disconnect event: {:?}", event),
        }
    }
}
