//! Connection lifecycle of the bridge.
//!
//! `ConnectionSupervisor` drives the inbound side through repeated
//! connect / operate / fail cycles and is the only component that knows about
//! process lifetime. It never gives up on the broker: every failed attempt
//! and every lost session is followed by the fixed backoff interval and a new
//! attempt, until the cancellation token fires.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────── backoff ◄───────────┐
//!            ▼                                  │
//! Disconnected ─► Connecting ─► Connected ─► Disconnected
//!                     │                         ▲
//!                     └────────► Failed ────────┘
//!
//! any state ── cancel ──► Shutdown (bounded DISCONNECT, bounded drain)
//! ```
//!
//! While connected the supervisor `select!`s over the cancellation token and
//! the session's next event. Each message is logged and handed to the
//! [`OutboundRelay`], which returns immediately.

use std::{sync::Arc, time::Duration};

use bridge_mqtt::{Connector, InboundError, InboundEvent, Session, Severity};
use tokio::{sync::watch, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{backoff::Backoff, relay::OutboundRelay, state::ConnectionState};

/// Default bound for the graceful part of shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

enum Attempt {
    Connected(Box<dyn Session>),
    Failed(String),
    Cancelled,
}

enum SessionEnd {
    Disconnected(Option<String>),
    Cancelled,
}

pub struct ConnectionSupervisor {
    /// Opens broker sessions
    connector: Arc<dyn Connector>,

    /// Forwards received messages
    relay: OutboundRelay,

    /// Filter subscribed on every session
    topic_filter: String,

    /// Wait between attempts
    backoff: Backoff,

    /// Bound for DISCONNECT and for draining in-flight publishes
    shutdown_timeout: Duration,

    /// External shutdown request
    cancel: CancellationToken,

    /// Broadcast channel for connection state updates
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionSupervisor {
    /// Creates a supervisor with the default backoff and shutdown timeout.
    ///
    /// Nothing connects until [`run`](Self::run) is awaited.
    ///
    /// # Arguments
    /// - `connector`: Opens one broker session per attempt
    /// - `relay`: Receives every inbound message
    /// - `topic_filter`: Filter subscribed on every new session
    /// - `cancel`: Fires to stop the supervisor from any state
    pub fn new(
        connector: Arc<dyn Connector>,
        relay: OutboundRelay,
        topic_filter: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        Self {
            connector,
            relay,
            topic_filter: topic_filter.into(),
            backoff: Backoff::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            cancel,
            state_tx,
        }
    }

    /// Replaces the wait between connection attempts.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Bounds the DISCONNECT and, separately, the wait for in-flight
    /// publishes during shutdown.
    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Watch receiver for connection state changes.
    ///
    /// The receiver sees the current state immediately. The final value is
    /// always `ConnectionState::Shutdown`.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Runs until the cancellation token fires.
    ///
    /// Connection failures never end the loop and nothing is returned to the
    /// caller: every error is logged and followed by a reconnect.
    pub async fn run(mut self) {
        info!(
            "Bridging '{}' from {} to {}",
            self.topic_filter,
            self.connector.endpoint(),
            self.relay.destination()
        );

        loop {
            match self.establish().await {
                Attempt::Cancelled => break,
                Attempt::Failed(reason) => self.update_state(ConnectionState::Failed(reason)),
                Attempt::Connected(session) => match self.operate(session).await {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Disconnected(reason) => {
                        self.update_state(ConnectionState::Disconnected(reason))
                    }
                },
            }

            if !self.wait_backoff().await {
                break;
            }
        }

        self.shutdown().await;
    }

    /// Connects and subscribes. `Connected` is only reported once the broker
    /// acknowledged the subscription.
    async fn establish(&mut self) -> Attempt {
        self.update_state(ConnectionState::Connecting);
        let endpoint = self.connector.endpoint();
        info!("Connecting to MQTT broker at {}...", endpoint);

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.connector.connect() => Some(result),
        };

        let mut session = match connected {
            None => return Attempt::Cancelled,
            Some(Ok(session)) => session,
            Some(Err(e)) => {
                self.report_failure(&format!("connect to {endpoint}"), &e);
                return Attempt::Failed(e.root_cause());
            }
        };

        let subscribed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = session.subscribe(&self.topic_filter) => Some(result),
        };

        match subscribed {
            None => {
                self.close_session(session.as_mut()).await;
                return Attempt::Cancelled;
            }
            Some(Err(e)) => {
                self.report_failure(&format!("subscribe to '{}'", self.topic_filter), &e);
                self.close_session(session.as_mut()).await;
                return Attempt::Failed(e.root_cause());
            }
            Some(Ok(())) => {}
        }

        info!(
            "Connected to {} and subscribed to '{}'",
            endpoint, self.topic_filter
        );
        self.backoff.reset();
        self.update_state(ConnectionState::Connected);
        Attempt::Connected(session)
    }

    /// Relays messages until the session ends or shutdown is requested.
    async fn operate(&mut self, mut session: Box<dyn Session>) -> SessionEnd {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                event = session.next_event() => Some(event),
            };

            match event {
                None => {
                    info!("Shutdown requested, disconnecting from broker");
                    self.close_session(session.as_mut()).await;
                    return SessionEnd::Cancelled;
                }
                Some(Some(InboundEvent::Message(message))) => {
                    info!(
                        "Received message on '{}': {}",
                        message.topic,
                        message.payload_lossy()
                    );
                    // Outcome is observed by the relay itself.
                    let _ = self.relay.submit(message);
                }
                Some(Some(InboundEvent::Disconnected(reason))) => {
                    warn!(
                        "Disconnected from MQTT broker: {}",
                        reason.as_deref().unwrap_or("connection closed")
                    );
                    return SessionEnd::Disconnected(reason);
                }
                Some(None) => {
                    warn!("MQTT session ended without a disconnect event");
                    return SessionEnd::Disconnected(None);
                }
            }
        }
    }

    /// Sleeps for the backoff interval. Returns `false` if shutdown was
    /// requested meanwhile.
    async fn wait_backoff(&mut self) -> bool {
        let delay = self.backoff.next_sleep();
        info!(
            "Reconnecting in {}s (attempt {})",
            delay.as_secs_f64(),
            self.backoff.attempt()
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Best-effort DISCONNECT, bounded by the shutdown timeout.
    async fn close_session(&self, session: &mut dyn Session) {
        if timeout(self.shutdown_timeout, session.disconnect())
            .await
            .is_err()
        {
            warn!(
                "Broker did not take the disconnect within {:?}, dropping the connection",
                self.shutdown_timeout
            );
        }
    }

    async fn shutdown(&mut self) {
        self.update_state(ConnectionState::Shutdown);

        let in_flight = self.relay.in_flight();
        if in_flight > 0 {
            info!("Waiting for {} in-flight publishes...", in_flight);
        }
        if !self.relay.drain(self.shutdown_timeout).await {
            warn!(
                "{} publishes still in flight after {:?}, abandoning them",
                self.relay.in_flight(),
                self.shutdown_timeout
            );
        }

        info!("Relay statistics: {}", self.relay.stats());
        info!("Bridge stopped");
    }

    fn report_failure(&self, action: &str, err: &InboundError) {
        match err.severity() {
            Severity::Transient => error!("Failed to {}: {}", action, err.root_cause()),
            Severity::Permanent => error!(
                "Failed to {}: {} (will not clear without a configuration change)",
                action,
                err.root_cause()
            ),
        }
        debug!("Failure details: {:?}", err);
    }

    /// Publishes `state` if it differs from the current one. Nothing
    /// follows `Shutdown`.
    fn update_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if current.is_terminal() || *current == state {
                return false;
            }
            *current = state.clone();
            true
        });

        if changed {
            debug!("Connection state changed to: {}", state);
        }
    }
}
