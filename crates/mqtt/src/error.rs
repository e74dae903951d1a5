//! Error handling for the inbound side of the bridge.
//!
//! `InboundError` is the single error type returned by the connector and
//! session APIs. Every variant is recoverable from the supervisor's point of
//! view: the connection is dropped and a new one is attempted after the
//! backoff interval. The `severity()` helper only decides how loudly the
//! failure is logged.
//!
//! # Error Categories
//!
//! **Setup errors** (invalid configuration, unreadable TLS material):
//! - `ClientSetup`
//! - `ConfigError`
//! - `Io`
//!
//! **Runtime errors** (network or protocol failures during a session):
//! - `ClientTransfer`: the request channel to the event loop is closed
//! - `ClientConnection`: network-level or handshake failure
//! - `SubscribeRejected`: the broker refused the topic filter
//! - `Timeout`: handshake or SUBACK did not arrive in time

use rumqttc::{ConnectReturnCode, ConnectionError};
use thiserror::Error;

/// The unified error type for inbound MQTT operations.
#[derive(Debug, Error)]
pub enum InboundError {
    /// MQTT client initialization failed.
    ///
    /// Usually a TLS certificate path that does not exist or an incomplete
    /// client-auth pair.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// The client could not hand a request to the event loop.
    #[error("Client transfer error: {0}")]
    ClientTransfer(#[from] rumqttc::ClientError),

    /// Connection to the broker failed or was lost.
    ///
    /// Boxed to keep the enum small.
    #[error("Client connection error: {0}")]
    ClientConnection(#[from] Box<ConnectionError>),

    /// The broker answered the SUBSCRIBE with a failure return code.
    #[error("Subscription to '{0}' rejected by broker")]
    SubscribeRejected(String),

    /// The broker did not answer within the configured bound.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The event loop stopped before the session was established.
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// I/O failure outside of the network path (certificate loading).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConnectionError> for InboundError {
    fn from(err: ConnectionError) -> Self {
        InboundError::ClientConnection(Box::new(err))
    }
}

/// How an inbound failure should be reported.
///
/// Both severities lead to a reconnect; a `Permanent` failure is one that is
/// unlikely to resolve itself without operator action (bad credentials,
/// broken certificates) and is logged with that hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Transient,
    Permanent,
}

impl InboundError {
    /// Classifies the error for log reporting.
    pub fn severity(&self) -> Severity {
        match self {
            InboundError::ClientSetup(_)
            | InboundError::ConfigError(_)
            | InboundError::Io(_)
            | InboundError::SubscribeRejected(_) => Severity::Permanent,
            InboundError::ClientConnection(err) => classify_connection_error(err),
            InboundError::ClientTransfer(_)
            | InboundError::Timeout(_)
            | InboundError::SessionClosed(_) => Severity::Transient,
        }
    }

    /// Root cause of the error chain, without surrounding quotes.
    pub fn root_cause(&self) -> String {
        let mut current: &dyn std::error::Error = self;
        while let Some(source) = current.source() {
            current = source;
        }
        current.to_string().trim_matches('"').to_string()
    }
}

fn classify_connection_error(err: &ConnectionError) -> Severity {
    use Severity::*;

    match err {
        // Certificates or crypto setup are broken
        ConnectionError::Tls(_) => Permanent,

        ConnectionError::MqttState(_) | ConnectionError::NotConnAck(_) => Transient,

        ConnectionError::Io(e) => match e.kind() {
            std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::InvalidInput
            | std::io::ErrorKind::InvalidData => Permanent,
            _ => Transient,
        },

        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => Transient,

        ConnectionError::ConnectionRefused(code) => match code {
            ConnectReturnCode::RefusedProtocolVersion
            | ConnectReturnCode::BadClientId
            | ConnectReturnCode::BadUserNamePassword
            | ConnectReturnCode::NotAuthorized => Permanent,
            _ => Transient,
        },

        #[allow(unreachable_patterns)]
        _ => Transient,
    }
}
