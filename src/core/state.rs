//! Connection state of the bridge.
//!
//! Owned by the [`ConnectionSupervisor`](super::supervisor::ConnectionSupervisor)
//! and published read-only through a watch channel, so other tasks can react
//! to connectivity without touching the connection itself.
//!
//! ```ignore
//! let state = ConnectionState::Failed("Connection refused".into());
//! println!("Status: {}", state);  // "Failed (Connection refused)"
//! ```

use std::fmt;

/// The connection lifecycle:
/// - `Disconnected` -> `Connecting` -> `Connected` (handshake and SUBACK)
/// - `Connecting` -> `Failed` -> `Connecting` after the backoff interval
/// - `Connected` -> `Disconnected` -> `Connecting` after the backoff interval
/// - any state -> `Shutdown` once cancellation is requested
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// No session. Holds the reason the previous one ended, if there was one.
    Disconnected(Option<String>),

    /// Handshake or subscription in progress.
    Connecting,

    /// Handshake completed and the topic filter acknowledged on this session.
    Connected,

    /// The last connect or subscribe attempt failed.
    Failed(String),

    /// Terminal. The supervisor has stopped.
    Shutdown,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected(None)
    }
}

impl ConnectionState {
    /// State name without its reason, for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected(_) => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Failed(_) => "Failed",
            ConnectionState::Shutdown => "Shutdown",
        }
    }

    /// Reason attached to the state, empty when there is none.
    pub fn details(&self) -> String {
        match self {
            ConnectionState::Disconnected(Some(reason)) | ConnectionState::Failed(reason) => {
                reason.clone()
            }
            _ => String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// `Shutdown` is the last state a supervisor publishes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Shutdown)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())?;
        let details = self.details();
        if !details.is_empty() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_as_str() {
        assert_eq!(ConnectionState::default().as_str(), "Disconnected");
        assert_eq!(ConnectionState::Connecting.as_str(), "Connecting");
        assert_eq!(ConnectionState::Connected.as_str(), "Connected");
        assert_eq!(ConnectionState::Failed("x".into()).as_str(), "Failed");
        assert_eq!(ConnectionState::Shutdown.as_str(), "Shutdown");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(ConnectionState::Disconnected(None).to_string(), "Disconnected");
        assert_eq!(
            ConnectionState::Disconnected(Some("broker closed".into())).to_string(),
            "Disconnected (broker closed)"
        );
        assert_eq!(
            ConnectionState::Failed("Connection refused".into()).to_string(),
            "Failed (Connection refused)"
        );
    }

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Failed("error".into()).is_connected());
        assert!(ConnectionState::Shutdown.is_terminal());
        assert!(!ConnectionState::Disconnected(None).is_terminal());
    }
}
