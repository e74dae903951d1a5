//! Configuration for the Pub/Sub sink.
//!
//! ```toml
//! [pubsub]
//! topic = "projects/plant-telemetry/topics/floor-data"
//! request_timeout = 30
//! ```
//!
//! Authentication is derived from what is set:
//! - `emulator_host`: plain HTTP to the emulator, no token
//! - `access_token`: static bearer token
//! - neither: token from the GCE metadata server

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Public Pub/Sub endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// GCE metadata server, reachable from Compute Engine, GKE and Cloud Run.
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://metadata.google.internal";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Destination topic, `projects/{project}/topics/{topic}`.
    #[validate(custom(function = "validate_topic_path"))]
    pub topic: String,

    /// Service endpoint. Ignored when `emulator_host` is set.
    #[validate(url(message = "Endpoint must be a valid URL"))]
    pub endpoint: String,

    /// `host:port` of a Pub/Sub emulator.
    pub emulator_host: Option<String>,

    /// Static OAuth2 bearer token.
    pub access_token: Option<String>,

    /// Metadata server used to mint tokens when no static token is set.
    #[validate(url(message = "Metadata endpoint must be a valid URL"))]
    pub metadata_endpoint: String,

    /// Per-request timeout in seconds.
    #[validate(range(
        min = 1,
        max = 600,
        message = "Request timeout must be between 1 and 600 seconds"
    ))]
    pub request_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topic: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            emulator_host: None,
            access_token: None,
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
            request_timeout: 30,
        }
    }
}

impl Config {
    /// Base URL requests are sent to.
    pub fn effective_endpoint(&self) -> String {
        match self.emulator_host.as_deref().filter(|h| !h.is_empty()) {
            Some(host) => format!("http://{}", host.trim_end_matches('/')),
            None => self.endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

/// Validates a fully qualified topic name.
fn validate_topic_path(topic: &str) -> Result<(), ValidationError> {
    if topic.is_empty() {
        return Err(ValidationError::new("missing_topic")
            .with_message("Destination topic is required (PUBSUB_TOPIC)".into()));
    }

    let parts: Vec<&str> = topic.split('/').collect();
    match parts.as_slice() {
        ["projects", project, "topics", name] if !project.is_empty() && !name.is_empty() => Ok(()),
        _ => Err(ValidationError::new("invalid_topic").with_message(
            format!("Topic must look like projects/{{project}}/topics/{{topic}}: {topic}").into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_requires_topic() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Destination topic is required"));
    }

    #[test]
    fn test_topic_path_validation() {
        assert!(validate_topic_path("projects/plant/topics/floor").is_ok());
        assert!(validate_topic_path("floor").is_err());
        assert!(validate_topic_path("projects//topics/floor").is_err());
        assert!(validate_topic_path("projects/plant/subscriptions/floor").is_err());
    }

    #[test]
    fn test_effective_endpoint() {
        let mut config = Config {
            topic: "projects/plant/topics/floor".into(),
            endpoint: "https://pubsub.example.com/".into(),
            ..Default::default()
        };
        assert_eq!(config.effective_endpoint(), "https://pubsub.example.com");

        config.emulator_host = Some("localhost:8085".into());
        assert_eq!(config.effective_endpoint(), "http://localhost:8085");
        assert!(config.validate().is_ok());
    }
}
