//! Configuration for the inbound MQTT connection.
//!
//! All structures support serde deserialization (the bridge loads them from
//! the `[mqtt]` table of its TOML file) and are validated with the
//! `validator` crate, so an invalid value fails at startup rather than at
//! connect time.
//!
//! # Examples
//!
//! ```toml
//! [mqtt]
//! host = "broker.plant.local"
//! port = 1883
//! topic = "plant-floor/data/#"
//! username = "bridge"
//! password = "secret"
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Topic filter used when none is configured.
pub const DEFAULT_TOPIC: &str = "plant-floor/data/#";

/// Client identifier used when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "mqtt-bridge";

/// Main MQTT connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Broker hostname or IP address.
    ///
    /// DNS resolution happens at connect time; a name that does not resolve
    /// is a transient failure like any other.
    #[validate(custom(function = "validate_host"))]
    pub host: String,

    /// Broker port. 1883 for plain TCP, 8883 for TLS.
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Topic filter to subscribe to. Wildcards `+` and `#` are allowed.
    #[validate(custom(function = "validate_topic_filter"))]
    pub topic: String,

    /// Optional username. Only sent together with `password`.
    pub username: Option<String>,

    /// Optional password. Only sent together with `username`.
    pub password: Option<String>,

    /// Client identifier presented to the broker.
    ///
    /// An empty string is replaced by a random UUID at connect time.
    #[validate(length(max = 36, message = "Client ID must not exceed 36 characters"))]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    /// Upper bound in seconds for the TCP connect plus CONNACK, and for the
    /// SUBACK after subscribing.
    #[validate(range(
        min = 1,
        max = 300,
        message = "Connection timeout must be between 1 and 300 seconds"
    ))]
    pub connection_timeout: u64,

    /// Maximum MQTT packet size in bytes, applied to both directions.
    #[validate(range(
        min = 64,
        max = 268435455,
        message = "Max packet size must be between 64 bytes and 256 MiB"
    ))]
    pub max_packet_size: Option<u32>,

    /// Capacity of the client request channel.
    #[validate(range(
        min = 1,
        max = 255,
        message = "Request channel capacity must be between 1 and 255"
    ))]
    pub request_channel_capacity: Option<u8>,

    /// Optional TLS configuration. TLS is used when a CA certificate is set.
    #[validate(nested)]
    pub tls: Option<TlsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: String::new(),
            port: 1883,
            topic: DEFAULT_TOPIC.to_string(),
            username: None,
            password: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            keep_alive: 60,
            connection_timeout: 30,
            max_packet_size: None,
            request_channel_capacity: Some(10),
            tls: None,
        }
    }
}

impl Config {
    /// Returns `(username, password)` when both are configured and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// `host:port` for log output.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The broker has no default; an empty host means none was configured.
fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.is_empty() {
        return Err(ValidationError::new("missing_host")
            .with_message("Broker host is required (MQTT_BROKER)".into()));
    }
    if host.len() > 255 {
        return Err(ValidationError::new("host_too_long")
            .with_message("Host must not exceed 255 characters".into()));
    }
    Ok(())
}

/// Validates an MQTT subscription filter.
///
/// `#` may only appear as the last level and must occupy the whole level;
/// `+` must occupy a whole level.
fn validate_topic_filter(filter: &str) -> Result<(), ValidationError> {
    if filter.is_empty() {
        return Err(ValidationError::new("empty_topic_filter")
            .with_message("Topic filter must not be empty".into()));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != levels.len() - 1) {
            return Err(ValidationError::new("invalid_multi_level_wildcard").with_message(
                format!("'#' must be the whole last level of the filter: {filter}").into(),
            ));
        }
        if level.contains('+') && *level != "+" {
            return Err(ValidationError::new("invalid_single_level_wildcard").with_message(
                format!("'+' must occupy a whole level of the filter: {filter}").into(),
            ));
        }
    }

    Ok(())
}

/// TLS configuration for secure broker connections.
///
/// Files are validated when deserialized and again when the client is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the CA certificate (PEM) used to verify the broker.
    #[validate(custom(
        function = "validate_file_path",
        message = "CA certificate file does not exist"
    ))]
    pub ca_cert_path: Option<String>,

    /// Path to the client certificate (PEM) for mutual TLS.
    #[validate(custom(
        function = "validate_file_path",
        message = "Client certificate file does not exist"
    ))]
    pub client_cert_path: Option<String>,

    /// Path to the unencrypted client private key (PEM) for mutual TLS.
    #[validate(custom(
        function = "validate_file_path",
        message = "Client key file does not exist"
    ))]
    pub client_key_path: Option<String>,
}

impl TlsConfig {
    /// Full mutual authentication.
    pub fn new(
        ca_cert_path: impl Into<String>,
        client_cert_path: impl Into<String>,
        client_key_path: impl Into<String>,
    ) -> Self {
        TlsConfig {
            ca_cert_path: Some(ca_cert_path.into()),
            client_cert_path: Some(client_cert_path.into()),
            client_key_path: Some(client_key_path.into()),
        }
    }

    /// Server verification only.
    pub fn with_ca_only(ca_cert_path: impl Into<String>) -> Self {
        TlsConfig {
            ca_cert_path: Some(ca_cert_path.into()),
            ..Default::default()
        }
    }

    /// Checks that the CA is set, that every configured file exists, and
    /// that client certificate and key come as a pair.
    pub fn validate_config(&self) -> Result<(), ValidationError> {
        let Some(ca) = self.ca_cert_path.as_deref() else {
            return Err(ValidationError::new("missing_ca_cert")
                .with_message("CA certificate path is required".into()));
        };
        validate_file_path(ca)?;

        match (
            self.client_cert_path.as_deref(),
            self.client_key_path.as_deref(),
        ) {
            (Some(cert), Some(key)) => {
                validate_file_path(cert)?;
                validate_file_path(key)?;
            }
            (None, None) => {}
            _ => {
                return Err(ValidationError::new("incomplete_client_auth").with_message(
                    "Both client certificate and key must be provided or neither".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Validates that a path is non-empty and points to an existing file.
fn validate_file_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(
            ValidationError::new("empty_path").with_message("File path cannot be empty".into())
        );
    }

    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return Err(ValidationError::new("file_not_found")
            .with_message(format!("File does not exist: {path}").into()));
    }

    if !path_obj.is_file() {
        return Err(ValidationError::new("not_a_file")
            .with_message(format!("Path is not a file: {path}").into()));
    }

    Ok(())
}
