//! MQTT client builder with TLS and credential support.
//!
//! `ClientBuilder` turns a [`Config`] into rumqttc's `AsyncClient` and
//! `EventLoop` pair. A fresh pair is built for every connection attempt so
//! that no protocol state leaks from one session into the next.
//!
//! # Examples
//!
//! ```ignore
//! let (client, event_loop) = ClientBuilder::from_config(&config)?.build()?;
//! ```

use std::{fs, time::Duration};

use rumqttc::{AsyncClient, EventLoop, MqttOptions, TlsConfiguration, Transport};
use tracing::warn;
use validator::Validate;

use super::{
    config::{Config, TlsConfig},
    error::InboundError,
};

/// Builder for constructing MQTT clients.
///
/// Sessions are always clean: the broker keeps no subscription state between
/// connections and the filter is re-subscribed on every connect.
pub struct ClientBuilder {
    /// MQTT protocol options (host, port, keep-alive, credentials)
    opts: MqttOptions,

    /// Capacity of the client request channel
    cap: usize,

    /// Optional TLS configuration (paths to certificates)
    tls_config: Option<TlsConfig>,
}

impl ClientBuilder {
    /// Creates a builder with minimal configuration.
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16, cap: usize) -> Self {
        let mut opts = MqttOptions::new(client_id, host, port);
        opts.set_clean_session(true);
        Self {
            opts,
            cap,
            tls_config: None,
        }
    }

    /// Creates a builder from a validated `Config`.
    ///
    /// TLS is enabled when a CA certificate is configured, with client
    /// authentication when both client certificate and key are set.
    ///
    /// # Errors
    /// Returns `InboundError::ConfigError` if the configuration does not
    /// pass validation, and `InboundError::ClientSetup` if only one of
    /// client certificate and key is set.
    pub fn from_config(config: &Config) -> Result<Self, InboundError> {
        config.validate()?;

        let client_id = if config.client_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            config.client_id.clone()
        };

        let cap = config.request_channel_capacity.unwrap_or(10) as usize;
        let mut builder = Self::new(client_id, config.host.clone(), config.port, cap)
            .keep_alive(config.keep_alive);

        if let Some(max_packet_size) = config.max_packet_size {
            builder = builder.max_packet_size(max_packet_size as usize, max_packet_size as usize);
        }

        match config.credentials() {
            Some((username, password)) => builder = builder.credentials(username, password),
            None if config.username.is_some() || config.password.is_some() => {
                warn!("MQTT username and password must both be set; connecting anonymously");
            }
            None => {}
        }

        if let Some(tls) = config.tls.as_ref() {
            builder = match (
                tls.ca_cert_path.as_deref(),
                tls.client_cert_path.as_deref(),
                tls.client_key_path.as_deref(),
            ) {
                (None, _, _) => builder,
                (Some(ca), Some(cert), Some(key)) => builder.with_tls(ca, cert, key),
                (Some(ca), None, None) => builder.with_tls_ca_only(ca),
                (Some(_), _, _) => {
                    return Err(InboundError::ClientSetup(
                        "Both client certificate and key must be provided or neither".into(),
                    ))
                }
            };
        }

        Ok(builder)
    }

    /// Configures TLS with both CA and client certificates.
    pub fn with_tls(
        mut self,
        ca_cert_path: impl Into<String>,
        client_cert_path: impl Into<String>,
        client_key_path: impl Into<String>,
    ) -> Self {
        self.tls_config = Some(TlsConfig::new(
            ca_cert_path,
            client_cert_path,
            client_key_path,
        ));
        self
    }

    /// Configures TLS with only a CA certificate (no client auth).
    pub fn with_tls_ca_only(mut self, ca_cert_path: impl Into<String>) -> Self {
        self.tls_config = Some(TlsConfig::with_ca_only(ca_cert_path));
        self
    }

    /// Sets the keep-alive interval (in seconds).
    pub fn keep_alive(mut self, secs: u64) -> Self {
        self.opts.set_keep_alive(Duration::from_secs(secs));
        self
    }

    /// Sets the maximum packet size for incoming and outgoing packets.
    pub fn max_packet_size(mut self, incoming: usize, outgoing: usize) -> Self {
        self.opts.set_max_packet_size(incoming, outgoing);
        self
    }

    /// Sets the credentials sent in the CONNECT packet.
    ///
    /// Sent in clear text unless TLS is configured.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.opts.set_credentials(username, password);
        self
    }

    /// Current options, mostly for inspection in tests.
    pub fn options(&self) -> &MqttOptions {
        &self.opts
    }

    fn load_file(path: &str) -> Result<Vec<u8>, InboundError> {
        Ok(fs::read(path)?)
    }

    /// Loads the certificates and builds the TLS transport.
    fn build_tls_transport(tls_config: &TlsConfig) -> Result<Transport, InboundError> {
        tls_config
            .validate_config()
            .map_err(|e| InboundError::ClientSetup(format!("Invalid TLS configuration: {e}")))?;

        let ca_path = tls_config
            .ca_cert_path
            .as_deref()
            .ok_or_else(|| InboundError::ClientSetup("TLS configuration is not set".into()))?;
        let ca = Self::load_file(ca_path)?;

        let client_auth = match (
            tls_config.client_cert_path.as_deref(),
            tls_config.client_key_path.as_deref(),
        ) {
            (Some(cert), Some(key)) => Some((Self::load_file(cert)?, Self::load_file(key)?)),
            _ => None,
        };

        Ok(Transport::Tls(TlsConfiguration::Simple {
            ca,
            client_auth,
            alpn: None,
        }))
    }

    /// Constructs the MQTT client and event loop.
    ///
    /// Nothing touches the network until the event loop is polled.
    pub fn build(self) -> Result<(AsyncClient, EventLoop), InboundError> {
        let mut opts = self.opts;
        if let Some(tls_config) = &self.tls_config {
            opts.set_transport(Self::build_tls_transport(tls_config)?);
        }

        Ok(AsyncClient::new(opts, self.cap))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Write};

    use tempfile::TempDir;

    use super::*;

    struct TestFiles {
        _temp_dir: TempDir,
        ca_cert: String,
        client_cert: String,
        client_key: String,
    }

    impl TestFiles {
        fn new() -> std::io::Result<Self> {
            let temp_dir = TempDir::new()?;

            let ca_cert = temp_dir.path().join("ca.crt");
            let client_cert = temp_dir.path().join("client.crt");
            let client_key = temp_dir.path().join("client.key");

            File::create(&ca_cert)?.write_all(b"ca certificate content")?;
            File::create(&client_cert)?.write_all(b"client certificate content")?;
            File::create(&client_key)?.write_all(b"client key content")?;

            Ok(TestFiles {
                _temp_dir: temp_dir,
                ca_cert: ca_cert.to_string_lossy().into_owned(),
                client_cert: client_cert.to_string_lossy().into_owned(),
                client_key: client_key.to_string_lossy().into_owned(),
            })
        }
    }

    #[test]
    fn test_builder_forces_clean_session() {
        let builder = ClientBuilder::new("test_client", "localhost", 1883, 10);
        assert!(builder.options().clean_session());
        assert_eq!(builder.cap, 10);
    }

    #[test]
    fn test_from_config_applies_settings() {
        let config = Config {
            host: "broker.plant.local".into(),
            port: 1884,
            keep_alive: 30,
            username: Some("bridge".into()),
            password: Some("secret".into()),
            ..Default::default()
        };

        let builder = ClientBuilder::from_config(&config).unwrap();
        let opts = builder.options();
        assert_eq!(opts.broker_address(), ("broker.plant.local".to_string(), 1884));
        assert_eq!(opts.keep_alive(), Duration::from_secs(30));
        assert_eq!(opts.client_id(), "mqtt-bridge");
        assert_eq!(
            opts.credentials(),
            Some(("bridge".to_string(), "secret".to_string()))
        );
    }

    fn broker_config() -> Config {
        Config {
            host: "broker.plant.local".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_config_skips_partial_credentials() {
        let config = Config {
            username: Some("bridge".into()),
            ..broker_config()
        };

        let builder = ClientBuilder::from_config(&config).unwrap();
        assert_eq!(builder.options().credentials(), None);
    }

    #[test]
    fn test_from_config_generates_client_id() {
        let config = Config {
            client_id: String::new(),
            ..broker_config()
        };

        let builder = ClientBuilder::from_config(&config).unwrap();
        assert_eq!(builder.options().client_id().len(), 36);
    }

    #[test]
    fn test_from_config_invalid() {
        let config = Config {
            host: String::new(),
            ..Default::default()
        };

        assert!(ClientBuilder::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_from_config_with_mutual_tls() {
        let test_files = TestFiles::new().expect("Failed to create test files");
        let config = Config {
            port: 8883,
            tls: Some(TlsConfig::new(
                &test_files.ca_cert,
                &test_files.client_cert,
                &test_files.client_key,
            )),
            ..broker_config()
        };

        let builder = ClientBuilder::from_config(&config).unwrap();
        let tls = builder.tls_config.as_ref().unwrap();
        assert_eq!(tls.client_key_path.as_deref(), Some(test_files.client_key.as_str()));
        assert!(builder.build().is_ok());
    }

    #[tokio::test]
    async fn test_from_config_with_ca_only() {
        let test_files = TestFiles::new().expect("Failed to create test files");
        let config = Config {
            port: 8883,
            tls: Some(TlsConfig::with_ca_only(&test_files.ca_cert)),
            ..broker_config()
        };

        let builder = ClientBuilder::from_config(&config).unwrap();
        let tls = builder.tls_config.as_ref().unwrap();
        assert_eq!(tls.ca_cert_path.as_deref(), Some(test_files.ca_cert.as_str()));
        assert_eq!(tls.client_cert_path, None);
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_from_config_rejects_certificate_without_key() {
        let test_files = TestFiles::new().expect("Failed to create test files");
        let config = Config {
            tls: Some(TlsConfig {
                ca_cert_path: Some(test_files.ca_cert.clone()),
                client_cert_path: Some(test_files.client_cert.clone()),
                client_key_path: None,
            }),
            ..broker_config()
        };

        assert!(matches!(
            ClientBuilder::from_config(&config),
            Err(InboundError::ClientSetup(_))
        ));
    }

    #[test]
    fn test_from_config_without_tls() {
        let builder = ClientBuilder::from_config(&broker_config()).unwrap();
        assert!(builder.tls_config.is_none());
    }

    #[tokio::test]
    async fn test_build_tcp_client() {
        let result = ClientBuilder::new("test_client", "localhost", 1883, 10).build();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_build_tls_client_with_client_auth() {
        let test_files = TestFiles::new().expect("Failed to create test files");

        let result = ClientBuilder::new("test_client", "localhost", 8883, 10)
            .with_tls(
                &test_files.ca_cert,
                &test_files.client_cert,
                &test_files.client_key,
            )
            .build();

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_build_tls_client_ca_only() {
        let test_files = TestFiles::new().expect("Failed to create test files");

        let result = ClientBuilder::new("test_client", "localhost", 8883, 10)
            .with_tls_ca_only(&test_files.ca_cert)
            .build();

        assert!(result.is_ok());
    }

    #[test]
    fn test_build_tls_missing_ca() {
        let result = ClientBuilder::new("test_client", "localhost", 8883, 10)
            .with_tls_ca_only("/nonexistent/ca.crt")
            .build();

        assert!(result.is_err());
    }
}
