//! Application configuration: loading, environment overrides, validation.
//!
//! Values are layered in this order, later sources winning:
//! 1. built-in defaults
//! 2. a TOML file, if one is found (see [`Config::get_config_path`])
//! 3. environment variables (a `.env` file is loaded by `main` beforehand)
//!
//! The result is validated once and stays immutable for the life of the
//! process.
//!
//! ```toml
//! [mqtt]
//! host = "broker.plant.local"
//! topic = "plant-floor/data/#"
//!
//! [pubsub]
//! topic = "projects/plant-telemetry/topics/floor-data"
//!
//! [bridge]
//! reconnect_delay = 5
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use validator::Validate;

use self::logger::LoggerConfig;

pub mod logger;

#[doc(hidden)]
pub use console as __console;

/// Timestamp for lines printed before the tracing subscriber exists.
#[doc(hidden)]
pub fn early_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Timestamped console output for use before logging is initialized.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            $crate::config::__console::style($crate::config::early_timestamp()).dim(),
            $crate::config::__console::style("INFO").green(),
            format_args!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            $crate::config::__console::style($crate::config::early_timestamp()).dim(),
            $crate::config::__console::style("WARN").yellow(),
            format_args!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("{}  {} {}",
            $crate::config::__console::style($crate::config::early_timestamp()).dim(),
            $crate::config::__console::style("ERROR").red(),
            format_args!($($arg)*)
        )
    };
}

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "BRIDGE_CONFIG";

/// Configuration file used when `BRIDGE_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pubsub-bridge/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML file or an environment value could not be parsed.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Timing of the connection supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BridgeConfig {
    /// Seconds between connection attempts.
    #[validate(range(
        min = 1,
        max = 3600,
        message = "Reconnect delay must be between 1 and 3600 seconds"
    ))]
    pub reconnect_delay: u64,

    /// Bound in seconds for the DISCONNECT and for draining in-flight
    /// publishes at shutdown.
    #[validate(range(
        min = 1,
        max = 300,
        message = "Shutdown timeout must be between 1 and 300 seconds"
    ))]
    pub shutdown_timeout: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: 5,
            shutdown_timeout: 5,
        }
    }
}

impl BridgeConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// Broker connection and the subscribed topic filter.
    #[validate(nested)]
    pub mqtt: bridge_mqtt::Config,

    /// Destination topic and credentials.
    #[validate(nested)]
    pub pubsub: bridge_pubsub::Config,

    #[validate(nested)]
    pub bridge: BridgeConfig,
}

impl Config {
    /// Builds the configuration from the file (if any) and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or parsed, an
    /// environment value is malformed, or the result fails validation (a
    /// missing `PUBSUB_TOPIC` among others).
    pub fn new() -> Result<Self, ConfigError> {
        let mut config = match Self::get_config_path() {
            Some(path) => Self::read(&path)?,
            None => {
                print_info!("No configuration file found, using defaults and environment");
                Config::default()
            }
        };

        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Determines the configuration file path.
    ///
    /// Priority:
    /// 1. `BRIDGE_CONFIG` environment variable
    /// 2. `/etc/pubsub-bridge/config.toml`, if it exists
    fn get_config_path() -> Option<PathBuf> {
        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(config_path);
            print_info!("Using config from {}: {}", CONFIG_PATH_ENV, path.display());
            return Some(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Some(fallback.to_path_buf());
        }

        None
    }

    /// Loads and validates configuration from `path`, without environment
    /// overrides.
    ///
    /// # Errors
    /// Returns `ConfigError::Config` if the file does not exist,
    /// `ConfigError::IoError` if it cannot be read,
    /// `ConfigError::ParseError` if it is not valid TOML for this layout and
    /// `ConfigError::ValidationError` if a value is out of range.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// Empty values count as unset.
    ///
    /// # Arguments
    /// - `lookup`: Returns the value of a variable, `std::env::var` in
    ///   production and a map in tests
    ///
    /// # Errors
    /// Returns `ConfigError::ParseError` naming the variable if a numeric
    /// value does not parse.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(host) = get("MQTT_BROKER") {
            self.mqtt.host = host;
        }
        if let Some(port) = get("MQTT_PORT") {
            self.mqtt.port = parse_env("MQTT_PORT", &port)?;
        }
        if let Some(topic) = get("MQTT_TOPIC") {
            self.mqtt.topic = topic;
        }
        if let Some(username) = get("MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = get("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        if let Some(client_id) = get("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(keep_alive) = get("MQTT_KEEPALIVE") {
            self.mqtt.keep_alive = parse_env("MQTT_KEEPALIVE", &keep_alive)?;
        }

        if let Some(topic) = get("PUBSUB_TOPIC") {
            self.pubsub.topic = topic;
        }
        if let Some(host) = get("PUBSUB_EMULATOR_HOST") {
            self.pubsub.emulator_host = Some(host);
        }
        if let Some(token) = get("PUBSUB_ACCESS_TOKEN") {
            self.pubsub.access_token = Some(token);
        }

        if let Some(delay) = get("BRIDGE_RECONNECT_DELAY") {
            self.bridge.reconnect_delay = parse_env("BRIDGE_RECONNECT_DELAY", &delay)?;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logger.level = level;
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ParseError(format!("{key} has an invalid value: '{value}'")))
}
