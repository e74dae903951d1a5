//! Logging configuration.
//!
//! ```toml
//! [logger]
//! level = "debug"
//!
//! [logger.console]
//! format = "json"
//! ansi_colors = false
//!
//! [logger.journald]
//! enabled = true
//! ```

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Console line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerConfig {
    /// trace, debug, info, warn or error. `RUST_LOG` takes precedence.
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    #[validate(nested)]
    pub console: Option<ConsoleConfig>,

    #[validate(nested)]
    pub journald: Option<JournaldConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            console: Some(ConsoleConfig::default()),
            journald: Some(JournaldConfig::default()),
        }
    }
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some(format!("Invalid log level: {}", level).into());
            Err(err)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,

    /// Include the module path of each event.
    pub show_target: bool,
    pub show_thread_ids: bool,

    /// Emit an event when a span closes.
    pub show_spans: bool,
    pub ansi_colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            format: LogFormat::default(),
            show_target: false,
            show_thread_ids: false,
            show_spans: false,
            ansi_colors: true,
        }
    }
}

/// systemd journal output.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct JournaldConfig {
    pub enabled: bool,

    /// SYSLOG_IDENTIFIER of the journal entries.
    #[validate(length(min = 1, message = "Journald identifier cannot be empty"))]
    pub identifier: String,
}

impl Default for JournaldConfig {
    fn default() -> Self {
        JournaldConfig {
            enabled: false,
            identifier: "pubsub-bridge".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_logger_config() {
        let config = LoggerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.level, "info");
        assert!(config.console.as_ref().is_some_and(|c| c.enabled));
        assert!(config.journald.as_ref().is_some_and(|j| !j.enabled));
    }

    #[test]
    fn test_log_level_validation() {
        assert!(validate_log_level("DEBUG").is_ok());
        assert!(validate_log_level("warn").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }

    #[test]
    fn test_parse_from_toml() {
        let config: LoggerConfig = toml::from_str(
            r#"
            level = "debug"

            [console]
            format = "json"
            ansi_colors = false

            [journald]
            enabled = true
            identifier = ""
            "#,
        )
        .unwrap();

        let console = config.console.as_ref().unwrap();
        assert_eq!(console.format, LogFormat::Json);
        assert!(!console.ansi_colors);
        assert!(console.enabled);
        assert!(config.validate().is_err());
    }
}
