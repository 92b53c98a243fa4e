//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::protocol::SERVER_NAME;
use crate::mcp::router::ResponseFormat;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Server identity.
    #[serde(default)]
    pub server: ServerConfig,

    /// Handshake behaviour.
    #[serde(default)]
    pub session: SessionConfig,

    /// Function-call orchestrator limits.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server.name must not be empty".to_string(),
            });
        }

        let orchestrator = &self.orchestrator;
        let zero_limits = [
            ("orchestrator.call_timeout_secs", orchestrator.call_timeout_secs == 0),
            ("orchestrator.max_parallel_calls", orchestrator.max_parallel_calls == 0),
            ("orchestrator.max_conversations", orchestrator.max_conversations == 0),
            ("orchestrator.max_turns", orchestrator.max_turns == 0),
        ];
        if let Some((name, _)) = zero_limits.iter().find(|(_, zero)| *zero) {
            return Err(ConfigError::ValidationError {
                message: format!("{name} must be greater than zero"),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        Ok(())
    }
}

/// Server identity settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Name reported in `serverInfo`.
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
        }
    }
}

fn default_server_name() -> String {
    SERVER_NAME.to_string()
}

/// Session settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Reject everything but `initialize` and `ping` until the handshake
    /// completes.
    #[serde(default)]
    pub require_initialize: bool,
}

/// Orchestrator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Per-call timeout in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Upper bound on calls executed by one `invoke_many`.
    #[serde(default = "default_max_parallel")]
    pub max_parallel_calls: usize,

    /// Live conversations kept before eviction.
    #[serde(default = "default_max_conversations")]
    pub max_conversations: usize,

    /// Turns allowed per conversation.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Encoding of call results when the call does not ask for one.
    #[serde(default = "default_response_format")]
    pub default_response_format: ResponseFormat,
}

impl OrchestratorConfig {
    /// The per-call timeout as a [`Duration`].
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout(),
            max_parallel_calls: default_max_parallel(),
            max_conversations: default_max_conversations(),
            max_turns: default_max_turns(),
            default_response_format: default_response_format(),
        }
    }
}

const fn default_call_timeout() -> u64 {
    30
}

const fn default_max_parallel() -> usize {
    10
}

const fn default_max_conversations() -> usize {
    50
}

const fn default_max_turns() -> u32 {
    10
}

const fn default_response_format() -> ResponseFormat {
    ResponseFormat::Json
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
