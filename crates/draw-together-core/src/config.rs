//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DrawTogetherError, Result};
use crate::protocol::ColorSpec;
use crate::session::{DEFAULT_WIDTH, MAX_WIDTH, MIN_WIDTH};

/// Port the relay listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 12345;

/// Top-level Draw Together configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Listen address (default: "0.0.0.0").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Serve `GET /health` on this port when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_port: Option<u16>,

    /// Concurrent connections allowed from one IP (unlimited when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections_per_ip: Option<u32>,

    /// Drop a connection that sends nothing for this long.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,

    /// Longest accepted line in bytes; longer lines close the connection.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Lines buffered per connection before a peer that stopped reading is dropped.
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,

    /// Broadcast "Client connected/disconnected" lines.
    #[serde(default = "default_true")]
    pub presence_notices: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: None,
            port: DEFAULT_PORT,
            health_port: None,
            max_connections_per_ip: None,
            idle_timeout_secs: None,
            max_line_length: default_max_line_length(),
            max_queue: default_max_queue(),
            presence_notices: true,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_line_length() -> usize {
    4096
}

fn default_max_queue() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay address as `host:port`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Initial ink color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorSpec>,

    /// Initial stroke width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "draw_together_relay=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        json5::from_str(&substituted).map_err(|e| DrawTogetherError::Config(e.to_string()))
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn relay(&self) -> RelayConfig {
        self.relay.clone().unwrap_or_default()
    }

    /// Address the relay binds to, e.g. `0.0.0.0:12345`.
    pub fn relay_addr(&self) -> String {
        let relay = self.relay.as_ref();
        let bind = relay
            .and_then(|r| r.bind.as_deref())
            .unwrap_or("0.0.0.0");
        let port = relay.map(|r| r.port).unwrap_or(DEFAULT_PORT);
        format!("{bind}:{port}")
    }

    /// Address clients dial.
    pub fn server_addr(&self) -> String {
        self.client
            .as_ref()
            .and_then(|c| c.server.clone())
            .unwrap_or_else(|| format!("127.0.0.1:{DEFAULT_PORT}"))
    }

    pub fn ink(&self) -> ColorSpec {
        self.client
            .as_ref()
            .and_then(|c| c.color.clone())
            .unwrap_or_else(ColorSpec::black)
    }

    pub fn width(&self) -> f64 {
        self.client
            .as_ref()
            .and_then(|c| c.width)
            .unwrap_or(DEFAULT_WIDTH)
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Get a config value by dotted path (e.g. "relay.port").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(relay) = &self.relay {
            if relay.port == 0 {
                warnings.push("Relay port 0 picks a random port".to_string());
            }
            if relay.max_line_length == 0 {
                errors.push("relay.max_line_length cannot be 0".to_string());
            }
            if relay.max_queue == 0 {
                errors.push("relay.max_queue cannot be 0".to_string());
            }
            if relay.max_connections_per_ip == Some(0) {
                errors.push("relay.max_connections_per_ip cannot be 0".to_string());
            }
            if relay.idle_timeout_secs == Some(0) {
                errors.push("relay.idle_timeout_secs cannot be 0".to_string());
            }
            if relay.health_port.is_some() && relay.health_port == Some(relay.port) {
                errors.push("relay.health_port must differ from relay.port".to_string());
            }
        }

        if let Some(client) = &self.client {
            if let Some(width) = client.width {
                if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
                    warnings.push(format!(
                        "client.width {width} is outside {MIN_WIDTH}..={MAX_WIDTH} and will be clamped"
                    ));
                }
            }
            if let Some(color) = &client.color {
                if color.rgba().is_none() {
                    warnings.push(format!(
                        "client.color {color} is not a recognized color; peers may render it black"
                    ));
                }
            }
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                errors.push(format!("Unknown log format: {}", logging.format));
            }
            if logging.output != "stderr" && logging.output != "stdout" {
                errors.push(format!("Unknown log output: {}", logging.output));
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for Draw Together data: `~/.draw_together/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".draw_together")
}
