//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level tabwire configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// WebSocket listener the browser extension connects to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind")]
    pub bind: String,

    /// Terminate whatever holds the port before binding (default: true).
    #[serde(default = "default_true")]
    pub reclaim_port: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            reclaim_port: true,
        }
    }
}

fn default_port() -> u16 {
    9009
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_true() -> bool {
    true
}

/// Request/response settings for the extension bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Per-request reply deadline in ms (default: 30000).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// What `send` does with no extension connected: "fail_fast" (default) or "wait".
    #[serde(default = "default_connect_policy")]
    pub connect: String,

    /// How long "wait" blocks for the extension to connect (default: 10000).
    #[serde(default = "default_connect_wait")]
    pub connect_wait_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            connect: default_connect_policy(),
            connect_wait_ms: default_connect_wait(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_connect_policy() -> String {
    "fail_fast".into()
}

fn default_connect_wait() -> u64 {
    10_000
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `Some(wait)` when sends should wait for a connection, `None` to fail fast.
    pub fn connect_wait(&self) -> Option<Duration> {
        match self.connect.as_str() {
            "wait" => Some(Duration::from_millis(self.connect_wait_ms)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Reply to action tools with a fresh ARIA snapshot instead of a text confirmation.
    #[serde(default)]
    pub snapshot: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "tabwire_relay=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::TabwireError::Io)?;

        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::TabwireError::Config(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn relay_port(&self) -> u16 {
        self.relay.port
    }

    /// Get a config value by dotted path (e.g. "relay.port", "bridge.connect").
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

        if self.relay.port == 0 {
            errors.push("Relay port cannot be 0".to_string());
        }

        if self.bridge.request_timeout_ms == 0 {
            errors.push("bridge.request_timeout_ms must be greater than 0".to_string());
        }

        match self.bridge.connect.as_str() {
            "fail_fast" => {}
            "wait" => {
                if self.bridge.connect_wait_ms == 0 {
                    warnings.push(
                        "bridge.connect is \"wait\" but connect_wait_ms is 0; sends will fail fast"
                            .to_string(),
                    );
                }
            }
            other => errors.push(format!("Unknown bridge.connect policy: {other}")),
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                errors.push(format!("Unknown logging.format: {}", logging.format));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for tabwire data: `~/.tabwire/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tabwire")
}
