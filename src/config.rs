//! Agent configuration loading.
//!
//! YAML is the sole config source; no environment variable overrides except
//! the path itself (`RADS_CONFIG`, or `--config` on the CLI).
//! Default config path: `/etc/rads-agent/agent.yaml`.
//!
//! # Required fields
//! - `agent_id`
//! - `database_file_path`
//! - `nats_config.host`, `nats_config.port`

use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Typed config (post-validation)
// ---------------------------------------------------------------------------

/// Fully-validated agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    pub database_file_path: String,
    pub nats: NatsConfig,
}

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub host: String,
    pub port: u16,
}

impl NatsConfig {
    /// Render the `host:port` connect string expected by the NATS client.
    pub fn connect_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Raw YAML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    agent_id: Option<String>,
    database_file_path: Option<String>,
    nats_config: Option<RawNatsConfig>,
}

#[derive(Debug, Deserialize)]
struct RawNatsConfig {
    host: Option<String>,
    port: Option<u16>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load agent config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<AgentConfig, ConfigError> {
    let yaml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&yaml_str)
}

/// Load agent config from the default path `/etc/rads-agent/agent.yaml`.
pub fn load_config() -> Result<AgentConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/rads-agent/agent.yaml"))
}

/// Load agent config from a YAML string.
pub fn load_config_from_str(yaml_str: &str) -> Result<AgentConfig, ConfigError> {
    let raw: RawConfig =
        serde_yaml::from_str(yaml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let agent_id = raw
        .agent_id
        .ok_or_else(|| ConfigError::MissingField("agent_id".to_owned()))?;
    if agent_id.is_empty() {
        return Err(ConfigError::InvalidValue(
            "agent_id must not be empty".to_owned(),
        ));
    }

    let database_file_path = raw
        .database_file_path
        .ok_or_else(|| ConfigError::MissingField("database_file_path".to_owned()))?;

    let raw_nats = raw
        .nats_config
        .ok_or_else(|| ConfigError::MissingField("nats_config".to_owned()))?;
    let host = raw_nats
        .host
        .ok_or_else(|| ConfigError::MissingField("nats_config.host".to_owned()))?;
    let port = raw_nats
        .port
        .ok_or_else(|| ConfigError::MissingField("nats_config.port".to_owned()))?;

    Ok(AgentConfig {
        agent_id,
        database_file_path,
        nats: NatsConfig { host, port },
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
