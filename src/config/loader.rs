//! Configuration loading from disk and environment overrides.

use std::fs;
use std::path::Path;

use crate::config::schema::{BalancerConfig, StrategyKind};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings supplied on the command line or through the environment.
///
/// Each present field replaces the file value before validation.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind_address: Option<String>,
    pub backends: Option<Vec<String>>,
    pub strategy: Option<StrategyKind>,
    pub broker_host: Option<String>,
    pub broker_port: Option<u16>,
}

impl Overrides {
    pub fn apply(self, config: &mut BalancerConfig) {
        if let Some(addr) = self.bind_address {
            config.listener.bind_address = addr;
        }
        if let Some(backends) = self.backends {
            config.backends = backends;
        }
        if let Some(kind) = self.strategy {
            config.strategy.kind = kind;
        }
        if let Some(host) = self.broker_host {
            config.telemetry.broker_host = host;
        }
        if let Some(port) = self.broker_port {
            config.telemetry.broker_port = port;
        }
    }
}

/// Split a comma-separated backend list, as passed through `LB_BACKENDS`.
pub fn parse_backend_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<BalancerConfig, ConfigError> {
    let config: BalancerConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BalancerConfig, ConfigError> {
    load_with_overrides(Some(path), Overrides::default())
}

/// Load an optional file, apply overrides, then validate the result.
pub fn load_with_overrides(path: Option<&Path>, overrides: Overrides) -> Result<BalancerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => BalancerConfig::default(),
    };

    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
