//! Configuration module for the unique-tcp server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::commands::DEFAULT_BYTES_LENGTH;
use crate::generator::MAX_RANDOM_BYTES;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "unique-tcp")]
#[command(author = "unique-tcp authors")]
#[command(disable_version_flag = true)]
#[command(about = "A TCP server for unique ids, tokens and random bytes", long_about = None)]
pub struct CliArgs {
    /// Show the version and exit
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Set the listening port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Set the client's idle timeout in seconds
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Listening port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Idle timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout: default_timeout(),
        }
    }
}

/// Command table configuration
#[derive(Debug, Deserialize)]
pub struct CommandsConfig {
    /// Number of random bytes returned by `bytes`
    #[serde(default = "default_bytes_length")]
    pub bytes_length: usize,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            bytes_length: default_bytes_length(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
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

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_bytes_length() -> usize {
    DEFAULT_BYTES_LENGTH
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub idle_timeout: Duration,
    pub bytes_length: usize,
    pub log_level: String,
}

impl Config {
    /// Resolve configuration from parsed CLI args and the optional TOML file
    /// they point at. CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let timeout = cli.timeout.unwrap_or(toml_config.server.timeout);
        if timeout == 0 {
            return Err(ConfigError::Invalid(
                "idle timeout must be at least one second".to_string(),
            ));
        }

        let bytes_length = toml_config.commands.bytes_length;
        if bytes_length == 0 || bytes_length > MAX_RANDOM_BYTES {
            return Err(ConfigError::Invalid(format!(
                "bytes_length must be between 1 and {}",
                MAX_RANDOM_BYTES
            )));
        }

        Ok(Config {
            host: toml_config.server.host,
            port: cli.port.unwrap_or(toml_config.server.port),
            idle_timeout: Duration::from_secs(timeout),
            bytes_length,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Convenience: `host:port` socket string.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            port: default_port(),
            idle_timeout: Duration::from_secs(default_timeout()),
            bytes_length: default_bytes_length(),
            log_level: default_log_level(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
