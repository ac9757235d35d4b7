//! Configuration for the linewire server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::line::{LineEnding, LineOptions, DEFAULT_LINE_CAPACITY};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the line server
#[derive(Parser, Debug, Default)]
#[command(name = "linewire")]
#[command(author = "linewire authors")]
#[command(version = "0.1.0")]
#[command(about = "An interactive line-oriented text server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:7171)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum number of concurrent sessions
    #[arg(short = 'n', long)]
    pub max_sessions: Option<usize>,

    /// How long one read waits for input, in milliseconds (0 = don't wait)
    #[arg(short = 't', long)]
    pub read_timeout_ms: Option<u64>,

    /// Close sessions idle for this many seconds (0 = never)
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Terminator order for outbound lines
    #[arg(long, value_enum)]
    pub line_ending: Option<LineEnding>,

    /// Always echo input back to the peer
    #[arg(long)]
    pub echo: bool,

    /// Log every line sent
    #[arg(long)]
    pub log_writes: bool,

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
    pub line: LineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum number of concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// How long one read waits for input
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Idle limit in seconds (0 = never)
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_sessions: default_max_sessions(),
            read_timeout_ms: default_read_timeout_ms(),
            idle_timeout_secs: 0,
        }
    }
}

/// Line protocol configuration, applied to every session
#[derive(Debug, Deserialize)]
pub struct LineConfig {
    /// Inbound line capacity in bytes
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub line_ending: LineEnding,
    #[serde(default = "default_true")]
    pub auto_echo: bool,
    #[serde(default)]
    pub echo: bool,
    #[serde(default)]
    pub ignore_return: bool,
    /// Put accepted sockets in non-blocking mode
    #[serde(default = "default_true")]
    pub nonblocking: bool,
    #[serde(default = "default_true")]
    pub error_tracking: bool,
    #[serde(default)]
    pub log_writes: bool,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            line_ending: LineEnding::default(),
            auto_echo: true,
            echo: false,
            ignore_return: false,
            nonblocking: true,
            error_tracking: true,
            log_writes: false,
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

fn default_listen() -> String {
    "127.0.0.1:7171".to_string()
}

fn default_max_sessions() -> usize {
    64
}

fn default_read_timeout_ms() -> u64 {
    500
}

fn default_capacity() -> usize {
    DEFAULT_LINE_CAPACITY
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub max_sessions: usize,
    pub read_timeout_ms: u64,
    pub idle_timeout_secs: u64,
    pub nonblocking: bool,
    pub line: LineOptions,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
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

    /// Merge CLI args over TOML values.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let line = toml_config.line;
        let capacity = line.capacity;
        if capacity == 0 {
            return Err(ConfigError::Invalid("line.capacity must be at least 1".into()));
        }
        let read_timeout_ms = cli
            .read_timeout_ms
            .unwrap_or(toml_config.server.read_timeout_ms);
        // Sessions poll with this window; zero would spin.
        if read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.read_timeout_ms must be at least 1".into(),
            ));
        }

        Ok(Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            max_sessions: cli
                .max_sessions
                .unwrap_or(toml_config.server.max_sessions),
            read_timeout_ms,
            idle_timeout_secs: cli
                .idle_timeout_secs
                .unwrap_or(toml_config.server.idle_timeout_secs),
            nonblocking: line.nonblocking,
            line: LineOptions {
                capacity,
                line_ending: cli.line_ending.unwrap_or(line.line_ending),
                echo: cli.echo || line.echo,
                auto_echo: line.auto_echo,
                ignore_return: line.ignore_return,
                error_tracking: line.error_tracking,
                log_writes: cli.log_writes || line.log_writes,
            },
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
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
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> CliArgs {
        CliArgs {
            log_level: "info".to_string(),
            ..CliArgs::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "127.0.0.1:7171");
        assert_eq!(config.server.read_timeout_ms, 500);
        assert_eq!(config.line.capacity, 512);
        assert_eq!(config.line.line_ending, LineEnding::CrLf);
        assert!(config.line.auto_echo);
        assert!(!config.line.echo);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:2323"
            max_sessions = 4
            idle_timeout_secs = 300

            [line]
            capacity = 1024
            line_ending = "lfcr"
            auto_echo = false
            ignore_return = true

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:2323");
        assert_eq!(config.server.max_sessions, 4);
        assert_eq!(config.server.idle_timeout_secs, 300);
        assert_eq!(config.server.read_timeout_ms, 500);
        assert_eq!(config.line.capacity, 1024);
        assert_eq!(config.line.line_ending, LineEnding::LfCr);
        assert!(!config.line.auto_echo);
        assert!(config.line.ignore_return);
        assert!(config.line.nonblocking);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            listen = "0.0.0.0:2323"
            [logging]
            level = "warn"
        "#,
        )
        .unwrap();

        let args = CliArgs {
            listen: Some("127.0.0.1:9000".to_string()),
            line_ending: Some(LineEnding::LfCr),
            echo: true,
            ..cli()
        };
        let config = Config::merge(args, toml_config).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.line.line_ending, LineEnding::LfCr);
        assert!(config.line.echo);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let toml_config: TomlConfig = toml::from_str("[line]\ncapacity = 0\n").unwrap();
        let err = Config::merge(cli(), toml_config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_read_timeout_rejected() {
        let toml_config: TomlConfig = toml::from_str("[server]\nread_timeout_ms = 0\n").unwrap();
        let err = Config::merge(cli(), toml_config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let args = CliArgs {
            read_timeout_ms: Some(0),
            ..cli()
        };
        let err = Config::merge(args, TomlConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
