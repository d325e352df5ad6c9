//! Server Configuration
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults (`0.0.0.0:6379`)
//! 2. A `redis.conf`-style file, if present
//! 3. Command-line flags
//!
//! The file format is one `key value` pair per line; blank lines and lines
//! starting with `#` are ignored:
//!
//! ```text
//! # network
//! bind 127.0.0.1
//! port 6380
//! drain-timeout 5
//! logdir /var/log/flashgate
//! ```

use crate::connection::DEFAULT_DRAIN_TIMEOUT;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Config file read when none is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "redis.conf";

/// Directory the rotating log files are written to
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A non-comment line without a value
    #[error("line {line}: expected `key value`, got {text:?}")]
    InvalidLine { line: usize, text: String },

    #[error("line {line}: invalid value {value:?} for {key}")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
}

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// How long an in-flight response may take to finish during shutdown
    pub drain_timeout: Duration,
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loads `path` on top of the defaults, or just the defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if path.is_file() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            config.apply(&contents)?;
        }
        Ok(config)
    }

    /// Applies the settings found in a config file's contents.
    pub fn apply(&mut self, contents: &str) -> Result<(), ConfigError> {
        for (idx, raw) in contents.lines().enumerate() {
            let line = idx + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            let Some((key, value)) = text.split_once(char::is_whitespace) else {
                return Err(ConfigError::InvalidLine {
                    line,
                    text: text.to_string(),
                });
            };
            let key = key.to_ascii_lowercase();
            let value = value.trim();

            let invalid = || ConfigError::InvalidValue {
                line,
                key: key.clone(),
                value: value.to_string(),
            };

            match key.as_str() {
                "bind" => self.host = value.to_string(),
                "port" => self.port = value.parse().map_err(|_| invalid())?,
                "drain-timeout" => {
                    let secs: u64 = value.parse().map_err(|_| invalid())?;
                    self.drain_timeout = Duration::from_secs(secs);
                }
                "logdir" => self.log_dir = PathBuf::from(value),
                _ => warn!(line, key = %key, "Ignoring unknown config key"),
            }
        }
        Ok(())
    }
}

/// Command-line options
#[derive(Debug, Clone, Parser)]
#[command(name = "flashgate", version, about = "FlashGate - RESP front end for FlashKV", long_about = None)]
pub struct Opts {
    /// Config file to load (skipped if missing)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Seconds an in-flight response may take to finish during shutdown
    #[arg(long)]
    pub drain_timeout: Option<u64>,

    /// Directory for the daily log files
    #[arg(long, env = "FLASHGATE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Opts {
    /// Resolves the final configuration: defaults, then file, then flags.
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = ServerConfig::load(&self.config)?;

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.drain_timeout {
            config.drain_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = self.log_dir {
            config.log_dir = dir;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:6379");
        assert_eq!(config.drain_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_apply_file_contents() {
        let mut config = ServerConfig::default();
        config
            .apply("# comment\n\nbind 127.0.0.1\nPORT   6380\ndrain-timeout 3\nlogdir /tmp/fg\nappendonly no\n")
            .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:6380");
        assert_eq!(config.drain_timeout, Duration::from_secs(3));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/fg"));
    }

    #[test]
    fn test_invalid_port() {
        let mut config = ServerConfig::default();
        let err = config.apply("port 70000\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { line: 1, .. }));
    }

    #[test]
    fn test_line_without_value() {
        let mut config = ServerConfig::default();
        let err = config.apply("bind 127.0.0.1\nport\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLine { line: 2, .. }));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ServerConfig::load(Path::new("/definitely/not/here.conf")).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let path = std::env::temp_dir().join(format!("flashgate-test-{}.conf", std::process::id()));
        std::fs::write(&path, "bind 10.0.0.1\nport 7000\n").unwrap();

        let opts = Opts::try_parse_from([
            "flashgate",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "7001",
            "--drain-timeout",
            "1",
        ])
        .unwrap();
        let config = opts.into_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 7001);
        assert_eq!(config.drain_timeout, Duration::from_secs(1));
    }
}
