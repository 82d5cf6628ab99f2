//! Configuration types for slurp
//!
//! A [`Config`] is built once (from CLI flags, optionally layered over a JSON
//! file) and then shared immutably with the run controller and everything
//! below it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default NNTP port for plain connections
pub const DEFAULT_PORT: u16 = 119;

/// Default NNTP port for implicit TLS
pub const DEFAULT_TLS_PORT: u16 = 563;

/// Main configuration for a slurp run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// NNTP server to fetch from
    pub server: ServerConfig,

    /// Maximum number of segment fetches in flight at once (default: 11)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Directory holding staged (still encoded) segment bodies (default: ".")
    #[serde(default = "default_dir")]
    pub staging_dir: PathBuf,

    /// Directory receiving reassembled output files (default: ".")
    #[serde(default = "default_dir")]
    pub output_dir: PathBuf,

    /// Skip files whose output already exists in `output_dir` (default: true)
    #[serde(default = "default_true")]
    pub skip_existing: bool,

    /// Retry policy for establishing connections
    #[serde(default)]
    pub retry: RetryConfig,

    /// Network timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Config {
    /// Create a configuration for `server` with every other setting at its default
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server,
            concurrency: default_concurrency(),
            staging_dir: default_dir(),
            output_dir: default_dir(),
            skip_existing: true,
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                "config_file",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Check invariants the run controller relies on
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::config("server.host", "host must not be empty"));
        }
        if self.server.port == 0 {
            return Err(Error::config("server.port", "port must be non-zero"));
        }
        if self.concurrency == 0 {
            return Err(Error::config(
                "concurrency",
                "concurrency must be a positive integer",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "backoff multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

/// NNTP server configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname
    pub host: String,

    /// Server port (typically 119 for unencrypted, 563 for TLS)
    pub port: u16,

    /// Use TLS (implicit TLS, not STARTTLS)
    #[serde(default)]
    pub tls: bool,

    /// Username for authentication (empty = no authentication)
    #[serde(default)]
    pub username: String,

    /// Password for authentication (may be empty)
    #[serde(default)]
    pub password: String,
}

impl ServerConfig {
    /// Build a server config from `host` or `host:port`.
    ///
    /// Without an explicit port, 563 is used for TLS and 119 otherwise.
    /// IPv6 literals must be bracketed when a port is given (`[::1]:119`).
    pub fn from_address(address: &str, tls: bool) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::config("server.host", "host must not be empty"));
        }

        let default_port = if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT };

        let (host, port) = if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| {
                Error::config("server.host", format!("unterminated IPv6 literal: {address}"))
            })?;
            match tail.strip_prefix(':') {
                Some(port) => (host, parse_port(port)?),
                None if tail.is_empty() => (host, default_port),
                None => {
                    return Err(Error::config(
                        "server.host",
                        format!("unexpected text after IPv6 literal: {address}"),
                    ));
                }
            }
        } else {
            match address.rsplit_once(':') {
                // A bare IPv6 literal has more than one colon and no port
                Some((host, port)) if !host.contains(':') => (host, parse_port(port)?),
                _ => (address, default_port),
            }
        };

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
            username: String::new(),
            password: String::new(),
        })
    }

    /// Attach credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// `host:port` string suitable for dialling
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(Error::config(
            "server.port",
            format!("invalid port: {port:?}"),
        )),
    }
}

/// Retry configuration for transient connection failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Network timeouts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection establishment, including TLS and greeting (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect: Duration,

    /// Waiting for a single response line or body chunk (default: 60 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: default_connect_timeout(),
            read: default_read_timeout(),
        }
    }
}

fn default_concurrency() -> usize {
    11
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
