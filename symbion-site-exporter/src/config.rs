//! Exporter configuration
//!
//! There is no config file: `main` loads an optional `.env`, then each
//! `SYMBION_EXPORTER_*` variable overrides one default. Defaults reproduce a
//! stock ISPConfig host (sites under `/var/www/clients`, Apache + MySQL).

use crate::execution::CommandLine;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_LISTEN: &str = "SYMBION_EXPORTER_LISTEN";
pub const ENV_SITES_ROOT: &str = "SYMBION_EXPORTER_SITES_ROOT";
pub const ENV_INTERVAL: &str = "SYMBION_EXPORTER_INTERVAL";
pub const ENV_HTTP_TIMEOUT: &str = "SYMBION_EXPORTER_HTTP_TIMEOUT";
pub const ENV_COMMAND_TIMEOUT: &str = "SYMBION_EXPORTER_COMMAND_TIMEOUT";
pub const ENV_DU_COMMAND: &str = "SYMBION_EXPORTER_DU_COMMAND";
pub const ENV_SERVICE_COMMAND: &str = "SYMBION_EXPORTER_SERVICE_COMMAND";
pub const ENV_WEB_SERVICE: &str = "SYMBION_EXPORTER_WEB_SERVICE";
pub const ENV_DB_SERVICE: &str = "SYMBION_EXPORTER_DB_SERVICE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: invalid listen address {value:?}: {source}")]
    InvalidAddress {
        var: &'static str,
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("{var}: invalid duration {value:?}: {source}")]
    InvalidDuration {
        var: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("{var}: timeout must be greater than zero")]
    ZeroTimeout { var: &'static str },
    #[error("{var}: invalid command line {value:?}: {source}")]
    InvalidCommand {
        var: &'static str,
        value: String,
        #[source]
        source: shell_words::ParseError,
    },
    #[error("{var}: command line has no program")]
    EmptyCommand { var: &'static str },
}

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Metrics endpoint bind address
    pub listen_addr: SocketAddr,
    /// Base of the `<client>/web*/ssl` tree
    pub sites_root: PathBuf,
    /// Pause between the end of one cycle and the start of the next
    pub interval: Duration,
    pub http_timeout: Duration,
    pub command_timeout: Duration,
    /// Disk usage tool; the site path is appended
    pub du_command: CommandLine,
    /// Service manager query; the unit name is appended
    pub service_command: CommandLine,
    pub web_service: String,
    pub db_service: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8003)),
            sites_root: PathBuf::from("/var/www/clients"),
            interval: Duration::from_secs(60),
            http_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(30),
            du_command: CommandLine::new("du", ["-sb"]),
            service_command: CommandLine::new("systemctl", ["is-active"]),
            web_service: "apache2".to_string(),
            db_service: "mysql".to_string(),
        }
    }
}

impl ExporterConfig {
    /// Load overrides from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load overrides from any key lookup. Unset or blank values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(value) = get(ENV_LISTEN) {
            config.listen_addr = value.parse().map_err(|source| ConfigError::InvalidAddress {
                var: ENV_LISTEN,
                value,
                source,
            })?;
        }
        if let Some(value) = get(ENV_SITES_ROOT) {
            config.sites_root = PathBuf::from(value);
        }
        if let Some(value) = get(ENV_INTERVAL) {
            config.interval = parse_duration(ENV_INTERVAL, value)?;
        }
        if let Some(value) = get(ENV_HTTP_TIMEOUT) {
            config.http_timeout = parse_timeout(ENV_HTTP_TIMEOUT, value)?;
        }
        if let Some(value) = get(ENV_COMMAND_TIMEOUT) {
            config.command_timeout = parse_timeout(ENV_COMMAND_TIMEOUT, value)?;
        }
        if let Some(value) = get(ENV_DU_COMMAND) {
            config.du_command = parse_command(ENV_DU_COMMAND, value)?;
        }
        if let Some(value) = get(ENV_SERVICE_COMMAND) {
            config.service_command = parse_command(ENV_SERVICE_COMMAND, value)?;
        }
        if let Some(value) = get(ENV_WEB_SERVICE) {
            config.web_service = value;
        }
        if let Some(value) = get(ENV_DB_SERVICE) {
            config.db_service = value;
        }

        Ok(config)
    }
}

fn parse_duration(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    humantime::parse_duration(&value)
        .map_err(|source| ConfigError::InvalidDuration { var, value, source })
}

fn parse_timeout(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    let timeout = parse_duration(var, value)?;
    if timeout.is_zero() {
        return Err(ConfigError::ZeroTimeout { var });
    }
    Ok(timeout)
}

fn parse_command(var: &'static str, value: String) -> Result<CommandLine, ConfigError> {
    match CommandLine::parse(&value) {
        Ok(Some(command)) if !command.program.is_empty() => Ok(command),
        Ok(_) => Err(ConfigError::EmptyCommand { var }),
        Err(source) => Err(ConfigError::InvalidCommand { var, value, source }),
    }
}
