//! Common command-line arguments for rig services

use std::path::PathBuf;

#[cfg(feature = "cli")]
use clap::Parser;

/// Common service startup arguments
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", clap(author, version, about))]
pub struct ServiceArgs {
    /// Config file (YAML, TOML or JSON)
    #[cfg_attr(feature = "cli", clap(short = 'c', long, env = "RIG_CONFIG"))]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[cfg_attr(feature = "cli", clap(short = 'l', long))]
    pub log_level: Option<String>,

    /// Device listener bind address override (e.g., 0.0.0.0:8888)
    #[cfg_attr(feature = "cli", clap(short = 'b', long, env = "BIND_ADDRESS"))]
    pub bind_address: Option<String>,

    /// Disable colored output
    #[cfg_attr(feature = "cli", clap(long))]
    pub no_color: bool,

    /// Only validate configuration without starting service
    #[cfg_attr(feature = "cli", clap(long))]
    pub validate: bool,
}

impl Default for ServiceArgs {
    fn default() -> Self {
        Self {
            config: None,
            log_level: None,
            bind_address: None,
            no_color: false,
            validate: false,
        }
    }
}

impl ServiceArgs {
    /// Effective log level: `--log-level` if given, else `fallback`
    pub fn parse_log_level(&self, fallback: &str) -> tracing::Level {
        parse_level(self.log_level.as_deref().unwrap_or(fallback))
    }

    /// Split `--bind-address host:port`; `None` when absent or malformed
    pub fn bind_override(&self) -> Option<(String, u16)> {
        let addr = self.bind_address.as_deref()?;
        let (host, port) = addr.rsplit_once(':')?;
        Some((host.to_string(), port.parse().ok()?))
    }
}

/// Parse a level name, defaulting to INFO
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
