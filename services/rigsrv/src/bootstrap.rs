//! Service bootstrap: arguments, logging, configuration validation

use std::path::PathBuf;

use clap::Parser;
use common::{ServiceArgs, ServiceInfo};
use tracing::info;

use crate::config::{RigConfig, DEFAULT_PORT};
use crate::error::{Result, RigError};

/// Command-line arguments for rigsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rigsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Rig gateway: device connections, motor control, bowl/turntable positioning",
    long_about = None
)]
pub struct Args {
    /// Config file (YAML, TOML or JSON); defaults to config/rigsrv.yaml if present
    #[arg(short = 'c', long, env = "RIG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Device listener bind address (host:port)
    #[arg(short = 'b', long, env = "BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validate configuration, print the effective config and exit
    #[arg(long)]
    pub validate: bool,
}

impl From<Args> for ServiceArgs {
    fn from(args: Args) -> Self {
        ServiceArgs {
            config: args.config,
            log_level: args.log_level,
            bind_address: args.bind_address,
            no_color: args.no_color,
            validate: args.validate,
        }
    }
}

pub fn service_info() -> ServiceInfo {
    ServiceInfo::new(
        "rigsrv",
        env!("CARGO_PKG_VERSION"),
        "Rig gateway - IO sensors, relays, stepper motors",
        DEFAULT_PORT,
    )
}

/// Load the layered configuration and apply command-line overrides
pub fn load_configuration(args: &ServiceArgs) -> Result<RigConfig> {
    let config = RigConfig::load(args.config.as_deref())?;
    if args.bind_address.is_some() && args.bind_override().is_none() {
        return Err(RigError::config(format!(
            "Invalid bind address '{}', expected host:port",
            args.bind_address.as_deref().unwrap_or_default()
        )));
    }
    Ok(config.with_bind_override(args.bind_override()))
}

/// Initialize logging: `--log-level` wins over `logging.level`
pub fn initialize_logging(
    args: &ServiceArgs,
    service: &ServiceInfo,
    config: &RigConfig,
) -> Result<()> {
    let level = args.parse_log_level(&config.logging.level);
    common::init_logging(service, level, config.logging.dir.as_deref(), !args.no_color)
        .map_err(|e| RigError::config(format!("Failed to initialize logging: {}", e)))
}

/// Effective configuration as YAML
pub fn render_configuration(config: &RigConfig) -> Result<String> {
    serde_yaml::to_string(config)
        .map_err(|e| RigError::config(format!("Failed to render configuration: {}", e)))
}

/// Validation mode: log the effective configuration
pub fn validate_configuration(config: &RigConfig) -> Result<()> {
    let rendered = render_configuration(config)?;
    info!("Configuration valid:\n{}", rendered);
    Ok(())
}
