//! Shared service bootstrap for the rig workspace
//!
//! - logging (console + rolling file, runtime level changes)
//! - graceful shutdown signal / root cancellation token
//! - layered configuration loading (defaults < file < env)
//! - common CLI arguments and startup banner

pub mod bootstrap_args;
pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use bootstrap_args::{parse_level, ServiceArgs};
pub use config_loader::{load_layered, resolve_config_path, ConfigLoadError};
pub use service_bootstrap::{init_logging, print_startup_banner, ServiceInfo};
pub use shutdown::{shutdown_token, wait_for_shutdown};

#[cfg(feature = "cli")]
pub use clap;
