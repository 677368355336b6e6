//! Service bootstrap utilities: startup banner and logging setup

use tracing::{info, Level};

use crate::logging::{self, LogConfig};

/// Service metadata for startup
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name (e.g., "rigsrv")
    pub name: String,
    pub version: String,
    pub description: String,
    /// Device listener port
    pub default_port: u16,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        default_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            default_port,
        }
    }
}

/// Print startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ██████╗ ██╗ ██████╗
 ██╔══██╗██║██╔════╝
 ██████╔╝██║██║  ███╗
 ██╔══██╗██║██║   ██║
 ██║  ██║██║╚██████╔╝
 ╚═╝  ╚═╝╚═╝ ╚═════╝
    "#;

    info!("{}", banner);
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Device Port: {}", service.default_port);
}

/// Initialize logging for a service
///
/// Log root priority: `RIG_LOG_DIR` env > `log_dir` > "logs".
/// Files go under `<root>/<service name>/`.
pub fn init_logging(
    service: &ServiceInfo,
    console_level: Level,
    log_dir: Option<&str>,
    ansi: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_log_root(log_dir);

    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: logging::get_log_root().join(&service.name),
        console_level,
        enable_json: false,
        ansi,
    };

    logging::init_with_config(log_config)
}
