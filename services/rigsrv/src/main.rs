//! Rig gateway service

use clap::Parser;
use common::ServiceArgs;
use tracing::info;

use rigsrv::bootstrap::{self, Args};
use rigsrv::RigService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: ServiceArgs = Args::parse().into();
    let service_info = bootstrap::service_info();

    // Config first: it carries the log level and directory
    let config = bootstrap::load_configuration(&args)?;
    bootstrap::initialize_logging(&args, &service_info, &config)?;
    if !args.no_color {
        common::print_startup_banner(&service_info);
    }

    if args.validate {
        bootstrap::validate_configuration(&config)?;
        info!("Validation completed successfully");
        return Ok(());
    }

    let shutdown = common::shutdown_token();
    let service = RigService::new(config, service_info);
    service.run(shutdown).await?;

    Ok(())
}
