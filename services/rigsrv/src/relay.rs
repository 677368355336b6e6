//! Device handlers for non-IO traffic

use tracing::info;

/// Receives frames routed to one device role
pub trait DeviceHandler: Send + Sync {
    fn handle(&self, message: &str, is_hex: bool);
}

/// Relay bank handler: records what the relay board reports
#[derive(Debug, Default)]
pub struct LoggingRelayHandler;

impl DeviceHandler for LoggingRelayHandler {
    fn handle(&self, message: &str, is_hex: bool) {
        if is_hex {
            info!("Relay frame: {}", message);
        } else {
            info!("Relay text: {}", message);
        }
    }
}
