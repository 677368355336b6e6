//! Device router
//!
//! Identifies the sender of an inbound frame by its peer IP and dispatches it:
//! IO board frames become the new IO status snapshot, relay frames go to the
//! relay handler, motor bridge echoes are only traced. Frames from any other
//! address are dropped.

use std::sync::Arc;

use rig_protocol::{decode_status_frame, pins, MotorCommand};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DevicesConfig;
use crate::error::{Result, RigError};
use crate::io_status::IoStatusStore;
use crate::relay::DeviceHandler;

/// Role of a configured device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    IoSensor,
    Relay,
    MotorBridge,
}

pub struct DeviceRouter {
    devices: DevicesConfig,
    store: Arc<IoStatusStore>,
    relay: Arc<dyn DeviceHandler>,
}

impl DeviceRouter {
    pub fn new(
        devices: DevicesConfig,
        store: Arc<IoStatusStore>,
        relay: Arc<dyn DeviceHandler>,
    ) -> Self {
        Self {
            devices,
            store,
            relay,
        }
    }

    /// Exact address match against the configured devices
    pub fn role_of(&self, peer: &str) -> Option<DeviceRole> {
        if peer == self.devices.io_ip {
            Some(DeviceRole::IoSensor)
        } else if peer == self.devices.relay_ip {
            Some(DeviceRole::Relay)
        } else if peer == self.devices.motor_bridge_ip {
            Some(DeviceRole::MotorBridge)
        } else {
            None
        }
    }

    /// Dispatch one inbound frame.
    ///
    /// Undecodable IO frames leave the snapshot untouched and report
    /// `SensorUnavailable`; unknown peers report `UnroutableDevice`.
    pub fn route(&self, peer: &str, is_hex: bool, content: &str) -> Result<DeviceRole> {
        let role = self
            .role_of(peer)
            .ok_or_else(|| RigError::UnroutableDevice(peer.to_string()))?;

        match role {
            DeviceRole::IoSensor => self.handle_io(is_hex, content)?,
            DeviceRole::Relay => self.relay.handle(content, is_hex),
            DeviceRole::MotorBridge => handle_motor_echo(is_hex, content),
        }
        Ok(role)
    }

    fn handle_io(&self, is_hex: bool, content: &str) -> Result<()> {
        if !is_hex {
            info!("IO text: {}", content);
            return Ok(());
        }

        let levels = decode_status_frame(content)
            .map_err(|e| RigError::sensor_unavailable(format!("IO frame decode: {}", e)))?;
        let changes = match self.store.latest() {
            Some(previous) => levels.changes_from(previous.levels()),
            None => Vec::new(),
        };
        let rendered = levels.to_string();

        match self.store.publish(levels) {
            None => info!("IO online: {}", rendered),
            Some(_) => {
                for (pin, high) in changes {
                    info!(
                        "IO X{} ({}): {}",
                        pin + 1,
                        pin_name(pin),
                        if high { "high" } else { "low" }
                    );
                }
            },
        }
        Ok(())
    }
}

fn handle_motor_echo(is_hex: bool, content: &str) {
    if !is_hex {
        debug!("Motor bridge text: {}", content);
        return;
    }
    match MotorCommand::parse_hex(content) {
        Ok(cmd) => debug!("Motor{} echo: {:?}", cmd.address(), cmd.op()),
        Err(e) => warn!("Motor bridge frame {}: {}", content, e),
    }
}

fn pin_name(pin: usize) -> &'static str {
    match pin {
        pins::TURNTABLE_HOME => "turntable home",
        pins::BOWL_PRESENT => "bowl present",
        pins::BOWL_LOWER_LIMIT => "bowl lower limit",
        pins::BOWL_UPPER_LIMIT => "bowl upper limit",
        _ => "unused",
    }
}
