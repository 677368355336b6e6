//! Service configuration
//!
//! Layered with figment: defaults < YAML file < `RIGSRV_` environment
//! variables (`RIGSRV_MOTION__POLL_INTERVAL_MS=500`).

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RigError};

/// Default device listener port
pub const DEFAULT_PORT: u16 = 8888;

/// Default HTTP API port
pub const DEFAULT_API_PORT: u16 = 8090;

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "config/rigsrv.yaml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "RIGSRV_";

/// Upper bound for any configured poll count
pub const MAX_POLL_BOUND: u32 = 100_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RigConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub devices: DevicesConfig,
    pub motion: MotionConfig,
    pub axes: AxesConfig,
    pub logging: LoggingConfig,
}

/// Device listener
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

/// Peer IPs (no port) identifying each device role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DevicesConfig {
    pub io_ip: String,
    pub relay_ip: String,
    pub motor_bridge_ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    pub poll_interval_ms: u64,
    /// Pause between the pulse-count and direction frames
    pub settle_delay_ms: u64,
    /// Bowl reset poll bound
    pub max_position_polls: u32,
    /// Turntable homing poll bound
    pub turntable_max_polls: u32,
    /// Continuous bowl check poll bound
    pub continuous_max_polls: u32,
    /// Pulses for one turntable feed slot
    pub feed_pulses: u16,
    /// Speed set before a continuous bowl descent
    pub creep_speed: Option<u16>,
    pub max_motor: u8,
    /// Exclusive upper bound for speed
    pub max_speed: u16,
    /// Snapshots older than this count as unavailable (0 disables)
    pub snapshot_max_age_ms: u64,
    /// Hex frame asking the IO board to start reporting
    pub sensor_reset_command: String,
}

/// Motor address of each axis
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AxesConfig {
    pub bowl: u8,
    pub turntable: u8,
    pub noodle: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log root; `RIG_LOG_DIR` wins when set
    pub dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_API_PORT,
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            io_ip: "192.168.1.201".to_string(),
            relay_ip: "192.168.1.202".to_string(),
            motor_bridge_ip: "192.168.1.203".to_string(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            settle_delay_ms: 50,
            max_position_polls: 300,
            turntable_max_polls: 300,
            continuous_max_polls: 300,
            feed_pulses: 800,
            creep_speed: None,
            max_motor: 4,
            max_speed: 500,
            snapshot_max_age_ms: 5000,
            sensor_reset_command: rig_protocol::SENSOR_RESET_COMMAND.to_string(),
        }
    }
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self {
            bowl: 2,
            turntable: 3,
            noodle: 4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

impl MotionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn snapshot_max_age(&self) -> Option<Duration> {
        (self.snapshot_max_age_ms > 0).then(|| Duration::from_millis(self.snapshot_max_age_ms))
    }
}

impl RigConfig {
    /// Load from defaults, the config file (explicit path or
    /// `config/rigsrv.yaml` if present) and the environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = common::resolve_config_path(explicit, Path::new(DEFAULT_CONFIG_PATH));
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config: RigConfig = common::load_layered(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make axis or device identity ambiguous
    pub fn validate(&self) -> Result<()> {
        let motion = &self.motion;
        if motion.max_motor == 0 {
            return Err(RigError::config("motion.max_motor must be at least 1"));
        }
        if motion.max_speed == 0 {
            return Err(RigError::config("motion.max_speed must be positive"));
        }
        if motion.poll_interval_ms == 0 {
            return Err(RigError::config("motion.poll_interval_ms must be positive"));
        }
        let bounds = [
            ("max_position_polls", motion.max_position_polls),
            ("turntable_max_polls", motion.turntable_max_polls),
            ("continuous_max_polls", motion.continuous_max_polls),
        ];
        for (name, polls) in bounds {
            if polls == 0 || polls > MAX_POLL_BOUND {
                return Err(RigError::config(format!(
                    "motion.{} = {} outside 1..={}",
                    name, polls, MAX_POLL_BOUND
                )));
            }
        }
        if let Some(speed) = motion.creep_speed {
            if speed >= motion.max_speed {
                return Err(RigError::config(format!(
                    "motion.creep_speed {} must be below max_speed {}",
                    speed, motion.max_speed
                )));
            }
        }
        if rig_protocol::decode_hex(&motion.sensor_reset_command).is_err() {
            return Err(RigError::config("motion.sensor_reset_command is not valid hex"));
        }

        let axes = [
            ("bowl", self.axes.bowl),
            ("turntable", self.axes.turntable),
            ("noodle", self.axes.noodle),
        ];
        let mut seen = HashSet::new();
        for (name, address) in axes {
            if address == 0 || address > motion.max_motor {
                return Err(RigError::config(format!(
                    "axes.{} = {} outside 1..={}",
                    name, address, motion.max_motor
                )));
            }
            if !seen.insert(address) {
                return Err(RigError::config(format!(
                    "axes.{} = {} already assigned",
                    name, address
                )));
            }
        }

        let devices = [
            ("io_ip", &self.devices.io_ip),
            ("relay_ip", &self.devices.relay_ip),
            ("motor_bridge_ip", &self.devices.motor_bridge_ip),
        ];
        let mut seen = HashSet::new();
        for (name, ip) in devices {
            if ip.trim().is_empty() {
                return Err(RigError::config(format!("devices.{} is empty", name)));
            }
            if !seen.insert(ip.as_str()) {
                return Err(RigError::config(format!(
                    "devices.{} = {} shared with another device",
                    name, ip
                )));
            }
        }

        Ok(())
    }

    /// Apply `--bind-address host:port` to the device listener
    pub fn with_bind_override(mut self, bind: Option<(String, u16)>) -> Self {
        if let Some((host, port)) = bind {
            self.server.host = host;
            self.server.port = port;
        }
        self
    }

    pub fn device_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn api_bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
