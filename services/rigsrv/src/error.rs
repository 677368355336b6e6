//! Error handling for the rig gateway

use rig_protocol::ProtocolError;
use thiserror::Error;

/// Rig gateway error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RigError {
    /// Motor address is 0 or above the configured maximum
    #[error("Invalid motor address: {0}")]
    InvalidMotorAddress(u32),

    #[error("Speed {speed} too high for motor {axis} (must be below {max})")]
    SpeedTooHigh { axis: u8, speed: u16, max: u16 },

    /// Downward motion refused, lower limit asserted
    #[error("Motor {0} at lower limit")]
    AtLowerLimit(u8),

    /// Upward motion refused, upper limit asserted
    #[error("Motor {0} at upper limit")]
    AtUpperLimit(u8),

    /// IO status uninitialized, stale or undecodable
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Unroutable device: {0}")]
    UnroutableDevice(String),

    #[error("No such connection: {0}")]
    NoSuchConnection(String),

    /// Bounded poll exhausted without the expected sensor edge
    #[error("Motor {axis} position timeout after {polls} polls")]
    PositionTimeout { axis: u8, polls: u32 },

    /// Another command sequence holds the axis
    #[error("Motor {0} busy")]
    AxisBusy(u8),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Sensor combination with no safe automatic resolution
    #[error("Unsafe position: {0}")]
    UnsafePosition(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for the rig gateway
pub type Result<T> = std::result::Result<T, RigError>;

impl RigError {
    pub fn config(msg: impl Into<String>) -> Self {
        RigError::Config(msg.into())
    }

    pub fn sensor_unavailable(msg: impl Into<String>) -> Self {
        RigError::SensorUnavailable(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        RigError::Cancelled(msg.into())
    }

    /// Refused before any motion command reached the wire
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RigError::InvalidMotorAddress(_)
                | RigError::SpeedTooHigh { .. }
                | RigError::AtLowerLimit(_)
                | RigError::AtUpperLimit(_)
                | RigError::SensorUnavailable(_)
                | RigError::AxisBusy(_)
        )
    }
}

impl From<std::io::Error> for RigError {
    fn from(err: std::io::Error) -> Self {
        RigError::Io(err.to_string())
    }
}

impl From<common::ConfigLoadError> for RigError {
    fn from(err: common::ConfigLoadError) -> Self {
        RigError::Config(err.to_string())
    }
}
