//! Stepper motor control
//!
//! Commands go to the motor bridge as hex Modbus frames through a
//! [`FrameSink`]. Every motion command is checked against a fresh IO status
//! snapshot first; a rejected command sends nothing.
//!
//! At most one command sequence per axis is in flight: `start`, `set_speed`
//! and the positioning machines claim the axis with [`MotorService::claim`],
//! and a second claimant fails fast with `AxisBusy`. `stop` never waits for
//! or takes the claim.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rig_protocol::{pins, Direction, MotorCommand};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::config::{AxesConfig, MotionConfig};
use crate::error::{Result, RigError};
use crate::io_status::StatusSource;
use crate::registry::FrameSink;

/// Exclusive right to command one axis, released on drop
pub struct AxisGuard {
    axis: u8,
    _lock: OwnedMutexGuard<()>,
}

impl AxisGuard {
    pub fn axis(&self) -> u8 {
        self.axis
    }
}

/// Which limit pin forbids motion in one direction of one axis
#[derive(Debug, Clone, Copy)]
struct InterlockRule {
    axis: u8,
    direction: Direction,
    pin: usize,
}

impl InterlockRule {
    fn violation(&self) -> RigError {
        match self.direction {
            Direction::Forward => RigError::AtLowerLimit(self.axis),
            Direction::Reverse => RigError::AtUpperLimit(self.axis),
        }
    }
}

/// Bowl lift: forward descends onto the lower limit, reverse rises to the upper
fn interlock_rules(axes: &AxesConfig) -> Vec<InterlockRule> {
    vec![
        InterlockRule {
            axis: axes.bowl,
            direction: Direction::Forward,
            pin: pins::BOWL_LOWER_LIMIT,
        },
        InterlockRule {
            axis: axes.bowl,
            direction: Direction::Reverse,
            pin: pins::BOWL_UPPER_LIMIT,
        },
    ]
}

pub struct MotorService {
    sink: Arc<dyn FrameSink>,
    status: Arc<dyn StatusSource>,
    bridge: String,
    max_motor: u8,
    max_speed: u16,
    settle_delay: Duration,
    interlocks: Vec<InterlockRule>,
    axis_locks: DashMap<u8, Arc<Mutex<()>>>,
}

impl MotorService {
    pub fn new(
        sink: Arc<dyn FrameSink>,
        status: Arc<dyn StatusSource>,
        bridge: impl Into<String>,
        motion: &MotionConfig,
        axes: &AxesConfig,
    ) -> Self {
        Self {
            sink,
            status,
            bridge: bridge.into(),
            max_motor: motion.max_motor,
            max_speed: motion.max_speed,
            settle_delay: motion.settle_delay(),
            interlocks: interlock_rules(axes),
            axis_locks: DashMap::new(),
        }
    }

    /// Map a requested motor number onto a configured axis address
    pub fn address(&self, no: u32) -> Result<u8> {
        match u8::try_from(no) {
            Ok(axis) if axis != 0 && axis <= self.max_motor => Ok(axis),
            _ => Err(RigError::InvalidMotorAddress(no)),
        }
    }

    fn validate_address(&self, axis: u8) -> Result<()> {
        self.address(axis.into()).map(|_| ())
    }

    /// Claim an axis without waiting
    pub fn claim(&self, axis: u8) -> Result<AxisGuard> {
        self.validate_address(axis)?;
        let lock = Arc::clone(self.axis_locks.entry(axis).or_default().value());
        let guard = lock.try_lock_owned().map_err(|_| RigError::AxisBusy(axis))?;
        Ok(AxisGuard {
            axis,
            _lock: guard,
        })
    }

    /// Start a motor: pulse count (0 = run until stopped), settle, direction
    pub async fn start(&self, axis: u8, forward: bool, pulses: u16) -> Result<()> {
        self.validate_address(axis)?;
        self.check_interlock(axis, Direction::from_forward(forward))?;
        let guard = self.claim(axis)?;
        self.start_with(&guard, forward, pulses).await
    }

    /// `start` for a caller that already holds the axis
    pub async fn start_with(&self, guard: &AxisGuard, forward: bool, pulses: u16) -> Result<()> {
        let axis = guard.axis();
        let direction = Direction::from_forward(forward);
        self.check_interlock(axis, direction)?;

        info!("Motor{} start: {:?}, {} pulses", axis, direction, pulses);
        self.transmit(MotorCommand::pulse_count(axis, pulses)).await?;
        tokio::time::sleep(self.settle_delay).await;
        // The direction frame is what sets the motor running
        self.check_interlock(axis, direction)?;
        self.transmit(MotorCommand::direction(axis, direction)).await
    }

    /// Set speed; `speed` must be below the configured maximum
    pub async fn set_speed(&self, axis: u8, speed: u16) -> Result<()> {
        self.validate_address(axis)?;
        self.validate_speed(axis, speed)?;
        let guard = self.claim(axis)?;
        self.set_speed_with(&guard, speed).await
    }

    pub async fn set_speed_with(&self, guard: &AxisGuard, speed: u16) -> Result<()> {
        let axis = guard.axis();
        self.validate_speed(axis, speed)?;
        info!("Motor{} speed: {}", axis, speed);
        self.transmit(MotorCommand::speed(axis, speed)).await
    }

    /// Stop a motor. Never blocked by an axis claim.
    pub async fn stop(&self, axis: u8) -> Result<()> {
        self.validate_address(axis)?;
        info!("Motor{} stop", axis);
        self.transmit(MotorCommand::stop(axis)).await
    }

    fn validate_speed(&self, axis: u8, speed: u16) -> Result<()> {
        if speed >= self.max_speed {
            return Err(RigError::SpeedTooHigh {
                axis,
                speed,
                max: self.max_speed,
            });
        }
        Ok(())
    }

    /// Motion needs a fresh snapshot; a limit asserted in the requested
    /// direction refuses it
    fn check_interlock(&self, axis: u8, direction: Direction) -> Result<()> {
        let snapshot = self.status.current().ok_or_else(|| {
            warn!("Motor{} {:?} refused: IO status unavailable", axis, direction);
            RigError::sensor_unavailable("IO status uninitialized or stale")
        })?;

        for rule in &self.interlocks {
            if rule.axis == axis && rule.direction == direction && snapshot.is_high(rule.pin) {
                let err = rule.violation();
                warn!("Motor{} {:?} refused: {}", axis, direction, err);
                return Err(err);
            }
        }
        Ok(())
    }

    async fn transmit(&self, cmd: MotorCommand) -> Result<()> {
        let frame = cmd.to_hex();
        info!("Motor{} tx: {}", cmd.address(), frame);
        self.sink.send_to(&self.bridge, &frame, true).await
    }
}
