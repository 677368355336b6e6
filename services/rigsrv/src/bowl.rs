//! Bowl lift positioning
//!
//! The lift carries a bowl between a raised holding position and a lowered
//! release position, inferred from three sensors: bowl present, lower limit
//! and upper limit. Every move is "command, poll until the expected edge,
//! stop", bounded in poll count, with a defensive stop on timeout or
//! cancellation.

use std::sync::Arc;

use parking_lot::Mutex;
use rig_protocol::pins;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Result, RigError};
use crate::io_status::IoSnapshot;
use crate::motor::{AxisGuard, MotorService};
use crate::poll::{PollOutcome, SensorPoller};

/// Why the last bowl operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    Timeout,
    UnsafePosition,
    Cancelled,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum BowlState {
    Uninitialized,
    Homing,
    Descending,
    Ascending,
    Settled,
    Failed(FailReason),
}

/// Bowl motion limits
#[derive(Debug, Clone, Copy)]
pub struct BowlSettings {
    pub axis: u8,
    pub max_polls: u32,
    pub continuous_max_polls: u32,
    pub creep_speed: Option<u16>,
}

pub struct BowlMachine {
    motors: Arc<MotorService>,
    poller: SensorPoller,
    settings: BowlSettings,
    state: Mutex<BowlState>,
}

impl BowlMachine {
    pub fn new(motors: Arc<MotorService>, poller: SensorPoller, settings: BowlSettings) -> Self {
        Self {
            motors,
            poller,
            settings,
            state: Mutex::new(BowlState::Uninitialized),
        }
    }

    pub fn state(&self) -> BowlState {
        *self.state.lock()
    }

    fn set_state(&self, state: BowlState) {
        *self.state.lock() = state;
    }

    /// `reset` on initialization, `continuous_check` otherwise
    pub async fn check(&self, initialization: bool, cancel: &CancellationToken) -> Result<BowlState> {
        if initialization {
            self.reset(cancel).await
        } else {
            self.continuous_check(cancel).await
        }
    }

    /// Bring the lift to a known position.
    ///
    /// Bowl present above the lower limit: descend until it clears. No bowl
    /// below the upper limit: rise until one is present. Anything else has no
    /// safe automatic resolution and fails without motion.
    pub async fn reset(&self, cancel: &CancellationToken) -> Result<BowlState> {
        let axis = self.settings.axis;
        let guard = self.motors.claim(axis)?;
        self.set_state(BowlState::Homing);

        let snapshot = match self.poller.wait_for_snapshot(cancel).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.fail(FailReason::Cancelled, e)),
        };
        let present = snapshot.is_high(pins::BOWL_PRESENT);
        let lower = snapshot.is_high(pins::BOWL_LOWER_LIMIT);
        let upper = snapshot.is_high(pins::BOWL_UPPER_LIMIT);
        info!(
            "Bowl reset: present={}, lower={}, upper={}",
            present, lower, upper
        );

        if present && !lower {
            self.move_until(&guard, Move::Descend, self.settings.max_polls, cancel)
                .await
        } else if !present && !upper {
            self.move_until(&guard, Move::Ascend, self.settings.max_polls, cancel)
                .await
        } else {
            let err = RigError::UnsafePosition(format!(
                "bowl present={}, lower limit={}, upper limit={}",
                present, lower, upper
            ));
            error!("Bowl reset: {}", err);
            Err(self.fail(FailReason::UnsafePosition, err))
        }
    }

    /// Lower a present bowl until it clears the sensor; no bowl is a no-op
    pub async fn continuous_check(&self, cancel: &CancellationToken) -> Result<BowlState> {
        let axis = self.settings.axis;
        let guard = self.motors.claim(axis)?;

        let snapshot = match self.poller.wait_for_snapshot(cancel).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.fail(FailReason::Cancelled, e)),
        };
        if !snapshot.is_high(pins::BOWL_PRESENT) {
            info!("Bowl check: no bowl");
            self.set_state(BowlState::Settled);
            return Ok(BowlState::Settled);
        }

        if let Some(speed) = self.settings.creep_speed {
            if let Err(e) = self.motors.set_speed_with(&guard, speed).await {
                return Err(self.fail(FailReason::Command, e));
            }
        }
        self.move_until(
            &guard,
            Move::Descend,
            self.settings.continuous_max_polls,
            cancel,
        )
        .await
    }

    async fn move_until(
        &self,
        guard: &AxisGuard,
        dir: Move,
        max_polls: u32,
        cancel: &CancellationToken,
    ) -> Result<BowlState> {
        let axis = guard.axis();
        self.set_state(dir.state());

        if let Err(e) = self.motors.start_with(guard, dir.forward(), 0).await {
            error!("Bowl {:?}: {}", dir, e);
            return Err(self.fail(FailReason::Command, e));
        }

        let outcome = match self
            .poller
            .poll_until(max_polls, cancel, |s| dir.edge(s) || dir.limit(s))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Bowl {:?} interrupted, stopping", dir);
                self.stop_defensively(axis).await;
                return Err(self.fail(FailReason::Cancelled, e));
            },
        };

        match outcome {
            PollOutcome::Reached { reading, snapshot } => {
                self.motors.stop(axis).await.map_err(|e| {
                    error!("Bowl stop: {}", e);
                    self.fail(FailReason::Command, e)
                })?;

                if dir.edge(&snapshot) {
                    info!("Bowl {:?} done on reading {}", dir, reading);
                    self.set_state(BowlState::Settled);
                    Ok(BowlState::Settled)
                } else {
                    let err = RigError::UnsafePosition(format!(
                        "bowl reached {} limit before the sensor edge",
                        dir.limit_name()
                    ));
                    error!("Bowl {:?}: {}", dir, err);
                    Err(self.fail(FailReason::UnsafePosition, err))
                }
            },
            PollOutcome::Exhausted { readings } => {
                error!("Bowl {:?} timeout after {} readings", dir, readings);
                self.stop_defensively(axis).await;
                Err(self.fail(
                    FailReason::Timeout,
                    RigError::PositionTimeout {
                        axis,
                        polls: max_polls,
                    },
                ))
            },
        }
    }

    async fn stop_defensively(&self, axis: u8) {
        if let Err(e) = self.motors.stop(axis).await {
            error!("Bowl defensive stop: {}", e);
        }
    }

    fn fail(&self, reason: FailReason, err: RigError) -> RigError {
        self.set_state(BowlState::Failed(reason));
        err
    }
}

#[derive(Debug, Clone, Copy)]
enum Move {
    Descend,
    Ascend,
}

impl Move {
    fn forward(self) -> bool {
        matches!(self, Move::Descend)
    }

    fn state(self) -> BowlState {
        match self {
            Move::Descend => BowlState::Descending,
            Move::Ascend => BowlState::Ascending,
        }
    }

    /// Expected sensor edge
    fn edge(self, s: &IoSnapshot) -> bool {
        match self {
            Move::Descend => !s.is_high(pins::BOWL_PRESENT),
            Move::Ascend => s.is_high(pins::BOWL_PRESENT),
        }
    }

    /// Travel limit in this direction
    fn limit(self, s: &IoSnapshot) -> bool {
        match self {
            Move::Descend => s.is_high(pins::BOWL_LOWER_LIMIT),
            Move::Ascend => s.is_high(pins::BOWL_UPPER_LIMIT),
        }
    }

    fn limit_name(self) -> &'static str {
        match self {
            Move::Descend => "lower",
            Move::Ascend => "upper",
        }
    }
}
