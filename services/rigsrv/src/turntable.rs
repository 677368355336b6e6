//! Turntable homing and feed advances

use std::sync::Arc;

use parking_lot::Mutex;
use rig_protocol::pins;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bowl::FailReason;
use crate::error::{Result, RigError};
use crate::motor::{AxisGuard, MotorService};
use crate::poll::{PollOutcome, SensorPoller};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum TurntableState {
    Unknown,
    Homing,
    Home,
    /// A fixed-pulse advance was issued; position is home plus one slot
    Fed,
    Failed(FailReason),
}

#[derive(Debug, Clone, Copy)]
pub struct TurntableSettings {
    pub axis: u8,
    pub max_polls: u32,
    pub feed_pulses: u16,
}

pub struct TurntableMachine {
    motors: Arc<MotorService>,
    poller: SensorPoller,
    settings: TurntableSettings,
    state: Mutex<TurntableState>,
}

impl TurntableMachine {
    pub fn new(
        motors: Arc<MotorService>,
        poller: SensorPoller,
        settings: TurntableSettings,
    ) -> Self {
        Self {
            motors,
            poller,
            settings,
            state: Mutex::new(TurntableState::Unknown),
        }
    }

    pub fn state(&self) -> TurntableState {
        *self.state.lock()
    }

    fn set_state(&self, state: TurntableState) {
        *self.state.lock() = state;
    }

    /// Rotate forward until the home sensor asserts; no motion if already home
    pub async fn reset(&self, cancel: &CancellationToken) -> Result<TurntableState> {
        let guard = self.motors.claim(self.settings.axis)?;
        self.home(&guard, cancel).await?;
        Ok(TurntableState::Home)
    }

    /// Advance one feed slot, homing first when needed
    pub async fn feed(&self, cancel: &CancellationToken) -> Result<TurntableState> {
        let guard = self.motors.claim(self.settings.axis)?;
        self.home(&guard, cancel).await?;

        info!("Turntable feed: {} pulses", self.settings.feed_pulses);
        if let Err(e) = self
            .motors
            .start_with(&guard, true, self.settings.feed_pulses)
            .await
        {
            error!("Turntable feed: {}", e);
            return Err(self.fail(FailReason::Command, e));
        }
        self.set_state(TurntableState::Fed);
        Ok(TurntableState::Fed)
    }

    async fn home(&self, guard: &AxisGuard, cancel: &CancellationToken) -> Result<()> {
        let axis = guard.axis();
        self.set_state(TurntableState::Homing);

        let snapshot = match self.poller.wait_for_snapshot(cancel).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.fail(FailReason::Cancelled, e)),
        };
        if snapshot.is_high(pins::TURNTABLE_HOME) {
            info!("Turntable at home");
            self.set_state(TurntableState::Home);
            return Ok(());
        }

        info!("Turntable homing");
        if let Err(e) = self.motors.start_with(guard, true, 0).await {
            error!("Turntable homing: {}", e);
            return Err(self.fail(FailReason::Command, e));
        }

        let outcome = match self
            .poller
            .poll_until(self.settings.max_polls, cancel, |s| {
                s.is_high(pins::TURNTABLE_HOME)
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Turntable homing interrupted, stopping");
                self.stop_defensively(axis).await;
                return Err(self.fail(FailReason::Cancelled, e));
            },
        };

        match outcome {
            PollOutcome::Reached { reading, .. } => {
                self.motors.stop(axis).await.map_err(|e| {
                    error!("Turntable stop: {}", e);
                    self.fail(FailReason::Command, e)
                })?;
                info!("Turntable home on reading {}", reading);
                self.set_state(TurntableState::Home);
                Ok(())
            },
            PollOutcome::Exhausted { readings } => {
                error!("Turntable homing timeout after {} readings", readings);
                self.stop_defensively(axis).await;
                Err(self.fail(
                    FailReason::Timeout,
                    RigError::PositionTimeout {
                        axis,
                        polls: self.settings.max_polls,
                    },
                ))
            },
        }
    }

    async fn stop_defensively(&self, axis: u8) {
        if let Err(e) = self.motors.stop(axis).await {
            error!("Turntable defensive stop: {}", e);
        }
    }

    fn fail(&self, reason: FailReason, err: RigError) -> RigError {
        self.set_state(TurntableState::Failed(reason));
        err
    }
}
