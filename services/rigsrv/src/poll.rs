//! Sensor polling shared by the positioning machines

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, RigError};
use crate::io_status::{IoSnapshot, StatusSource};
use crate::registry::FrameSink;

/// How a machine reaches the sensors and paces its polls
pub struct SensorPoller {
    status: Arc<dyn StatusSource>,
    sink: Arc<dyn FrameSink>,
    io_peer: String,
    reset_command: String,
    interval: Duration,
}

/// Result of a bounded wait for a sensor edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Edge seen on this reading (1 = the immediate check)
    Reached { reading: u32, snapshot: Arc<IoSnapshot> },
    Exhausted { readings: u32 },
}

impl SensorPoller {
    pub fn new(
        status: Arc<dyn StatusSource>,
        sink: Arc<dyn FrameSink>,
        io_peer: impl Into<String>,
        reset_command: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            status,
            sink,
            io_peer: io_peer.into(),
            reset_command: reset_command.into(),
            interval,
        }
    }

    /// Sleep one poll interval unless cancelled first
    pub async fn pause(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(self.interval) => Ok(()),
            _ = cancel.cancelled() => Err(RigError::cancelled("poll interrupted")),
        }
    }

    /// Wait until the IO board reports, asking it to reset before every
    /// interval. No iteration bound; only cancellation ends the wait.
    pub async fn wait_for_snapshot(&self, cancel: &CancellationToken) -> Result<Arc<IoSnapshot>> {
        loop {
            if let Some(snapshot) = self.status.current() {
                return Ok(snapshot);
            }
            warn!("IO status unavailable, resetting sensors");
            if let Err(e) = self
                .sink
                .send_to(&self.io_peer, &self.reset_command, true)
                .await
            {
                warn!("Sensor reset: {}", e);
            }
            self.pause(cancel).await?;
        }
    }

    /// Check `edge` now and after each of up to `max_polls` intervals, so at
    /// most `max_polls + 1` readings. A missing snapshot counts as "not yet".
    pub async fn poll_until<F>(
        &self,
        max_polls: u32,
        cancel: &CancellationToken,
        edge: F,
    ) -> Result<PollOutcome>
    where
        F: Fn(&IoSnapshot) -> bool,
    {
        let mut polls: u32 = 0;
        loop {
            let reading = polls.saturating_add(1);
            match self.status.current() {
                Some(snapshot) if edge(&snapshot) => {
                    debug!("Edge on reading {}", reading);
                    return Ok(PollOutcome::Reached { reading, snapshot });
                },
                Some(_) => {},
                None => debug!("Reading {}: IO status unavailable", reading),
            }
            if polls >= max_polls {
                return Ok(PollOutcome::Exhausted { readings: reading });
            }
            self.pause(cancel).await?;
            polls += 1;
        }
    }
}
