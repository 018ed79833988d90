//! Brightness transitions.
//!
//! A transition is a `Ramp` (the pure step computation) driven by a timer task that
//! fires every transition interval and pushes one command per tick onto the command
//! queue. Each light owns at most one running `Transition`; starting a new one cancels
//! the previous one first.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::message::CommandSender;
use super::message::LightCommand;
use super::message::LightFields;
use super::state::LightState;

/// Default tick spacing, in seconds.
pub const TRANSITION_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Step computation for one transition.
///
/// The step size is derived from the brightness at ramp start in both directions.
/// Ticks are bounded by `steps`, so a zero step size still terminates. An upward ramp
/// can therefore end below full brightness: a light on at 100 ramped over two ticks
/// stops at 200.
#[derive(Debug, Clone)]
pub struct Ramp {
    direction: Direction,
    step_size: u32,
    ticks_left: u32,
    tracked: LightState,
}

impl Ramp {
    /// Build a ramp, or `None` when the duration is zero (treated as "no duration").
    pub fn new(
        direction: Direction,
        start: LightState,
        duration: Duration,
        interval: Duration,
    ) -> Option<Self> {
        if duration.is_zero() || interval.is_zero() {
            return None;
        }

        let steps = (duration.as_secs_f64() / interval.as_secs_f64()).ceil() as u32;
        let steps = steps.max(1);
        let step_size = u32::from(start.brightness).div_ceil(steps);

        Some(Self {
            direction,
            step_size,
            ticks_left: steps,
            tracked: start,
        })
    }

    pub fn step_size(&self) -> u32 {
        self.step_size
    }

    pub fn is_finished(&self) -> bool {
        self.ticks_left == 0
    }

    /// Compute the next tick's command, or `None` once the ramp is done.
    pub fn next_step(&mut self) -> Option<LightFields> {
        if self.ticks_left == 0 {
            return None;
        }

        let current = i64::from(self.tracked.brightness);
        let step = i64::from(self.step_size);

        let (brightness, on, done) = match self.direction {
            Direction::Down => {
                if current <= 0 || !self.tracked.on {
                    self.ticks_left = 0;
                    return None;
                }
                let next = current - step;
                (next.max(0), next > 0, next <= 0)
            }
            Direction::Up => {
                if current >= 255 && self.tracked.on {
                    self.ticks_left = 0;
                    return None;
                }
                let next = if self.tracked.on { current + step } else { step };
                (next.min(255), true, next >= 255)
            }
        };

        self.tracked = LightState {
            on,
            brightness: brightness as u8,
        };
        self.ticks_left = if done { 0 } else { self.ticks_left - 1 };

        Some(LightFields {
            on: Some(on),
            brightness: Some(self.tracked.brightness),
        })
    }
}

/// Handle to a running transition timer.
///
/// Cancelling (or dropping) the handle stops the timer before its next tick.
#[derive(Debug)]
pub struct Transition {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Transition {
    /// Spawn the timer task for `ramp`. The first tick fires one interval from now.
    pub fn spawn(
        light_id: String,
        mut ramp: Ramp,
        interval: Duration,
        commands: CommandSender,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        debug!(
            "Transition for {}: {:?} by {} every {:?}",
            light_id,
            ramp.direction,
            ramp.step_size(),
            interval
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Transition for {} cancelled", light_id);
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let Some(fields) = ramp.next_step() else {
                    break;
                };

                let cmd = LightCommand {
                    light_id: light_id.clone(),
                    fields,
                };
                if commands.send(cmd).is_err() {
                    // Command queue closed, engine is gone
                    break;
                }

                if ramp.is_finished() {
                    break;
                }
            }

            debug!("Transition for {} finished", light_id);
        });

        Self { cancel, task }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the timer task is still running.
    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for Transition {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
