//! Periodic driver for a [`ControlLoop`].
//!
//! [`run`] ticks a loop from a `tokio` interval: each period it reads the
//! [`Sensor`], measures the real elapsed time since the previous tick and
//! calls [`ControlLoop::tick`].  It stops when the shared shutdown flag is
//! raised, when the tick limit is reached, or on the first error the loop
//! itself does not absorb (halt, actuator or sensor fault).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pidloop_hal::Sensor;
use pidloop_types::{ControlSample, LoopError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, instrument};

use crate::control_loop::{ControlLoop, TickOutcome};

/// Timing parameters for [`run`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Nominal tick period.  Also used as `dt` for the very first tick.
    pub period: Duration,
    /// Stop after this many ticks; `None` runs until shutdown.
    pub max_ticks: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            max_ticks: None,
        }
    }
}

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    TickLimit,
}

/// Counters collected over one [`run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ticks: u64,
    pub applied: u64,
    pub rejected: u64,
    pub last_sample: Option<ControlSample>,
    pub stop: StopReason,
}

/// Drive `control` towards `target` until shutdown or the tick limit.
///
/// `observer` is called after every tick with the tick index and outcome.
///
/// # Errors
///
/// Returns the first sensor error, actuator error or [`LoopError::Halted`].
#[instrument(name = "control_loop", skip_all, fields(loop_id = control.id(), target))]
pub async fn run<S, F>(
    control: &mut ControlLoop,
    sensor: &mut S,
    target: f32,
    config: &SchedulerConfig,
    shutdown: &AtomicBool,
    mut observer: F,
) -> Result<RunSummary, LoopError>
where
    S: Sensor + ?Sized,
    F: FnMut(u64, &TickOutcome),
{
    let mut interval = tokio::time::interval(config.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut summary = RunSummary {
        ticks: 0,
        applied: 0,
        rejected: 0,
        last_sample: None,
        stop: StopReason::Shutdown,
    };
    let mut last_tick: Option<Instant> = None;

    info!(
        loop_id = control.id(),
        sensor = sensor.id(),
        target,
        period_ms = config.period.as_millis() as u64,
        "scheduler started"
    );

    loop {
        if shutdown.load(Ordering::SeqCst) {
            summary.stop = StopReason::Shutdown;
            break;
        }
        if config.max_ticks.is_some_and(|max| summary.ticks >= max) {
            summary.stop = StopReason::TickLimit;
            break;
        }

        let now = interval.tick().await;
        let dt = match last_tick {
            Some(prev) => now.duration_since(prev).as_secs_f32(),
            None => config.period.as_secs_f32(),
        };
        last_tick = Some(now);

        let measurement = sensor.read()?;
        let outcome = control.tick(target, measurement, dt)?;

        match &outcome {
            TickOutcome::Applied(sample) => {
                summary.applied += 1;
                summary.last_sample = Some(sample.clone());
            }
            TickOutcome::Held { .. } | TickOutcome::Skipped { .. } => summary.rejected += 1,
        }
        observer(summary.ticks, &outcome);
        summary.ticks += 1;
    }

    info!(
        loop_id = control.id(),
        ticks = summary.ticks,
        applied = summary.applied,
        rejected = summary.rejected,
        stop = ?summary.stop,
        "scheduler stopped"
    );
    Ok(summary)
}
