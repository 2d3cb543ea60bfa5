//! [`ControlLoop`] – one closed loop: controller, actuator and the caller-side
//! policy for rejected samples.
//!
//! The [`PidController`] only computes; it rejects invalid samples and leaves
//! the decision of what to do about them to its caller.  `ControlLoop` is that
//! caller.  Every tick it:
//!
//! 1. refuses to run if the loop has been halted;
//! 2. feeds `(target, measurement, dt)` to the controller;
//! 3. applies an accepted output to the [`Actuator`];
//! 4. on a rejected sample, applies the configured [`IntervalPolicy`] and
//!    counts the rejection in a [`RejectGuard`].
//!
//! # Example
//!
//! ```rust
//! use pidloop_hal::sim::SimActuator;
//! use pidloop_runtime::control_loop::{ControlLoop, ControlLoopConfig, TickOutcome};
//! use pidloop_types::Gains;
//!
//! let heater = SimActuator::new("heater");
//! let config = ControlLoopConfig {
//!     gains: Gains::new(2.0, 0.5, 0.1),
//!     ..ControlLoopConfig::default()
//! };
//! let mut control = ControlLoop::new(config, Box::new(heater.clone())).unwrap();
//!
//! let outcome = control.tick(100.0, 80.0, 1.0).unwrap();
//! assert!(matches!(outcome, TickOutcome::Applied(_)));
//! assert_eq!(heater.applied(), vec![50.0]);
//! ```

use chrono::Utc;
use pidloop_hal::{Actuator, PidController};
use pidloop_types::{ControlSample, DerivativeMode, Gains, Limits, LoopError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::reject_guard::RejectGuard;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// What the loop does with a sample the controller rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalPolicy {
    /// Leave the actuator alone for this tick.
    #[default]
    Skip,
    /// Re-apply the last accepted output (skip if there is none yet).
    HoldLast,
    /// Stop the loop: return the rejection and stay halted until
    /// [`ControlLoop::reinitialize`].
    Halt,
}

/// Configuration bundle for [`ControlLoop`].
#[derive(Debug, Clone)]
pub struct ControlLoopConfig {
    /// Identifier used in logs and [`ControlSample::loop_id`].
    pub id: String,
    pub gains: Gains,
    pub output_limits: Limits,
    pub integral_limits: Limits,
    pub derivative_mode: DerivativeMode,
    pub interval_policy: IntervalPolicy,
    /// Consecutive rejected samples that halt the loop; `0` never halts.
    pub max_consecutive_rejects: usize,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            id: "loop".to_string(),
            gains: Gains::new(1.0, 0.0, 0.0),
            output_limits: Limits::UNBOUNDED,
            integral_limits: Limits::UNBOUNDED,
            derivative_mode: DerivativeMode::OnMeasurement,
            interval_policy: IntervalPolicy::Skip,
            max_consecutive_rejects: 5,
        }
    }
}

/// Result of one [`ControlLoop::tick`].
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// The controller accepted the sample and its output was applied.
    Applied(ControlSample),
    /// The sample was rejected; the previous output was re-applied.
    Held { output: f32, reason: LoopError },
    /// The sample was rejected; the actuator was left alone.
    Skipped { reason: LoopError },
}

impl TickOutcome {
    /// The value handed to the actuator this tick, if any.
    pub fn applied_output(&self) -> Option<f32> {
        match self {
            TickOutcome::Applied(sample) => Some(sample.output),
            TickOutcome::Held { output, .. } => Some(*output),
            TickOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        !matches!(self, TickOutcome::Applied(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

/// A PID controller bound to the actuator it drives.
///
/// Owns its controller exclusively; run independent loops as independent
/// `ControlLoop` instances.
pub struct ControlLoop {
    id: String,
    pid: PidController,
    actuator: Box<dyn Actuator>,
    policy: IntervalPolicy,
    guard: RejectGuard,
    last_output: Option<f32>,
}

impl ControlLoop {
    /// Build a loop from `config`, driving `actuator`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidGain`] or [`LoopError::InvalidLimits`] if
    /// the configuration is rejected by the controller.
    pub fn new(config: ControlLoopConfig, actuator: Box<dyn Actuator>) -> Result<Self, LoopError> {
        let pid = PidController::new(config.gains)?
            .with_output_limits(config.output_limits)?
            .with_integral_limits(config.integral_limits)?
            .with_derivative_mode(config.derivative_mode);

        info!(
            loop_id = %config.id,
            actuator = actuator.id(),
            kp = config.gains.kp,
            ki = config.gains.ki,
            kd = config.gains.kd,
            policy = ?config.interval_policy,
            "control loop initialised"
        );

        Ok(Self {
            id: config.id,
            pid,
            actuator,
            policy: config.interval_policy,
            guard: RejectGuard::new(config.max_consecutive_rejects),
            last_output: None,
        })
    }

    /// Run one control step.
    ///
    /// # Errors
    ///
    /// - [`LoopError::Halted`] once the loop has been halted, either by the
    ///   reject guard or by [`IntervalPolicy::Halt`].
    /// - The rejection itself under [`IntervalPolicy::Halt`].
    /// - Any actuator error, unchanged.  The controller has already consumed
    ///   the sample in that case.
    #[instrument(name = "tick", skip(self), fields(loop_id = %self.id))]
    pub fn tick(&mut self, target: f32, measurement: f32, dt: f32) -> Result<TickOutcome, LoopError> {
        if self.guard.is_tripped() {
            return Err(LoopError::Halted {
                consecutive_rejects: self.guard.consecutive(),
            });
        }

        match self.pid.update(target, measurement, dt) {
            Ok(output) => {
                self.actuator.apply(output)?;
                self.guard.record_accept();
                self.last_output = Some(output);

                let terms = self.pid.last_terms();
                let sample = ControlSample {
                    timestamp: Utc::now(),
                    loop_id: self.id.clone(),
                    target,
                    measurement,
                    dt,
                    proportional: terms.map_or(0.0, |t| t.proportional),
                    integral: terms.map_or(0.0, |t| t.integral),
                    derivative: terms.map_or(0.0, |t| t.derivative),
                    output,
                };
                debug!(
                    loop_id = %self.id,
                    target,
                    measurement,
                    dt,
                    p = sample.proportional,
                    i = sample.integral,
                    d = sample.derivative,
                    output,
                    "tick"
                );
                Ok(TickOutcome::Applied(sample))
            }
            Err(reason) if reason.is_rejected_sample() => self.handle_rejection(reason),
            Err(other) => Err(other),
        }
    }

    fn handle_rejection(&mut self, reason: LoopError) -> Result<TickOutcome, LoopError> {
        let streak = self.guard.record_reject();
        warn!(loop_id = %self.id, error = %reason, consecutive = streak, "sample rejected");

        if self.guard.is_tripped() {
            warn!(loop_id = %self.id, consecutive = streak, "too many rejected samples; halting loop");
            return Err(LoopError::Halted {
                consecutive_rejects: streak,
            });
        }

        match self.policy {
            IntervalPolicy::Skip => Ok(TickOutcome::Skipped { reason }),
            IntervalPolicy::HoldLast => match self.last_output {
                Some(output) => {
                    self.actuator.apply(output)?;
                    Ok(TickOutcome::Held { output, reason })
                }
                None => Ok(TickOutcome::Skipped { reason }),
            },
            IntervalPolicy::Halt => {
                self.guard.trip();
                Err(reason)
            }
        }
    }

    /// Zero the controller's running state and clear any halt.
    pub fn reinitialize(&mut self) {
        info!(loop_id = %self.id, "control loop re-initialised");
        self.pid.reset();
        self.guard.reset();
        self.last_output = None;
    }

    /// Swap gains without touching the running state.
    pub fn retune(&mut self, gains: Gains) -> Result<(), LoopError> {
        self.pid.retune(gains)?;
        info!(loop_id = %self.id, kp = gains.kp, ki = gains.ki, kd = gains.kd, "control loop retuned");
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn controller(&self) -> &PidController {
        &self.pid
    }

    pub fn actuator(&self) -> &dyn Actuator {
        self.actuator.as_ref()
    }

    pub fn policy(&self) -> IntervalPolicy {
        self.policy
    }

    pub fn last_output(&self) -> Option<f32> {
        self.last_output
    }

    pub fn consecutive_rejects(&self) -> usize {
        self.guard.consecutive()
    }

    pub fn is_halted(&self) -> bool {
        self.guard.is_tripped()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pidloop_hal::SimActuator;

    fn build(policy: IntervalPolicy, max_rejects: usize) -> (ControlLoop, SimActuator) {
        let act = SimActuator::new("heater");
        let config = ControlLoopConfig {
            id: "oven".to_string(),
            gains: Gains::new(2.0, 0.5, 0.1),
            interval_policy: policy,
            max_consecutive_rejects: max_rejects,
            ..ControlLoopConfig::default()
        };
        let control = ControlLoop::new(config, Box::new(act.clone())).unwrap();
        (control, act)
    }

    /// An actuator that always fails.
    struct BrokenActuator;

    impl Actuator for BrokenActuator {
        fn id(&self) -> &str {
            "broken"
        }
        fn apply(&mut self, _control: f32) -> Result<(), LoopError> {
            Err(LoopError::HardwareFault {
                component: "broken".to_string(),
                details: "open circuit".to_string(),
            })
        }
        fn last_applied(&self) -> f32 {
            0.0
        }
    }

    #[test]
    fn accepted_sample_is_applied_and_recorded() {
        let (mut control, act) = build(IntervalPolicy::Skip, 5);
        let outcome = control.tick(100.0, 80.0, 1.0).unwrap();

        match outcome {
            TickOutcome::Applied(sample) => {
                assert_eq!(sample.loop_id, "oven");
                assert_eq!(sample.proportional, 40.0);
                assert_eq!(sample.integral, 10.0);
                assert_eq!(sample.output, 50.0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(act.applied(), vec![50.0]);
        assert_eq!(control.last_output(), Some(50.0));
        assert_eq!(control.actuator().last_applied(), 50.0);
    }

    #[test]
    fn skip_policy_leaves_actuator_alone() {
        let (mut control, act) = build(IntervalPolicy::Skip, 5);
        control.tick(100.0, 80.0, 1.0).unwrap();
        let outcome = control.tick(100.0, 80.0, 0.0).unwrap();

        assert!(matches!(
            outcome,
            TickOutcome::Skipped {
                reason: LoopError::InvalidInterval(_)
            }
        ));
        assert_eq!(outcome.applied_output(), None);
        assert_eq!(act.applied(), vec![50.0]);
        assert_eq!(control.controller().integral(), 20.0);
    }

    #[test]
    fn hold_last_policy_reapplies_previous_output() {
        let (mut control, act) = build(IntervalPolicy::HoldLast, 5);

        // Nothing to hold yet → behaves like skip.
        let first = control.tick(100.0, 80.0, -1.0).unwrap();
        assert!(matches!(first, TickOutcome::Skipped { .. }));

        control.tick(100.0, 80.0, 1.0).unwrap();
        let held = control.tick(100.0, f32::NAN, 1.0).unwrap();
        assert!(matches!(held, TickOutcome::Held { output, .. } if output == 50.0));
        assert_eq!(act.applied(), vec![50.0, 50.0]);
    }

    #[test]
    fn halt_policy_returns_rejection_then_stays_halted() {
        let (mut control, _act) = build(IntervalPolicy::Halt, 0);
        let err = control.tick(1.0, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, LoopError::InvalidInterval(_)));
        assert!(control.is_halted());

        let err = control.tick(1.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, LoopError::Halted { .. }));

        control.reinitialize();
        assert!(!control.is_halted());
        assert!(control.tick(1.0, 0.0, 1.0).is_ok());
    }

    #[test]
    fn reject_guard_halts_after_consecutive_rejections() {
        let (mut control, _act) = build(IntervalPolicy::Skip, 3);
        assert!(control.tick(1.0, 0.0, 0.0).is_ok());
        assert!(control.tick(1.0, 0.0, 0.0).is_ok());
        assert_eq!(control.consecutive_rejects(), 2);

        let err = control.tick(1.0, 0.0, 0.0).unwrap_err();
        assert_eq!(
            err,
            LoopError::Halted {
                consecutive_rejects: 3
            }
        );
        // Even a valid sample is refused now.
        assert!(control.tick(1.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn accepted_sample_resets_reject_streak() {
        let (mut control, _act) = build(IntervalPolicy::Skip, 3);
        control.tick(1.0, 0.0, 0.0).unwrap();
        control.tick(1.0, 0.0, 0.0).unwrap();
        control.tick(1.0, 0.0, 1.0).unwrap();
        assert_eq!(control.consecutive_rejects(), 0);
        control.tick(1.0, 0.0, 0.0).unwrap();
        control.tick(1.0, 0.0, 0.0).unwrap();
        assert!(!control.is_halted());
    }

    #[test]
    fn reinitialize_matches_fresh_loop() {
        let (mut control, _act) = build(IntervalPolicy::Skip, 5);
        control.tick(100.0, 80.0, 1.0).unwrap();
        control.tick(100.0, 90.0, 1.0).unwrap();
        control.reinitialize();

        let (mut fresh, _) = build(IntervalPolicy::Skip, 5);
        let a = control.tick(100.0, 80.0, 1.0).unwrap().applied_output();
        let b = fresh.tick(100.0, 80.0, 1.0).unwrap().applied_output();
        assert_eq!(a, b);
        assert_eq!(a, Some(50.0));
    }

    #[test]
    fn actuator_fault_is_propagated() {
        let mut control =
            ControlLoop::new(ControlLoopConfig::default(), Box::new(BrokenActuator)).unwrap();
        let err = control.tick(1.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, LoopError::HardwareFault { .. }));
        assert_eq!(control.last_output(), None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ControlLoopConfig {
            gains: Gains::new(f32::NAN, 0.0, 0.0),
            ..ControlLoopConfig::default()
        };
        assert!(matches!(
            ControlLoop::new(config, Box::new(SimActuator::new("a"))),
            Err(LoopError::InvalidGain { .. })
        ));

        let config = ControlLoopConfig {
            output_limits: Limits { min: 5.0, max: 0.0 },
            ..ControlLoopConfig::default()
        };
        assert!(matches!(
            ControlLoop::new(config, Box::new(SimActuator::new("a"))),
            Err(LoopError::InvalidLimits { .. })
        ));
    }

    #[test]
    fn retune_changes_output() {
        let (mut control, _act) = build(IntervalPolicy::Skip, 5);
        control.retune(Gains::new(1.0, 0.0, 0.0)).unwrap();
        let out = control.tick(10.0, 4.0, 0.5).unwrap().applied_output();
        assert_eq!(out, Some(6.0));
    }

    #[test]
    fn interval_policy_default_is_skip() {
        assert_eq!(IntervalPolicy::default(), IntervalPolicy::Skip);
    }

    /// Collects the names of spans opened while it is the active subscriber.
    #[derive(Clone, Default)]
    struct SpanNames(std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanNames {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            self.0.lock().unwrap().push(attrs.metadata().name());
        }
    }

    #[test]
    fn every_tick_opens_a_span() {
        use tracing_subscriber::layer::SubscriberExt;

        let names = SpanNames::default();
        let subscriber = tracing_subscriber::registry().with(names.clone());
        let (mut control, _act) = build(IntervalPolicy::Skip, 5);

        tracing::subscriber::with_default(subscriber, || {
            control.tick(100.0, 80.0, 1.0).unwrap();
            control.tick(100.0, 80.0, 0.0).unwrap();
        });
        assert_eq!(*names.0.lock().unwrap(), vec!["tick", "tick"]);
    }
}
