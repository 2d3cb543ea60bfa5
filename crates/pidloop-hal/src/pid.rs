//! PID (Proportional–Integral–Derivative) controller.
//!
//! The controller is a pure function over explicit state: the caller supplies
//! the target, the measurement and the elapsed time, and receives a control
//! value which it hands to an [`Actuator`][crate::actuator::Actuator].  The
//! controller never touches hardware itself.
//!
//! # Update law
//!
//! ```text
//! error     = target - measurement
//! P         = kp * error
//! integral += error * dt            (clamped to the integral limits)
//! I         = ki * integral
//! D         = kd * -(measurement - prev_measurement) / dt   (on measurement)
//!           = kd *  (error - prev_error) / dt               (on error)
//! output    = clamp(P + I + D, output limits)
//! ```
//!
//! The integral accumulates raw `error * dt`; the gain is applied afterwards,
//! so retuning `ki` rescales the accumulated history immediately.  The
//! derivative term is zero on the first update after construction or
//! [`reset`][PidController::reset], since there is no previous sample yet.
//!
//! # Example
//!
//! ```rust
//! use pidloop_hal::pid::PidController;
//! use pidloop_types::Gains;
//!
//! let mut pid = PidController::new(Gains::new(2.0, 0.5, 0.1)).unwrap();
//!
//! // error = 20 → P = 40, integral = 20 → I = 10, D = 0 on the first sample.
//! let output = pid.update(100.0, 80.0, 1.0).unwrap();
//! assert_eq!(output, 50.0);
//!
//! // A non-positive interval is rejected and leaves the state untouched.
//! assert!(pid.update(100.0, 80.0, 0.0).is_err());
//! assert_eq!(pid.integral(), 20.0);
//! ```

use pidloop_types::{DerivativeMode, Gains, Limits, LoopError};

/// The three terms (and the saturated output) of the most recent accepted
/// update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidTerms {
    pub proportional: f32,
    pub integral: f32,
    pub derivative: f32,
    pub output: f32,
}

/// A tunable PID controller for one closed loop.
///
/// Output saturation and integral anti-windup are both configuration and
/// default to unbounded; see [`PidController::set_output_limits`] and
/// [`PidController::set_integral_limits`].
#[derive(Debug, Clone)]
pub struct PidController {
    gains: Gains,
    integral: f32,
    prev_error: f32,
    prev_measurement: f32,
    /// `false` until the first accepted update after construction or reset.
    primed: bool,
    derivative_mode: DerivativeMode,
    output_limits: Limits,
    integral_limits: Limits,
    last_terms: Option<PidTerms>,
}

impl PidController {
    /// Create a new controller with all running terms zeroed.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidGain`] if any gain is NaN or infinite.
    /// Non-finite gains are rejected, never clamped.
    pub fn new(gains: Gains) -> Result<Self, LoopError> {
        gains.validate()?;
        Ok(Self {
            gains,
            integral: 0.0,
            prev_error: 0.0,
            prev_measurement: 0.0,
            primed: false,
            derivative_mode: DerivativeMode::default(),
            output_limits: Limits::UNBOUNDED,
            integral_limits: Limits::UNBOUNDED,
            last_terms: None,
        })
    }

    /// Builder form of [`set_output_limits`][Self::set_output_limits].
    pub fn with_output_limits(mut self, limits: Limits) -> Result<Self, LoopError> {
        self.set_output_limits(limits)?;
        Ok(self)
    }

    /// Builder form of [`set_integral_limits`][Self::set_integral_limits].
    pub fn with_integral_limits(mut self, limits: Limits) -> Result<Self, LoopError> {
        self.set_integral_limits(limits)?;
        Ok(self)
    }

    /// Builder form of [`set_derivative_mode`][Self::set_derivative_mode].
    pub fn with_derivative_mode(mut self, mode: DerivativeMode) -> Self {
        self.derivative_mode = mode;
        self
    }

    /// Clamp the controller output to `limits`.
    pub fn set_output_limits(&mut self, limits: Limits) -> Result<(), LoopError> {
        limits.validate()?;
        self.output_limits = limits;
        Ok(())
    }

    /// Clamp the accumulated integral (in error × time units) to `limits`.
    ///
    /// The current accumulator is clamped immediately.
    pub fn set_integral_limits(&mut self, limits: Limits) -> Result<(), LoopError> {
        limits.validate()?;
        self.integral_limits = limits;
        self.integral = limits.clamp(self.integral);
        Ok(())
    }

    /// Switch between derivative-on-measurement and derivative-on-error.
    pub fn set_derivative_mode(&mut self, mode: DerivativeMode) {
        self.derivative_mode = mode;
    }

    /// Replace the gains, keeping the running state.
    pub fn retune(&mut self, gains: Gains) -> Result<(), LoopError> {
        gains.validate()?;
        self.gains = gains;
        Ok(())
    }

    /// Replace the gains and zero the running state, as if freshly built.
    /// Limits and derivative mode are kept.
    pub fn reinitialize(&mut self, gains: Gains) -> Result<(), LoopError> {
        self.retune(gains)?;
        self.reset();
        Ok(())
    }

    /// Compute the next control value.
    ///
    /// - `target` – the setpoint, in the same units as `measurement`.
    /// - `measurement` – the current value of the process variable.
    /// - `dt` – time elapsed since the previous call (must be finite and > 0).
    ///
    /// # Errors
    ///
    /// - [`LoopError::InvalidInterval`] when `dt` is not a finite positive
    ///   number.
    /// - [`LoopError::NonFiniteInput`] when `target` or `measurement` is NaN
    ///   or infinite, or when finite inputs overflow the error, the integral
    ///   or one of the terms.
    ///
    /// A rejected sample leaves every piece of running state untouched.
    pub fn update(&mut self, target: f32, measurement: f32, dt: f32) -> Result<f32, LoopError> {
        if dt.is_nan() || dt.is_infinite() || dt <= 0.0 {
            return Err(LoopError::InvalidInterval(dt));
        }
        require_finite("target", target)?;
        require_finite("measurement", measurement)?;

        let error = target - measurement;
        require_finite("error", error)?;

        let proportional = self.gains.kp * error;
        require_finite("proportional term", proportional)?;

        let integral = self.integral_limits.clamp(self.integral + error * dt);
        require_finite("integral", integral)?;
        let integral_term = self.gains.ki * integral;
        require_finite("integral term", integral_term)?;

        let derivative = if self.primed {
            let rate = match self.derivative_mode {
                DerivativeMode::OnMeasurement => -(measurement - self.prev_measurement) / dt,
                DerivativeMode::OnError => (error - self.prev_error) / dt,
            };
            self.gains.kd * rate
        } else {
            0.0
        };
        require_finite("derivative term", derivative)?;

        let output = self
            .output_limits
            .clamp(proportional + integral_term + derivative);
        require_finite("output", output)?;

        // Everything below is committed only for a fully finite sample.

        self.integral = integral;
        self.prev_error = error;
        self.prev_measurement = measurement;
        self.primed = true;
        self.last_terms = Some(PidTerms {
            proportional,
            integral: integral_term,
            derivative,
            output,
        });

        Ok(output)
    }

    /// Zero the integral accumulator and the derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.prev_measurement = 0.0;
        self.primed = false;
        self.last_terms = None;
    }

    /// Current gains.
    pub fn gains(&self) -> Gains {
        self.gains
    }

    /// How the derivative term is computed.
    pub fn derivative_mode(&self) -> DerivativeMode {
        self.derivative_mode
    }

    /// Saturation bounds applied to the output.
    pub fn output_limits(&self) -> Limits {
        self.output_limits
    }

    /// Anti-windup bounds on the integral accumulator.
    pub fn integral_limits(&self) -> Limits {
        self.integral_limits
    }

    /// Accumulated `error * dt`, before the integral gain is applied.
    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Error of the last accepted update (`0.0` after reset).
    pub fn prev_error(&self) -> f32 {
        self.prev_error
    }

    /// Measurement of the last accepted update (`0.0` after reset).
    pub fn prev_measurement(&self) -> f32 {
        self.prev_measurement
    }

    /// Terms of the last accepted update, `None` before the first one.
    pub fn last_terms(&self) -> Option<PidTerms> {
        self.last_terms
    }
}

fn require_finite(what: &str, value: f32) -> Result<(), LoopError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(LoopError::NonFiniteInput {
            what: what.to_string(),
            value,
        })
    }
}
