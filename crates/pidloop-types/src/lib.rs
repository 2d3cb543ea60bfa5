use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Proportional, integral and derivative gains of a single control loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Gains {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }

    /// Reject any non-finite gain, naming the first offender.
    pub fn validate(&self) -> Result<(), LoopError> {
        for (name, value) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)] {
            if !value.is_finite() {
                return Err(LoopError::InvalidGain {
                    name: name.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Closed interval `[min, max]` used for output saturation and anti-windup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min: f32,
    pub max: f32,
}

impl Limits {
    /// No clamping at all.
    pub const UNBOUNDED: Limits = Limits {
        min: f32::NEG_INFINITY,
        max: f32::INFINITY,
    };

    /// Build a validated interval.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidLimits`] when either bound is NaN or
    /// `min > max`.
    pub fn new(min: f32, max: f32) -> Result<Self, LoopError> {
        let limits = Self { min, max };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> Result<(), LoopError> {
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(LoopError::InvalidLimits {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Clamp `value` into the interval.  Only call on validated limits.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.min == f32::NEG_INFINITY && self.max == f32::INFINITY
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// Which signal the derivative term differentiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivativeMode {
    /// `-(measurement - prev_measurement) / dt`: no kick on setpoint steps.
    #[default]
    OnMeasurement,
    /// `(error - prev_error) / dt`: follows setpoint changes, kicks on steps.
    OnError,
}

/// Telemetry record of one accepted controller update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSample {
    pub timestamp: DateTime<Utc>,
    /// e.g. `"oven_heater"`
    pub loop_id: String,
    pub target: f32,
    pub measurement: f32,
    pub dt: f32,
    pub proportional: f32,
    pub integral: f32,
    pub derivative: f32,
    /// Output after saturation, as handed to the actuator.
    pub output: f32,
}

/// Error type shared by the controller, the drivers and the loop runtime.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoopError {
    #[error("Invalid gain {name}: {value} is not finite")]
    InvalidGain { name: String, value: f32 },

    #[error("Invalid sampling interval: dt = {0} (must be finite and > 0)")]
    InvalidInterval(f32),

    #[error("Invalid limits: [{min}, {max}]")]
    InvalidLimits { min: f32, max: f32 },

    #[error("Non-finite {what}: {value}")]
    NonFiniteInput { what: String, value: f32 },

    #[error("Invalid addressing window ({x0},{y0})..({x1},{y1})")]
    InvalidWindow { x0: u16, y0: u16, x1: u16, y1: u16 },

    #[error("Pixel buffer holds {actual} pixels, window needs {expected}")]
    PixelCount { expected: u32, actual: usize },

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Control loop halted after {consecutive_rejects} consecutive rejected samples")]
    Halted { consecutive_rejects: usize },

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl LoopError {
    /// `true` for errors that reject a single sample without implying a
    /// fault in the loop's hardware or configuration.
    pub fn is_rejected_sample(&self) -> bool {
        matches!(
            self,
            LoopError::InvalidInterval(_) | LoopError::NonFiniteInput { .. }
        )
    }
}
