//! In-process simulated drivers for running control loops without hardware.
//!
//! - [`SimActuator`] records every applied control value.
//! - [`SimSensor`] returns whatever value the test last stored in it.
//! - [`SimHeater`] is a first-order thermal plant: the actuator half sets
//!   heater power, [`SimHeater::thermometer`] hands out the sensor half.
//!
//! All simulated drivers are cheap `Clone` handles over shared state, so a
//! test can keep one handle for inspection while the control loop owns
//! another.
//!
//! # Example
//!
//! ```rust
//! use pidloop_hal::actuator::Actuator;
//! use pidloop_hal::sim::{PlantParams, SimHeater};
//!
//! let mut heater = SimHeater::new("oven_heater", PlantParams::default());
//! heater.apply(50.0).expect("sim heater never faults on finite input");
//! heater.advance(10.0).unwrap();
//! assert!(heater.temperature() > PlantParams::default().ambient);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use pidloop_types::LoopError;
use tracing::debug;

use crate::actuator::Actuator;
use crate::sensor::Sensor;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Recording actuator
// ────────────────────────────────────────────────────────────────────────────

/// A simulated actuator that records every applied value.  Always succeeds.
#[derive(Clone)]
pub struct SimActuator {
    id: String,
    applied: Arc<Mutex<Vec<f32>>>,
}

impl SimActuator {
    /// Create a new simulated actuator with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            applied: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every value applied so far, oldest first.
    pub fn applied(&self) -> Vec<f32> {
        lock(&self.applied).clone()
    }
}

impl Actuator for SimActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, control: f32) -> Result<(), LoopError> {
        lock(&self.applied).push(control);
        Ok(())
    }

    fn last_applied(&self) -> f32 {
        lock(&self.applied).last().copied().unwrap_or(0.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Settable sensor
// ────────────────────────────────────────────────────────────────────────────

/// A simulated sensor returning a value set from the outside.
#[derive(Clone)]
pub struct SimSensor {
    id: String,
    value: Arc<Mutex<f32>>,
}

impl SimSensor {
    pub fn new(id: impl Into<String>, initial: f32) -> Self {
        Self {
            id: id.into(),
            value: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set(&self, value: f32) {
        *lock(&self.value) = value;
    }
}

impl Sensor for SimSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&mut self) -> Result<f32, LoopError> {
        Ok(*lock(&self.value))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Thermal plant
// ────────────────────────────────────────────────────────────────────────────

/// Parameters of the first-order thermal model
/// `dT/dt = (ambient - T) / time_constant + heater_gain * power`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantParams {
    /// Ambient temperature the plant relaxes to with the heater off.
    pub ambient: f32,
    /// Thermal time constant, in seconds.
    pub time_constant: f32,
    /// Degrees per second contributed by one unit of heater power.
    pub heater_gain: f32,
    /// Upper bound of heater power; applied power is clamped to `[0, max_power]`.
    pub max_power: f32,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            ambient: 20.0,
            time_constant: 30.0,
            heater_gain: 0.05,
            max_power: 100.0,
        }
    }
}

impl PlantParams {
    /// Temperature the plant settles at for a constant `power`.
    pub fn steady_state(&self, power: f32) -> f32 {
        self.ambient + self.heater_gain * power.clamp(0.0, self.max_power) * self.time_constant
    }
}

#[derive(Debug)]
struct PlantState {
    temperature: f32,
    power: f32,
}

/// A simulated resistive heater driving a first-order thermal mass.
///
/// The heater is the actuator half; call [`SimHeater::thermometer`] for a
/// [`Sensor`] reading the same plant.
#[derive(Clone)]
pub struct SimHeater {
    id: String,
    params: PlantParams,
    state: Arc<Mutex<PlantState>>,
}

impl SimHeater {
    /// Create a heater whose plant starts at ambient temperature.
    pub fn new(id: impl Into<String>, params: PlantParams) -> Self {
        Self {
            id: id.into(),
            params,
            state: Arc::new(Mutex::new(PlantState {
                temperature: params.ambient,
                power: 0.0,
            })),
        }
    }

    pub fn params(&self) -> PlantParams {
        self.params
    }

    pub fn temperature(&self) -> f32 {
        lock(&self.state).temperature
    }

    pub fn power(&self) -> f32 {
        lock(&self.state).power
    }

    /// Integrate the plant forward by `dt` seconds.
    ///
    /// Power is constant over the step, so the model is solved in closed form:
    /// `T(dt) = T_ss + (T - T_ss) * exp(-dt / time_constant)`.  A zero `dt` is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidInterval`] if `dt` is negative or not
    /// finite; the plant is left untouched.
    pub fn advance(&self, dt: f32) -> Result<(), LoopError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(LoopError::InvalidInterval(dt));
        }
        let mut state = lock(&self.state);
        let settled = self.params.steady_state(state.power);
        let decay = (-dt / self.params.time_constant).exp();
        state.temperature = settled + (state.temperature - settled) * decay;
        Ok(())
    }

    /// A sensor over this plant that advances the model by the wall-clock
    /// time elapsed between reads, multiplied by `time_scale`.
    pub fn thermometer(&self, time_scale: f32) -> SimThermometer {
        SimThermometer {
            id: format!("{}_thermometer", self.id),
            heater: self.clone(),
            time_scale,
            last_read: None,
        }
    }
}

impl Actuator for SimHeater {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, control: f32) -> Result<(), LoopError> {
        if !control.is_finite() {
            return Err(LoopError::HardwareFault {
                component: self.id.clone(),
                details: format!("refusing non-finite power command {control}"),
            });
        }
        let power = control.clamp(0.0, self.params.max_power);
        if power != control {
            debug!(heater = %self.id, requested = control, applied = power, "heater power saturated");
        }
        lock(&self.state).power = power;
        Ok(())
    }

    fn last_applied(&self) -> f32 {
        self.power()
    }
}

/// Sensor half of a [`SimHeater`].
pub struct SimThermometer {
    id: String,
    heater: SimHeater,
    time_scale: f32,
    last_read: Option<Instant>,
}

impl Sensor for SimThermometer {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&mut self) -> Result<f32, LoopError> {
        let now = Instant::now();
        if let Some(prev) = self.last_read {
            let elapsed = now.duration_since(prev).as_secs_f32();
            self.heater
                .advance(elapsed * self.time_scale)
                .map_err(|e| LoopError::HardwareFault {
                    component: self.id.clone(),
                    details: e.to_string(),
                })?;
        }
        self.last_read = Some(now);
        Ok(self.heater.temperature())
    }
}
