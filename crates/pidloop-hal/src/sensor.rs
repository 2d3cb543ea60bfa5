//! Generic `Sensor` trait: the source of the measurement fed to the
//! controller on every tick.

use pidloop_types::LoopError;

/// A scalar measurement source (thermistor, encoder, pressure transducer, …).
pub trait Sensor: Send {
    /// Stable identifier for this sensor, e.g. `"oven_thermistor"`.
    fn id(&self) -> &str;

    /// Take one reading.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::HardwareFault`] if the sensor cannot be read.
    fn read(&mut self) -> Result<f32, LoopError>;
}
