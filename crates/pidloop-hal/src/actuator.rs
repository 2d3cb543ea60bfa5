//! Generic `Actuator` trait for anything that turns a control value into a
//! physical effect: heater PWM duty, motor drive, valve position, backlight
//! level, …
//!
//! The controller in [`crate::pid`] only ever returns a number; the control
//! loop hands that number to an `Actuator`.  Drivers can therefore be swapped
//! without touching the control law.

use pidloop_types::LoopError;

/// A hardware output driven by a scalar control value.
pub trait Actuator: Send {
    /// Stable identifier for this actuator, e.g. `"oven_heater"`.
    fn id(&self) -> &str;

    /// Apply `control` to the hardware.
    ///
    /// Drivers are free to saturate the value to their physical range.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::HardwareFault`] if the command cannot be applied
    /// (e.g. the driver is in a fault state or the bus transfer failed).
    fn apply(&mut self, control: f32) -> Result<(), LoopError>;

    /// Return the most recently applied value, after any driver-side
    /// saturation.
    fn last_applied(&self) -> f32;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process actuator used only for tests.
    struct MockActuator {
        id: String,
        value: f32,
        faulted: bool,
    }

    impl MockActuator {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                value: 0.0,
                faulted: false,
            }
        }
    }

    impl Actuator for MockActuator {
        fn id(&self) -> &str {
            &self.id
        }

        fn apply(&mut self, control: f32) -> Result<(), LoopError> {
            if self.faulted {
                return Err(LoopError::HardwareFault {
                    component: self.id.clone(),
                    details: "driver latched a fault".to_string(),
                });
            }
            self.value = control;
            Ok(())
        }

        fn last_applied(&self) -> f32 {
            self.value
        }
    }

    #[test]
    fn mock_actuator_apply_and_read_back() {
        let mut act = MockActuator::new("fan");
        assert_eq!(act.id(), "fan");
        assert_eq!(act.last_applied(), 0.0);

        act.apply(0.75).unwrap();
        assert_eq!(act.last_applied(), 0.75);
    }

    #[test]
    fn faulted_actuator_keeps_previous_value() {
        let mut act = MockActuator::new("fan");
        act.apply(0.5).unwrap();
        act.faulted = true;
        assert!(matches!(act.apply(1.0), Err(LoopError::HardwareFault { .. })));
        assert_eq!(act.last_applied(), 0.5);
    }
}
