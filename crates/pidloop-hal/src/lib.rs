//! `pidloop-hal` – control law and hardware seams.
//!
//! # Modules
//!
//! - [`pid`] – [`PidController`][pid::PidController]: the PID update law over
//!   explicit, exclusively owned state, with configurable output saturation
//!   and integral anti-windup.
//! - [`actuator`] / [`sensor`] – the traits a control loop drives and reads.
//! - [`sim`] – simulated drivers (recording actuator, settable sensor, a
//!   first-order heater plant) for headless runs and tests.
//! - [`panel`] – table-driven command sequencing for ILI9486-class display
//!   controllers over an abstract [`PanelBus`][panel::PanelBus].

pub mod actuator;
pub mod panel;
pub mod pid;
pub mod sensor;
pub mod sim;

pub use actuator::Actuator;
pub use panel::{InitStep, Panel, PanelBus, Window};
pub use pid::{PidController, PidTerms};
pub use sensor::Sensor;
pub use sim::{PlantParams, SimActuator, SimHeater, SimSensor, SimThermometer};
