//! Closed-loop behaviour of a `ControlLoop` driving the simulated heater.

use pidloop_hal::{PlantParams, SimHeater};
use pidloop_runtime::{ControlLoop, ControlLoopConfig, IntervalPolicy, TickOutcome};
use pidloop_types::{Gains, Limits};

const SETPOINT: f32 = 60.0;
const DT: f32 = 0.5;

fn heater_loop(integral_limits: Limits) -> (ControlLoop, SimHeater) {
    let heater = SimHeater::new("oven_heater", PlantParams::default());
    let config = ControlLoopConfig {
        id: "oven".to_string(),
        gains: Gains::new(2.0, 0.5, 0.1),
        output_limits: Limits::new(0.0, 100.0).unwrap(),
        integral_limits,
        interval_policy: IntervalPolicy::HoldLast,
        ..ControlLoopConfig::default()
    };
    let control = ControlLoop::new(config, Box::new(heater.clone())).unwrap();
    (control, heater)
}

/// Run `ticks` steps and return the peak temperature.
fn drive(control: &mut ControlLoop, heater: &SimHeater, ticks: usize) -> f32 {
    let mut peak = heater.temperature();
    for _ in 0..ticks {
        control.tick(SETPOINT, heater.temperature(), DT).unwrap();
        heater.advance(DT).unwrap();
        peak = peak.max(heater.temperature());
    }
    peak
}

#[test]
fn heater_settles_at_setpoint() {
    let (mut control, heater) = heater_loop(Limits::UNBOUNDED);
    let peak = drive(&mut control, &heater, 1500);

    assert!((heater.temperature() - SETPOINT).abs() < 0.5, "final {}", heater.temperature());
    assert!(peak < 80.0, "overshoot too large: {peak}");

    // Holding 60 °C needs (60 - 20) / (0.05 * 30) ≈ 26.7 units of power.
    let expected_power = (SETPOINT - 20.0) / (0.05 * 30.0);
    assert!((heater.power() - expected_power).abs() < 1.0);
}

#[test]
fn anti_windup_reduces_overshoot() {
    let (mut unbounded, heater_a) = heater_loop(Limits::UNBOUNDED);
    let (mut clamped, heater_b) = heater_loop(Limits::new(0.0, 60.0).unwrap());

    let peak_unbounded = drive(&mut unbounded, &heater_a, 1500);
    let peak_clamped = drive(&mut clamped, &heater_b, 1500);

    assert!(peak_clamped < peak_unbounded);
    assert!((heater_b.temperature() - SETPOINT).abs() < 0.5);
    assert!(clamped.controller().integral() <= 60.0);
}

#[test]
fn stalled_clock_holds_heater_power() {
    let (mut control, heater) = heater_loop(Limits::UNBOUNDED);
    drive(&mut control, &heater, 10);
    let power = heater.power();

    let outcome = control.tick(SETPOINT, heater.temperature(), 0.0).unwrap();
    assert!(matches!(outcome, TickOutcome::Held { .. }));
    assert_eq!(heater.power(), power);
}

#[test]
fn independent_loops_do_not_share_state() {
    let (mut a, heater_a) = heater_loop(Limits::UNBOUNDED);
    let (b, _heater_b) = heater_loop(Limits::UNBOUNDED);

    drive(&mut a, &heater_a, 20);
    assert!(a.controller().integral() > 0.0);
    assert_eq!(b.controller().integral(), 0.0);
    assert_eq!(b.last_output(), None);
}
