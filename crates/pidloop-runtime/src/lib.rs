//! `pidloop-runtime` – running control loops.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: binds a
//!   [`PidController`][pidloop_hal::PidController] to the
//!   [`Actuator`][pidloop_hal::Actuator] it drives and decides what happens
//!   to rejected samples ([`IntervalPolicy`][control_loop::IntervalPolicy]).
//! - [`reject_guard`] – [`RejectGuard`][reject_guard::RejectGuard]: halts a
//!   loop that keeps receiving unusable samples.
//! - [`scheduler`] – [`run`][scheduler::run]: ticks a loop from a `tokio`
//!   interval, measuring `dt` between ticks.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod control_loop;
pub mod reject_guard;
pub mod scheduler;
pub mod telemetry;

pub use control_loop::{ControlLoop, ControlLoopConfig, IntervalPolicy, TickOutcome};
pub use reject_guard::RejectGuard;
pub use scheduler::{RunSummary, SchedulerConfig, StopReason};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
