//! `pidloop` – runs a PID loop against a simulated heater.
//!
//! 1. Loads `~/.pidloop/config.toml` (or the path given as the first
//!    argument); writes the defaults there on first run.
//! 2. Builds a [`SimHeater`] plant, its thermometer and a [`ControlLoop`].
//! 3. Ticks the loop on a `tokio` interval, printing progress every ten ticks.
//! 4. Stops on **Ctrl-C** or after `max_ticks` and prints a summary.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use pidloop_hal::SimHeater;
use pidloop_runtime::{ControlLoop, RunSummary, StopReason, TickOutcome, scheduler};
use pidloop_types::LoopError;
use tracing::{error, warn};

const PROGRESS_EVERY: u64 = 10;

fn main() -> ExitCode {
    // Console logging (RUST_LOG, PIDLOOP_LOG_FORMAT=json) plus optional OTLP
    // export.  User-facing output below stays on println!.
    let telemetry = pidloop_runtime::init_tracing("pidloop");

    print_banner();
    if telemetry.is_exporting() {
        println!("  {}", "Exporting spans over OTLP.".dimmed());
    }

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after this tick …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the loop will only stop at max_ticks");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::config_path);

    let cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save_to(&cfg, &path) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cfg, &shutdown) {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "control loop stopped");
            println!("\n  {} {}", "✗".red().bold(), e.to_string().red());
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: &config::Config, shutdown: &AtomicBool) -> Result<RunSummary, LoopError> {
    let control_config = cfg.control_config()?;
    let scheduler_config = cfg.scheduler_config()?;
    let plant = SimHeater::new("heater", cfg.plant_params()?);
    let mut thermometer = plant.thermometer(cfg.time_scale);
    let mut control = ControlLoop::new(control_config, Box::new(plant.clone()))?;

    println!();
    println!(
        "  Loop {}  setpoint {}  gains kp={} ki={} kd={}  period {} ms",
        cfg.loop_id.bold(),
        format!("{:.1}", cfg.setpoint).bold(),
        cfg.gains.kp,
        cfg.gains.ki,
        cfg.gains.kd,
        cfg.period_ms
    );
    println!();

    // Current-thread runtime: the scheduler is a single task and the OTLP
    // exporter, when enabled, is synchronous.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| LoopError::Config(format!("failed to start runtime: {e}")))?;

    runtime.block_on(scheduler::run(
        &mut control,
        &mut thermometer,
        cfg.setpoint,
        &scheduler_config,
        shutdown,
        |tick, outcome| print_progress(tick, outcome, &plant),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_progress(tick: u64, outcome: &TickOutcome, plant: &SimHeater) {
    match outcome {
        TickOutcome::Applied(sample) if tick % PROGRESS_EVERY == 0 => {
            println!(
                "  {} {:>6}  temp {:>7.2}  err {:>+7.2}  P {:>+7.2}  I {:>+7.2}  D {:>+7.2}  → {:>6.2}",
                sample.timestamp.format("%H:%M:%S").to_string().dimmed(),
                tick,
                sample.measurement,
                sample.target - sample.measurement,
                sample.proportional,
                sample.integral,
                sample.derivative,
                sample.output.to_string().bold(),
            );
        }
        TickOutcome::Applied(_) => {}
        TickOutcome::Held { output, reason } => println!(
            "  {} {:>6}  holding {:.2} ({})",
            "⚠".yellow(),
            tick,
            output,
            reason.to_string().yellow()
        ),
        TickOutcome::Skipped { reason } => println!(
            "  {} {:>6}  skipped ({}) temp {:.2}",
            "⚠".yellow(),
            tick,
            reason.to_string().yellow(),
            plant.temperature()
        ),
    }
}

fn print_summary(summary: &RunSummary) {
    let stop = match summary.stop {
        StopReason::Shutdown => "shutdown requested",
        StopReason::TickLimit => "tick limit reached",
    };
    println!();
    println!("  {} Stopped: {}", "✓".green().bold(), stop);
    println!(
        "  {} ticks, {} applied, {} rejected",
        summary.ticks, summary.applied, summary.rejected
    );
    if let Some(sample) = &summary.last_sample {
        println!(
            "  Last: temp {:.2}  target {:.2}  output {:.2}",
            sample.measurement, sample.target, sample.output
        );
    }
    println!();
}

fn print_banner() {
    println!();
    println!("{}", r#"       _     ____                "#.bold().cyan());
    println!("{}", r#"  ___ (_)___/ / /__  ___  ___    "#.bold().cyan());
    println!("{}", r#" / _ \/ / _  / / _ \/ _ \/ _ \   "#.bold().cyan());
    println!("{}", r#"/ .__/_/\_,_/_/\___/\___/ .__/   "#.bold().cyan());
    println!("{}", r#"/_/                    /_/       "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "pidloop".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  PID control loop on a simulated heater");
    println!();
}
