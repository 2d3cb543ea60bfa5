//! Loop configuration – reads/writes `~/.pidloop/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pidloop_hal::PlantParams;
use pidloop_runtime::{ControlLoopConfig, IntervalPolicy, SchedulerConfig};
use pidloop_types::{DerivativeMode, Gains, Limits, LoopError};
use serde::{Deserialize, Serialize};

/// Simulated heater parameters, mirrored from [`PlantParams`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantConfig {
    #[serde(default = "default_ambient")]
    pub ambient: f32,
    #[serde(default = "default_time_constant")]
    pub time_constant: f32,
    #[serde(default = "default_heater_gain")]
    pub heater_gain: f32,
    #[serde(default = "default_max_power")]
    pub max_power: f32,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            ambient: default_ambient(),
            time_constant: default_time_constant(),
            heater_gain: default_heater_gain(),
            max_power: default_max_power(),
        }
    }
}

impl From<&PlantConfig> for PlantParams {
    fn from(p: &PlantConfig) -> Self {
        PlantParams {
            ambient: p.ambient,
            time_constant: p.time_constant,
            heater_gain: p.heater_gain,
            max_power: p.max_power,
        }
    }
}

/// Persisted loop configuration stored in `~/.pidloop/config.toml`.
///
/// Table-valued fields (`gains`, `plant`) come last so the TOML output keeps
/// plain keys at the top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Identifier used in logs and telemetry.
    #[serde(default = "default_loop_id")]
    pub loop_id: String,

    /// Target temperature.
    #[serde(default = "default_setpoint")]
    pub setpoint: f32,

    /// Tick period in milliseconds.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Stop after this many ticks; `0` runs until Ctrl-C.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    #[serde(default = "default_output_min")]
    pub output_min: f32,
    #[serde(default = "default_output_max")]
    pub output_max: f32,

    /// Anti-windup bounds on the accumulated integral; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integral_min: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integral_max: Option<f32>,

    #[serde(default)]
    pub derivative_mode: DerivativeMode,

    #[serde(default)]
    pub interval_policy: IntervalPolicy,

    #[serde(default = "default_max_consecutive_rejects")]
    pub max_consecutive_rejects: usize,

    /// Plant seconds simulated per wall-clock second.
    #[serde(default = "default_time_scale")]
    pub time_scale: f32,

    #[serde(default = "default_gains")]
    pub gains: Gains,

    #[serde(default)]
    pub plant: PlantConfig,
}

fn default_loop_id() -> String {
    "oven".to_string()
}
fn default_setpoint() -> f32 {
    60.0
}
fn default_period_ms() -> u64 {
    100
}
fn default_max_ticks() -> u64 {
    600
}
fn default_output_min() -> f32 {
    0.0
}
fn default_output_max() -> f32 {
    100.0
}
fn default_max_consecutive_rejects() -> usize {
    5
}
fn default_time_scale() -> f32 {
    1.0
}
fn default_gains() -> Gains {
    Gains::new(2.0, 0.5, 0.1)
}
fn default_ambient() -> f32 {
    20.0
}
fn default_time_constant() -> f32 {
    30.0
}
fn default_heater_gain() -> f32 {
    0.05
}
fn default_max_power() -> f32 {
    100.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loop_id: default_loop_id(),
            setpoint: default_setpoint(),
            period_ms: default_period_ms(),
            max_ticks: default_max_ticks(),
            output_min: default_output_min(),
            output_max: default_output_max(),
            integral_min: None,
            integral_max: None,
            derivative_mode: DerivativeMode::default(),
            interval_policy: IntervalPolicy::default(),
            max_consecutive_rejects: default_max_consecutive_rejects(),
            time_scale: default_time_scale(),
            gains: default_gains(),
            plant: PlantConfig::default(),
        }
    }
}

impl Config {
    /// Build the [`ControlLoopConfig`], validating gains and limits.
    pub fn control_config(&self) -> Result<ControlLoopConfig, LoopError> {
        require("setpoint", self.setpoint, "finite", |v| v.is_finite())?;
        self.gains.validate()?;
        let output_limits = Limits::new(self.output_min, self.output_max)?;
        let integral_limits = Limits::new(
            self.integral_min.unwrap_or(f32::NEG_INFINITY),
            self.integral_max.unwrap_or(f32::INFINITY),
        )?;
        Ok(ControlLoopConfig {
            id: self.loop_id.clone(),
            gains: self.gains,
            output_limits,
            integral_limits,
            derivative_mode: self.derivative_mode,
            interval_policy: self.interval_policy,
            max_consecutive_rejects: self.max_consecutive_rejects,
        })
    }

    /// Build the [`SchedulerConfig`].
    pub fn scheduler_config(&self) -> Result<SchedulerConfig, LoopError> {
        if self.period_ms == 0 {
            return Err(LoopError::Config("period_ms must be > 0".to_string()));
        }
        Ok(SchedulerConfig {
            period: Duration::from_millis(self.period_ms),
            max_ticks: (self.max_ticks > 0).then_some(self.max_ticks),
        })
    }

    /// Build the simulated plant's [`PlantParams`].  `time_scale` is checked
    /// here too since it only drives the plant's clock.
    pub fn plant_params(&self) -> Result<PlantParams, LoopError> {
        let p = &self.plant;
        require("plant.ambient", p.ambient, "finite", |v| v.is_finite())?;
        require("plant.time_constant", p.time_constant, "> 0", |v| v.is_finite() && v > 0.0)?;
        require("plant.heater_gain", p.heater_gain, "finite", |v| v.is_finite())?;
        require("plant.max_power", p.max_power, ">= 0", |v| v.is_finite() && v >= 0.0)?;
        require("time_scale", self.time_scale, "> 0", |v| v.is_finite() && v > 0.0)?;
        Ok(PlantParams::from(p))
    }
}

fn require(key: &str, value: f32, rule: &str, ok: impl Fn(f32) -> bool) -> Result<(), LoopError> {
    if ok(value) {
        Ok(())
    } else {
        Err(LoopError::Config(format!("{key} must be {rule}, got {value}")))
    }
}

/// Return the path to `~/.pidloop/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".pidloop").join("config.toml")
}

/// Load the config from a specific path, applying environment overrides.
/// Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `PIDLOOP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PIDLOOP_SETPOINT` | `setpoint` |
/// | `PIDLOOP_PERIOD_MS` | `period_ms` |
/// | `PIDLOOP_MAX_TICKS` | `max_ticks` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PIDLOOP_SETPOINT")
        && let Ok(sp) = v.parse::<f32>()
    {
        cfg.setpoint = sp;
    }
    if let Ok(v) = std::env::var("PIDLOOP_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.period_ms = ms;
    }
    if let Ok(v) = std::env::var("PIDLOOP_MAX_TICKS")
        && let Ok(n) = v.parse::<u64>()
    {
        cfg.max_ticks = n;
    }
}

/// Save the config to a specific path, creating the parent directory.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.gains, Gains::new(2.0, 0.5, 0.1));
        assert_eq!(loaded.period_ms, 100);
        assert_eq!(loaded.interval_policy, IntervalPolicy::Skip);
        assert_eq!(loaded.plant, PlantConfig::default());
        assert!(loaded.integral_min.is_none());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "setpoint = 80.0\n\
             interval_policy = \"hold_last\"\n\
             derivative_mode = \"on_error\"\n\
             integral_max = 50.0\n\
             [gains]\nkp = 4.0\nki = 0.0\nkd = 0.0\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.gains.kp, 4.0);
        assert_eq!(cfg.interval_policy, IntervalPolicy::HoldLast);
        assert_eq!(cfg.derivative_mode, DerivativeMode::OnError);
        assert_eq!(cfg.output_max, 100.0);

        let control = cfg.control_config().unwrap();
        assert_eq!(control.integral_limits.max, 50.0);
        assert_eq!(control.integral_limits.min, f32::NEG_INFINITY);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "setpoint = \"hot\"").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_points_to_pidloop_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".pidloop"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn inverted_output_limits_are_rejected() {
        let cfg = Config {
            output_min: 10.0,
            output_max: 0.0,
            ..Config::default()
        };
        assert!(matches!(
            cfg.control_config(),
            Err(LoopError::InvalidLimits { .. })
        ));
    }

    #[test]
    fn zero_period_is_rejected_and_zero_ticks_means_unbounded() {
        let cfg = Config {
            period_ms: 0,
            ..Config::default()
        };
        assert!(matches!(cfg.scheduler_config(), Err(LoopError::Config(_))));

        let cfg = Config {
            max_ticks: 0,
            ..Config::default()
        };
        assert_eq!(cfg.scheduler_config().unwrap().max_ticks, None);
    }

    #[test]
    fn every_plant_field_and_time_scale_is_validated() {
        type Patch = fn(&mut Config);
        let cases: [(&str, Patch); 9] = [
            ("plant.ambient", |c| c.plant.ambient = f32::NAN),
            ("plant.ambient", |c| c.plant.ambient = f32::INFINITY),
            ("plant.time_constant", |c| c.plant.time_constant = 0.0),
            ("plant.heater_gain", |c| c.plant.heater_gain = f32::NAN),
            ("plant.heater_gain", |c| c.plant.heater_gain = f32::NEG_INFINITY),
            ("plant.max_power", |c| c.plant.max_power = -1.0),
            ("time_scale", |c| c.time_scale = 0.0),
            ("time_scale", |c| c.time_scale = f32::INFINITY),
            ("time_scale", |c| c.time_scale = f32::NAN),
        ];
        for (key, patch) in cases {
            let mut cfg = Config::default();
            patch(&mut cfg);
            match cfg.plant_params() {
                Err(LoopError::Config(msg)) => assert!(msg.starts_with(key), "{msg}"),
                other => panic!("{key}: expected config error, got {other:?}"),
            }
        }
        assert!(Config::default().plant_params().is_ok());
    }

    #[test]
    fn non_finite_values_from_toml_are_rejected() {
        let cfg: Config = toml::from_str("time_scale = inf\n[plant]\nambient = nan\n").unwrap();
        assert!(cfg.plant_params().is_err());

        let cfg: Config = toml::from_str("setpoint = nan").unwrap();
        assert!(matches!(cfg.control_config(), Err(LoopError::Config(_))));
    }

    // Every env-var touched here is only touched by this test, so there is no
    // cross-test race.
    #[test]
    fn apply_env_overrides_changes_fields_and_ignores_garbage() {
        // SAFETY: these PIDLOOP_* variables are read by no other test.
        unsafe {
            std::env::set_var("PIDLOOP_SETPOINT", "75.5");
            std::env::set_var("PIDLOOP_PERIOD_MS", "not-a-number");
            std::env::set_var("PIDLOOP_MAX_TICKS", "42");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.setpoint, 75.5);
        assert_eq!(cfg.period_ms, 100);
        assert_eq!(cfg.max_ticks, 42);
        unsafe {
            std::env::remove_var("PIDLOOP_SETPOINT");
            std::env::remove_var("PIDLOOP_PERIOD_MS");
            std::env::remove_var("PIDLOOP_MAX_TICKS");
        }
    }
}
