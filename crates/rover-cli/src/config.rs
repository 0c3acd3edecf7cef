//! Configuration Vault – reads/writes `~/.rover/config.toml`.

use rover_middleware::{EstimatorConfig, WatchdogConfig};
use rover_perception::{FusionConfig, OdometryTarget};
use rover_types::VehicleState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Persisted estimator configuration stored in `~/.rover/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Speed magnitude (m/s) below which the vehicle counts as stationary.
    #[serde(default = "default_standstill_speed")]
    pub standstill_speed: f64,

    /// Where odometry-integrated position is written (`raw_only` or `fused`).
    #[serde(default)]
    pub odometry_target: OdometryTarget,

    /// Yaw magnitude (degrees) above which a diagnostic is reported.
    #[serde(default = "default_yaw_warn_limit")]
    pub yaw_warn_limit: f64,

    /// Distance between the axles (m).
    #[serde(default = "default_axis_distance")]
    pub axis_distance: f64,

    /// Mechanical steering limit (degrees).
    #[serde(default = "default_max_steering_angle")]
    pub max_steering_angle: f64,

    #[serde(default = "default_gnss_timeout_ms")]
    pub gnss_timeout_ms: u64,

    #[serde(default = "default_imu_timeout_ms")]
    pub imu_timeout_ms: u64,

    #[serde(default = "default_odometry_timeout_ms")]
    pub odometry_timeout_ms: u64,

    /// Capacity of every event-bus topic and of the estimator inbox.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

fn default_standstill_speed() -> f64 {
    0.05
}
fn default_yaw_warn_limit() -> f64 {
    360.0
}
fn default_axis_distance() -> f64 {
    0.5
}
fn default_max_steering_angle() -> f64 {
    30.0
}
fn default_gnss_timeout_ms() -> u64 {
    2000
}
fn default_imu_timeout_ms() -> u64 {
    500
}
fn default_odometry_timeout_ms() -> u64 {
    500
}
fn default_bus_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            standstill_speed: default_standstill_speed(),
            odometry_target: OdometryTarget::default(),
            yaw_warn_limit: default_yaw_warn_limit(),
            axis_distance: default_axis_distance(),
            max_steering_angle: default_max_steering_angle(),
            gnss_timeout_ms: default_gnss_timeout_ms(),
            imu_timeout_ms: default_imu_timeout_ms(),
            odometry_timeout_ms: default_odometry_timeout_ms(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl Config {
    pub fn fusion(&self) -> FusionConfig {
        FusionConfig {
            standstill_speed: self.standstill_speed,
            odometry_target: self.odometry_target,
            yaw_warn_limit: self.yaw_warn_limit,
        }
    }

    /// Capacity for bus topics and the estimator inbox.  Channels cannot be
    /// zero-sized, so a configured `0` means `1`.
    pub fn bus_capacity(&self) -> usize {
        self.bus_capacity.max(1)
    }

    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            inbox_capacity: self.bus_capacity(),
            watchdog: WatchdogConfig {
                gnss_timeout: Duration::from_millis(self.gnss_timeout_ms),
                imu_timeout: Duration::from_millis(self.imu_timeout_ms),
                odometry_timeout: Duration::from_millis(self.odometry_timeout_ms),
            },
        }
    }

    /// Fresh vehicle state with this configuration's steering geometry.
    pub fn vehicle_state(&self) -> VehicleState {
        VehicleState::new(self.axis_distance, self.max_steering_angle)
    }
}

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
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

/// The effective configuration: the saved file when present, otherwise the
/// defaults, with environment overrides applied either way.
pub fn effective() -> Result<Config, String> {
    match load()? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_STANDSTILL_SPEED` | `standstill_speed` |
/// | `ROVER_ODOMETRY_TARGET` | `odometry_target` |
/// | `ROVER_BUS_CAPACITY` | `bus_capacity` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVER_STANDSTILL_SPEED")
        && let Ok(speed) = v.parse::<f64>()
        && speed.is_finite()
    {
        cfg.standstill_speed = speed.abs();
    }
    if let Ok(v) = std::env::var("ROVER_ODOMETRY_TARGET")
        && let Ok(target) = v.parse::<OdometryTarget>()
    {
        cfg.odometry_target = target;
    }
    if let Ok(v) = std::env::var("ROVER_BUS_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
        && capacity > 0
    {
        cfg.bus_capacity = capacity;
    }
}

/// Save the config to disk, creating `~/.rover/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
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
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
