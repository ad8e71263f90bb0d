//! Configuration file – reads/writes `~/.tilenav/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tilenav_drive::DriveConfig;
use tilenav_perception::{DetectionConfig, RobotDimensions, SolverConfig, WebCamDescriptor};
use tilenav_types::{HoughParameters, NavError};

/// Edge camera mounting.  The image is assumed to cover an axis-aligned
/// floor rectangle given by its top-left and bottom-right corners in robot
/// inches (+x right, +y forward).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub top_left: (f64, f64),
    pub bottom_right: (f64, f64),
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            id: "edge_camera".to_string(),
            width: 320,
            height: 240,
            top_left: (8.0, 6.0),
            bottom_right: (24.0, -6.0),
        }
    }
}

impl CameraConfig {
    pub fn descriptor(&self) -> WebCamDescriptor {
        WebCamDescriptor::rectangle(self.width, self.height, self.top_left, self.bottom_right)
    }
}

/// Optional Hough overrides.  Unset bands keep the values derived from the
/// camera's pixels per inch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HoughConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal: Option<HoughParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical: Option<HoughParameters>,
}

/// Simulated chassis and the error between where the robot really starts
/// and where the pose estimate assumes it starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Wheel ticks per control period at full power.
    pub ticks_per_step: f64,
    /// Chassis yaw (degrees) per tick of left/right wheel difference.
    pub turn_rate: f64,
    /// True start position offset to the right, in inches.
    pub start_offset: f64,
    /// True start heading offset, degrees counter-clockwise.
    pub start_skew: f64,
    /// Camera frame period in milliseconds.
    pub frame_period_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks_per_step: 40.0,
            turn_rate: 0.05,
            start_offset: 2.0,
            start_skew: 3.0,
            frame_period_ms: 50,
        }
    }
}

/// Persisted configuration stored in `~/.tilenav/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub drive: DriveConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub hough: HoughConfig,

    #[serde(default)]
    pub solver: SolverConfig,

    #[serde(default)]
    pub robot: RobotDimensions,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub sim: SimConfig,
}

/// Return the path to `~/.tilenav/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".tilenav").join("config.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
///
/// # Errors
///
/// [`NavError::Io`] if the file cannot be read, [`NavError::Config`] if it
/// is not valid TOML for [`Config`].
pub fn load_from(path: &Path) -> Result<Option<Config>, NavError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| NavError::Io(format!("failed to read config at {}: {e}", path.display())))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| NavError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `TILENAV_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TILENAV_TICKS_PER_TILE` | `drive.ticks_per_tile` |
/// | `TILENAV_MIN_POWER` | `drive.min_power` |
/// | `TILENAV_CONTROL_PERIOD_MS` | `drive.control_period_ms` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |name| std::env::var(name).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("TILENAV_TICKS_PER_TILE")
        && let Ok(ticks) = v.parse::<f64>()
    {
        cfg.drive.ticks_per_tile = ticks;
    }
    if let Some(v) = lookup("TILENAV_MIN_POWER")
        && let Ok(power) = v.parse::<f64>()
    {
        cfg.drive.min_power = power;
    }
    if let Some(v) = lookup("TILENAV_CONTROL_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.drive.control_period_ms = ms;
    }
}

/// Save the config to `path`, creating the parent directory if necessary.
///
/// # Errors
///
/// [`NavError::Io`] on any filesystem failure.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), NavError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| NavError::Io(format!("failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| NavError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| NavError::Io(format!("failed to write config at {}: {e}", path.display())))
}
