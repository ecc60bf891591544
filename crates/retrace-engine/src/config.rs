//! Typed replay configuration loaded from a TOML file.
//!
//! Replaces side-effecting external parameter loading with a structured
//! interface: the file is deserialised into [`ReplayConfig`], validated,
//! and handed to the controller as a plain value.
//!
//! # Environment overrides
//!
//! | Variable | Config field |
//! |---|---|
//! | `RETRACE_DATA_DIR` | `data_dir` |
//! | `RETRACE_TELEMETRY_PATH` | `telemetry_path` |

use std::fs;
use std::path::{Path, PathBuf};

use retrace_types::ReplayError;
use serde::{Deserialize, Serialize};

/// Per-arm parameters. Frames and topics identify the arm to the outside
/// world; the compliance block is forwarded opaquely to the compliance
/// engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmConfig {
    /// Frame outgoing velocity commands are expressed in.
    pub command_frame: String,
    /// Native frame of the force/torque sensor readings.
    pub sensor_frame: String,
    /// Inbound wrench channel name.
    pub sensor_topic: String,
    /// Outbound velocity-command channel name.
    pub command_topic: String,
    /// Per-axis stiffness (x, y, z, roll, pitch, yaw).
    pub stiffness: [f64; 6],
    /// Wrench magnitude below which no correction is applied.
    pub deadband: f64,
    /// Per-axis wrench at which the run's end condition is met.
    pub end_condition_wrench: [f64; 6],
    /// Low-pass filter coefficient in [0, 1) for the wrench signal.
    pub filter_param: f64,
}

/// A static frame-graph edge supplied via configuration, for deployments
/// without a live transform stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTransform {
    pub parent_frame: String,
    pub child_frame: String,
    /// Translation (x, y, z) in metres.
    #[serde(default)]
    pub translation: [f64; 3],
    /// Unit quaternion (w, x, y, z). Defaults to identity.
    #[serde(default = "identity_rotation")]
    pub rotation: [f64; 4],
}

fn identity_rotation() -> [f64; 4] {
    [1.0, 0.0, 0.0, 0.0]
}

/// Full replay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Directory holding the `{prefix}_arm{i}_processed.csv` files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Telemetry log path, overwritten on every run.
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: PathBuf,

    /// One entry per arm, in arm-index order.
    #[serde(default)]
    pub arms: Vec<ArmConfig>,

    /// Optional static frame-graph edges.
    #[serde(default)]
    pub transforms: Vec<StaticTransform>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_telemetry_path() -> PathBuf {
    PathBuf::from("data/log/log.csv")
}

impl ReplayConfig {
    /// Number of configured arms.
    pub fn arm_count(&self) -> usize {
        self.arms.len()
    }

    /// Sensor topic names in arm-index order (sizes the signal bus).
    pub fn sensor_topics(&self) -> Vec<String> {
        self.arms.iter().map(|a| a.sensor_topic.clone()).collect()
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ReplayError::Io(format!("failed to read config at {}: {e}", path.display()))
        })?;
        let mut cfg: ReplayConfig = toml::from_str(&raw)
            .map_err(|e| ReplayError::ConfigurationMissing(e.to_string()))?;
        apply_env_overrides(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check invariants the rest of the engine relies on.
    ///
    /// # Errors
    ///
    /// [`ReplayError::ConfigurationMissing`] naming the offending field.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if self.arms.is_empty() {
            return Err(ReplayError::ConfigurationMissing("arms".to_string()));
        }
        for (i, arm) in self.arms.iter().enumerate() {
            for (field, value) in [
                ("command_frame", &arm.command_frame),
                ("sensor_frame", &arm.sensor_frame),
                ("sensor_topic", &arm.sensor_topic),
                ("command_topic", &arm.command_topic),
            ] {
                if value.is_empty() {
                    return Err(ReplayError::ConfigurationMissing(format!(
                        "arms[{i}].{field}"
                    )));
                }
            }
            if arm.stiffness.iter().any(|s| *s == 0.0) {
                return Err(ReplayError::ConfigurationMissing(format!(
                    "arms[{i}].stiffness components must be non-zero"
                )));
            }
            if !(0.0..1.0).contains(&arm.filter_param) {
                return Err(ReplayError::ConfigurationMissing(format!(
                    "arms[{i}].filter_param must be in [0, 1)"
                )));
            }
        }
        Ok(())
    }
}

/// Apply `RETRACE_*` environment variable overrides to `cfg`.
pub fn apply_env_overrides(cfg: &mut ReplayConfig) {
    if let Ok(v) = std::env::var("RETRACE_DATA_DIR") {
        cfg.data_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("RETRACE_TELEMETRY_PATH") {
        cfg.telemetry_path = PathBuf::from(v);
    }
}
