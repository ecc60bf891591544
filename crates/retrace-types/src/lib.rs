//! `retrace-types` – shared message and value types.
//!
//! Everything that crosses a crate boundary lives here: the geometric
//! primitives carried on the signal bus ([`WrenchStamped`],
//! [`TwistStamped`]), the compliance status reported once per tick, the
//! run request/outcome pair exchanged with the caller, and the global
//! [`ReplayError`] enum spanning data faults, transform lookups,
//! configuration, and the designed early-termination paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Geometric primitives
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (f64 throughout; sensor data and trajectories are double
/// precision).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// A force vector plus a torque vector. Meaningless without the frame
/// carried by the enclosing [`WrenchStamped`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Wrench {
    pub force: Vec3,
    pub torque: Vec3,
}

/// A [`Wrench`] tagged with the reference frame it is expressed in and the
/// time it was measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrenchStamped {
    /// Named reference frame, e.g. `"left_ft_sensor"`.
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
    pub wrench: Wrench,
}

impl WrenchStamped {
    pub fn new(frame_id: impl Into<String>, wrench: Wrench) -> Self {
        Self {
            frame_id: frame_id.into(),
            stamp: Utc::now(),
            wrench,
        }
    }
}

/// A 6-DOF velocity: linear x/y/z plus angular roll/pitch/yaw.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist {
    pub linear: Vec3,
    pub angular: Vec3,
}

impl Twist {
    /// Build from components in (x, y, z, roll, pitch, yaw) order — the
    /// fixed column order of trajectory files and telemetry rows.
    pub fn from_array(v: [f64; 6]) -> Self {
        Self {
            linear: Vec3::new(v[0], v[1], v[2]),
            angular: Vec3::new(v[3], v[4], v[5]),
        }
    }

    /// Components in (x, y, z, roll, pitch, yaw) order.
    pub fn to_array(self) -> [f64; 6] {
        [
            self.linear.x,
            self.linear.y,
            self.linear.z,
            self.angular.x,
            self.angular.y,
            self.angular.z,
        ]
    }
}

/// A [`Twist`] tagged with the command frame it applies in and the time it
/// was issued. One of these is published per arm per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwistStamped {
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
    pub twist: Twist,
}

impl TwistStamped {
    pub fn new(frame_id: impl Into<String>, twist: Twist) -> Self {
        Self {
            frame_id: frame_id.into(),
            stamp: Utc::now(),
            twist,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Compliance status
// ────────────────────────────────────────────────────────────────────────────

/// Per-arm status reported by the compliance engine once per tick.
///
/// `Met` and `Violation` both latch the run-scoped force/torque-limit flag
/// in the scheduler; they differ only in what they mean to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceStatus {
    /// The end-condition wrench has not been reached; compliant motion
    /// continues. This is the initial state for every arm.
    NotMet,
    /// The end-condition wrench was reached — the intended stopping point.
    Met,
    /// A force/torque safety limit was exceeded.
    Violation,
}

// ────────────────────────────────────────────────────────────────────────────
// Run request / outcome
// ────────────────────────────────────────────────────────────────────────────

/// A single replay request: names the trajectory data set to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub id: Uuid,
    /// Trajectory file prefix; arm `i` loads `{prefix}_arm{i}_processed.csv`.
    pub file_prefix: String,
}

impl RunRequest {
    pub fn new(file_prefix: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_prefix: file_prefix.into(),
        }
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Every trajectory sample was replayed.
    Completed,
    /// The external halt channel fired.
    Halted,
    /// A compliance engine reported `Met` or `Violation` on a prior tick.
    ForceTorqueLimit,
    /// The caller requested cancellation.
    Cancelled,
    /// Process-level shutdown (e.g. ctrl-c).
    Shutdown,
}

impl StopReason {
    /// Only a fully replayed trajectory counts as success; every early
    /// stop, designed or not, maps to `false`.
    pub fn successful(self) -> bool {
        matches!(self, StopReason::Completed)
    }
}

/// The result reported to the caller for one [`RunRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub request_id: Uuid,
    pub successful: bool,
    pub reason: StopReason,
}

impl RunOutcome {
    pub fn new(request_id: Uuid, reason: StopReason) -> Self {
        Self {
            request_id,
            successful: reason.successful(),
            reason,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type spanning trajectory parsing, frame lookups,
/// configuration, and the designed early-termination paths.
///
/// `SafetyAbort` and `Cancelled` are not faults: they are expected
/// termination paths that still produce an unsuccessful [`RunOutcome`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplayError {
    #[error("trajectory data error in {file}: {details}")]
    DataFormat { file: String, details: String },

    #[error("no transform from '{source_frame}' to '{target_frame}' within {timeout_secs} s")]
    TransformUnavailable {
        source_frame: String,
        target_frame: String,
        timeout_secs: f64,
    },

    #[error("missing configuration parameter: {0}")]
    ConfigurationMissing(String),

    #[error("safety abort: {0}")]
    SafetyAbort(String),

    #[error("run cancelled by caller")]
    Cancelled,

    #[error("a run is already in flight; request rejected")]
    Busy,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("channel error: {0}")]
    Channel(String),
}
