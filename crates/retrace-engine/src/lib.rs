//! `retrace-engine` – the compliant replay core.
//!
//! Replays a recorded multi-arm 6-DOF velocity trajectory at a fixed
//! rate, blending each nominal sample with a force/torque compliance
//! correction before publishing it, until the trajectory is exhausted or
//! a safety/cancellation condition fires.
//!
//! # Modules
//!
//! - [`config`] – [`ReplayConfig`][config::ReplayConfig]: typed per-arm
//!   configuration (frames, topics, compliance parameters) loaded from
//!   TOML with env-var overrides.
//! - [`trajectory`] – [`TrajectoryStore`][trajectory::TrajectoryStore]:
//!   strict CSV loader producing one [`Trajectory`][trajectory::Trajectory]
//!   per arm (timestamps plus six parallel velocity-component sequences).
//! - [`compliance`] – [`ComplianceEngine`][compliance::ComplianceEngine]:
//!   the opaque collaborator seam mapping (nominal velocity, wrench) to
//!   (corrected velocity, status), plus the default
//!   [`SpringCompliance`][compliance::SpringCompliance] implementation.
//! - [`safety`] – [`SafetyMonitor`][safety::SafetyMonitor]: sticky halt
//!   flag fed asynchronously from the bus halt lane, read non-blocking
//!   once per tick.
//! - [`telemetry_log`] – [`TelemetryRecorder`][telemetry_log::TelemetryRecorder]:
//!   per-run CSV log, one row per arm per tick, flushed on every exit
//!   path.
//! - [`scheduler`] – [`ReplayScheduler`][scheduler::ReplayScheduler]: the
//!   fixed-rate control loop with ordered short-circuit terminal checks.
//! - [`controller`] – [`ReplayController`][controller::ReplayController]:
//!   the single-flight run boundary that wires everything together for
//!   one request and reports a [`RunOutcome`][retrace_types::RunOutcome].

pub mod compliance;
pub mod config;
pub mod controller;
pub mod safety;
pub mod scheduler;
pub mod telemetry_log;
pub mod trajectory;

pub use compliance::{ComplianceEngine, SpringCompliance};
pub use config::{ArmConfig, ReplayConfig};
pub use controller::{CancelHandle, ReplayController};
pub use safety::SafetyMonitor;
pub use scheduler::ReplayScheduler;
pub use telemetry_log::TelemetryRecorder;
pub use trajectory::{Trajectory, TrajectoryStore};
