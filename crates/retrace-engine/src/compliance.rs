//! Compliance correction seam.
//!
//! The replay loop treats the compliance algorithm as an opaque service:
//! it hands in the nominal 6-DOF velocity and the latest wrench (already
//! expressed in the command frame) and receives a corrected velocity and
//! a status flag. [`ComplianceEngine`] is that contract;
//! [`SpringCompliance`] is the default implementation.

use retrace_types::{ComplianceStatus, WrenchStamped};

use crate::config::ArmConfig;

/// Maps (nominal velocity, wrench) → (corrected velocity, status), once
/// per arm per tick.
///
/// Implementations may carry state between ticks (filters, latches).
/// Statuses [`ComplianceStatus::Met`] and [`ComplianceStatus::Violation`]
/// cause the scheduler to latch its run-scoped force/torque-limit flag.
pub trait ComplianceEngine: Send {
    fn velocity(
        &mut self,
        nominal: [f64; 6],
        wrench: &WrenchStamped,
    ) -> ([f64; 6], ComplianceStatus);
}

/// Default force/torque limits beyond which the correction reports a
/// violation regardless of the configured end condition.
const SAFE_FORCE_LIMIT: f64 = 100.0;
const SAFE_TORQUE_LIMIT: f64 = 50.0;

/// Bias-relative spring compliance.
///
/// The wrench measured at construction time is taken as the bias; each
/// tick the bias-removed reading is low-pass filtered, gated by the
/// deadband, and divided by the per-axis stiffness to produce the
/// velocity correction. Axes are (Fx, Fy, Fz, Tx, Ty, Tz) matching the
/// velocity order (x, y, z, roll, pitch, yaw).
pub struct SpringCompliance {
    stiffness: [f64; 6],
    deadband: f64,
    end_condition_wrench: [f64; 6],
    filter_param: f64,
    bias: [f64; 6],
    filtered: [f64; 6],
    safe_force_limit: f64,
    safe_torque_limit: f64,
}

impl SpringCompliance {
    /// Build an engine for one arm, seeded with the arm's first sensor
    /// reading (in the command frame) as the bias.
    pub fn new(config: &ArmConfig, bias_reading: &WrenchStamped) -> Self {
        Self {
            stiffness: config.stiffness,
            deadband: config.deadband,
            end_condition_wrench: config.end_condition_wrench,
            filter_param: config.filter_param,
            bias: wrench_components(bias_reading),
            filtered: [0.0; 6],
            safe_force_limit: SAFE_FORCE_LIMIT,
            safe_torque_limit: SAFE_TORQUE_LIMIT,
        }
    }

    /// Override the hard force/torque violation limits.
    pub fn with_safe_limits(mut self, force: f64, torque: f64) -> Self {
        self.safe_force_limit = force;
        self.safe_torque_limit = torque;
        self
    }

    fn status(&self) -> ComplianceStatus {
        for (axis, value) in self.filtered.iter().enumerate() {
            let limit = if axis < 3 {
                self.safe_force_limit
            } else {
                self.safe_torque_limit
            };
            if value.abs() >= limit {
                return ComplianceStatus::Violation;
            }
        }
        for (axis, value) in self.filtered.iter().enumerate() {
            let end = self.end_condition_wrench[axis];
            // A zero end condition disables the check for that axis.
            if end != 0.0 && value.abs() >= end.abs() {
                return ComplianceStatus::Met;
            }
        }
        ComplianceStatus::NotMet
    }
}

impl ComplianceEngine for SpringCompliance {
    fn velocity(
        &mut self,
        nominal: [f64; 6],
        wrench: &WrenchStamped,
    ) -> ([f64; 6], ComplianceStatus) {
        let raw = wrench_components(wrench);

        let mut corrected = nominal;
        for axis in 0..6 {
            let unbiased = raw[axis] - self.bias[axis];
            self.filtered[axis] = self.filter_param * self.filtered[axis]
                + (1.0 - self.filter_param) * unbiased;

            if self.filtered[axis].abs() > self.deadband {
                corrected[axis] += self.filtered[axis] / self.stiffness[axis];
            }
        }

        (corrected, self.status())
    }
}

fn wrench_components(reading: &WrenchStamped) -> [f64; 6] {
    let w = &reading.wrench;
    [
        w.force.x, w.force.y, w.force.z, w.torque.x, w.torque.y, w.torque.z,
    ]
}
