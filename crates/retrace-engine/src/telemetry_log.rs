//! Per-run telemetry log.
//!
//! Opens the configured path with overwrite semantics (each run replaces
//! the previous log), writes a one-line description and a fixed CSV
//! header, then appends one row per arm per tick: the six nominal
//! velocity components, the six corrected components, and the six wrench
//! components used for the correction.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use retrace_types::{ReplayError, Wrench};

/// Human-readable first line of every log file.
const DESCRIPTION: &str = "This file saves data from the most recent trajectory.";

/// Fixed column header.
pub const TELEMETRY_HEADER: &str = "x_nom_vel,y_nom_vel,z_nom_vel,roll_nom_vel,pitch_nom_vel,\
yaw_nom_vel,x_compl_vel,y_compl_vel,z_compl_vel,roll_compl_vel,pitch_compl_vel,yaw_compl_vel,\
Fx,Fy,Fz,Tx,Ty,Tz";

/// Buffered CSV writer for one run's telemetry.
///
/// The file is flushed by [`TelemetryRecorder::flush`] on every scheduler
/// exit path and again on drop, so no termination path can lose rows.
pub struct TelemetryRecorder {
    writer: BufWriter<fs::File>,
    rows: usize,
}

impl TelemetryRecorder {
    /// Create (or truncate) the log at `path` and write the preamble.
    pub fn create(path: &Path) -> Result<Self, ReplayError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ReplayError::Io(format!(
                    "cannot create telemetry directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let file = fs::File::create(path).map_err(|e| {
            ReplayError::Io(format!("cannot create telemetry log {}: {e}", path.display()))
        })?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{DESCRIPTION}")
            .and_then(|_| writeln!(writer, "{TELEMETRY_HEADER}"))
            .map_err(|e| ReplayError::Io(format!("telemetry write failed: {e}")))?;

        Ok(Self { writer, rows: 0 })
    }

    /// Append one row for one arm at one tick.
    pub fn record(
        &mut self,
        nominal: [f64; 6],
        corrected: [f64; 6],
        wrench: &Wrench,
    ) -> Result<(), ReplayError> {
        let w = [
            wrench.force.x,
            wrench.force.y,
            wrench.force.z,
            wrench.torque.x,
            wrench.torque.y,
            wrench.torque.z,
        ];
        let row: Vec<String> = nominal
            .iter()
            .chain(corrected.iter())
            .chain(w.iter())
            .map(|v| v.to_string())
            .collect();
        writeln!(self.writer, "{}", row.join(","))
            .map_err(|e| ReplayError::Io(format!("telemetry write failed: {e}")))?;
        self.rows += 1;
        Ok(())
    }

    /// Number of data rows written so far.
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flush buffered rows to disk.
    pub fn flush(&mut self) -> Result<(), ReplayError> {
        self.writer
            .flush()
            .map_err(|e| ReplayError::Io(format!("telemetry flush failed: {e}")))
    }
}

impl Drop for TelemetryRecorder {
    fn drop(&mut self) {
        // Best effort; the scheduler already flushed on orderly exits.
        let _ = self.writer.flush();
    }
}
