//! Trajectory loading.
//!
//! One CSV file per arm, named `{prefix}_arm{index}_processed.csv` inside
//! the configured data directory. The first line is a header and is
//! discarded. Every subsequent line holds seven comma-separated fields:
//! a timestamp followed by the six velocity components in
//! (x, y, z, roll, pitch, yaw) order. A line whose first field is empty
//! marks the end of data. Parsing is strict: any malformed numeric field
//! fails the whole load with [`ReplayError::DataFormat`].

use std::fs;
use std::path::{Path, PathBuf};

use retrace_types::ReplayError;
use tracing::info;

/// The recorded nominal velocity series for one arm: a timestamp
/// sequence and six parallel component sequences of identical length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub x_dot: Vec<f64>,
    pub y_dot: Vec<f64>,
    pub z_dot: Vec<f64>,
    pub roll_dot: Vec<f64>,
    pub pitch_dot: Vec<f64>,
    pub yaw_dot: Vec<f64>,
}

impl Trajectory {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// The nominal 6-DOF velocity at `index`, or `None` past the end.
    pub fn nominal(&self, index: usize) -> Option<[f64; 6]> {
        if index >= self.len() {
            return None;
        }
        Some([
            self.x_dot[index],
            self.y_dot[index],
            self.z_dot[index],
            self.roll_dot[index],
            self.pitch_dot[index],
            self.yaw_dot[index],
        ])
    }

    /// Average timestep: (last − first) / sample count.
    ///
    /// Returns `None` for an empty trajectory so the scheduler can treat
    /// it as immediately complete instead of dividing by zero.
    pub fn avg_timestep(&self) -> Option<f64> {
        let last = self.times.last()?;
        let first = self.times.first()?;
        Some((last - first) / self.times.len() as f64)
    }

    fn push_row(&mut self, row: [f64; 7]) {
        self.times.push(row[0]);
        self.x_dot.push(row[1]);
        self.y_dot.push(row[2]);
        self.z_dot.push(row[3]);
        self.roll_dot.push(row[4]);
        self.pitch_dot.push(row[5]);
        self.yaw_dot.push(row[6]);
    }
}

/// Loads and validates per-arm trajectory files.
pub struct TrajectoryStore;

impl TrajectoryStore {
    /// Path of arm `index`'s data file for `prefix`.
    pub fn file_path(data_dir: &Path, prefix: &str, index: usize) -> PathBuf {
        data_dir.join(format!("{prefix}_arm{index}_processed.csv"))
    }

    /// Load one trajectory per arm.
    ///
    /// After parsing, all arms are required to hold the same number of
    /// samples (the scheduler advances every arm by a shared tick index)
    /// and each arm's timestamps must be strictly increasing.
    pub fn load(
        data_dir: &Path,
        prefix: &str,
        arm_count: usize,
    ) -> Result<Vec<Trajectory>, ReplayError> {
        let mut trajectories = Vec::with_capacity(arm_count);
        for index in 0..arm_count {
            let path = Self::file_path(data_dir, prefix, index);
            let trajectory = Self::load_file(&path)?;
            Self::check_monotonic(&trajectory, &path)?;
            trajectories.push(trajectory);
        }

        if let Some(first_len) = trajectories.first().map(Trajectory::len) {
            for (index, t) in trajectories.iter().enumerate() {
                if t.len() != first_len {
                    return Err(ReplayError::DataFormat {
                        file: Self::file_path(data_dir, prefix, index)
                            .display()
                            .to_string(),
                        details: format!(
                            "arm {index} has {} samples but arm 0 has {first_len}",
                            t.len()
                        ),
                    });
                }
            }
        }

        info!(prefix, arm_count, "done reading trajectory files for all arms");
        Ok(trajectories)
    }

    fn load_file(path: &Path) -> Result<Trajectory, ReplayError> {
        let file = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|e| ReplayError::DataFormat {
            file: file.clone(),
            details: format!("cannot read file: {e}"),
        })?;

        let mut trajectory = Trajectory::default();
        // Skip the header line.
        for (line_no, line) in raw.lines().enumerate().skip(1) {
            let mut fields = line.split(',');
            let first = fields.next().unwrap_or("").trim();
            // An empty leading field marks end of data.
            if first.is_empty() {
                break;
            }

            let mut row = [0.0f64; 7];
            row[0] = Self::parse_field(first, line_no, &file)?;
            for slot in row.iter_mut().skip(1) {
                let field = fields.next().ok_or_else(|| ReplayError::DataFormat {
                    file: file.clone(),
                    details: format!("line {}: expected 7 fields", line_no + 1),
                })?;
                *slot = Self::parse_field(field.trim(), line_no, &file)?;
            }
            trajectory.push_row(row);
        }
        Ok(trajectory)
    }

    fn parse_field(field: &str, line_no: usize, file: &str) -> Result<f64, ReplayError> {
        field.parse::<f64>().map_err(|_| ReplayError::DataFormat {
            file: file.to_string(),
            details: format!("line {}: malformed numeric field '{field}'", line_no + 1),
        })
    }

    fn check_monotonic(trajectory: &Trajectory, path: &Path) -> Result<(), ReplayError> {
        for pair in trajectory.times.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ReplayError::DataFormat {
                    file: path.display().to_string(),
                    details: format!(
                        "timestamps must be strictly increasing ({} then {})",
                        pair[0], pair[1]
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "time,vx,vy,vz,vroll,vpitch,vyaw";

    fn write_file(dir: &Path, prefix: &str, index: usize, body: &str) {
        let path = TrajectoryStore::file_path(dir, prefix, index);
        let mut f = fs::File::create(path).unwrap();
        writeln!(f, "{HEADER}").unwrap();
        write!(f, "{body}").unwrap();
    }

    #[test]
    fn loads_well_formed_file() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "demo",
            0,
            "0.0,0.1,0.2,0.3,0.01,0.02,0.03\n0.1,0.2,0.3,0.4,0.02,0.03,0.04\n",
        );

        let loaded = TrajectoryStore::load(dir.path(), "demo", 1).unwrap();
        assert_eq!(loaded.len(), 1);
        let t = &loaded[0];
        assert_eq!(t.len(), 2);
        assert_eq!(t.nominal(0), Some([0.1, 0.2, 0.3, 0.01, 0.02, 0.03]));
        assert_eq!(t.nominal(1), Some([0.2, 0.3, 0.4, 0.02, 0.03, 0.04]));
        assert_eq!(t.nominal(2), None);
    }

    #[test]
    fn empty_leading_field_terminates_data() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "demo",
            0,
            "0.0,1,2,3,4,5,6\n,,,,,,\n9.9,1,2,3,4,5,6\n",
        );

        let loaded = TrajectoryStore::load(dir.path(), "demo", 1).unwrap();
        assert_eq!(loaded[0].len(), 1, "rows after the terminator must be ignored");
    }

    #[test]
    fn malformed_numeric_field_is_data_format_error() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "demo", 0, "0.0,1,2,oops,4,5,6\n");

        let err = TrajectoryStore::load(dir.path(), "demo", 1).unwrap_err();
        match err {
            ReplayError::DataFormat { details, .. } => {
                assert!(details.contains("oops"), "details: {details}");
            }
            other => panic!("expected DataFormat, got {other:?}"),
        }
    }

    #[test]
    fn short_row_is_data_format_error() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "demo", 0, "0.0,1,2,3\n");
        assert!(matches!(
            TrajectoryStore::load(dir.path(), "demo", 1),
            Err(ReplayError::DataFormat { .. })
        ));
    }

    #[test]
    fn missing_file_is_data_format_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TrajectoryStore::load(dir.path(), "ghost", 1),
            Err(ReplayError::DataFormat { .. })
        ));
    }

    #[test]
    fn header_only_file_yields_empty_trajectory() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "demo", 0, "");

        let loaded = TrajectoryStore::load(dir.path(), "demo", 1).unwrap();
        assert!(loaded[0].is_empty());
        assert_eq!(loaded[0].avg_timestep(), None);
    }

    #[test]
    fn avg_timestep_spans_first_to_last() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "demo",
            0,
            "0.0,0,0,0,0,0,0\n0.1,0,0,0,0,0,0\n0.2,0,0,0,0,0,0\n0.3,0,0,0,0,0,0\n",
        );
        let loaded = TrajectoryStore::load(dir.path(), "demo", 1).unwrap();
        let dt = loaded[0].avg_timestep().unwrap();
        // (0.3 - 0.0) / 4 samples
        assert!((dt - 0.075).abs() < 1e-12);
    }

    #[test]
    fn non_increasing_timestamps_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "demo",
            0,
            "0.0,0,0,0,0,0,0\n0.2,0,0,0,0,0,0\n0.1,0,0,0,0,0,0\n",
        );
        assert!(matches!(
            TrajectoryStore::load(dir.path(), "demo", 1),
            Err(ReplayError::DataFormat { .. })
        ));
    }

    #[test]
    fn mismatched_arm_lengths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "demo",
            0,
            "0.0,0,0,0,0,0,0\n0.1,0,0,0,0,0,0\n",
        );
        write_file(dir.path(), "demo", 1, "0.0,0,0,0,0,0,0\n");
        assert!(matches!(
            TrajectoryStore::load(dir.path(), "demo", 2),
            Err(ReplayError::DataFormat { .. })
        ));
    }
}
