//! Wrench frame transformation.
//!
//! Re-expresses a [`WrenchStamped`] in a target command frame by looking
//! up the rigid-body transform between the two frames and rotating the
//! force and torque vectors independently. The torque is treated as an
//! ordinary free vector: there is deliberately no lever-arm (moment)
//! correction, matching the behaviour the recorded datasets were
//! produced against.

use std::time::Duration;

use retrace_types::{ReplayError, WrenchStamped};
use tracing::trace;

use crate::graph::{SharedFrameGraph, Transform3D};

/// How often the lookup re-checks the graph while waiting for a transform
/// to appear.
const LOOKUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default bounded wait before a lookup fails with
/// [`ReplayError::TransformUnavailable`].
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

/// Transforms wrench readings into a target frame, waiting a bounded time
/// for the frame graph to contain the required edge.
///
/// The graph is shared: an external adapter may be streaming transform
/// updates into it while the replay loop reads.
#[derive(Clone)]
pub struct WrenchTransformer {
    graph: SharedFrameGraph,
    timeout: Duration,
}

impl WrenchTransformer {
    pub fn new(graph: SharedFrameGraph) -> Self {
        Self {
            graph,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    /// Override the bounded lookup wait (tests use a short one).
    pub fn with_timeout(graph: SharedFrameGraph, timeout: Duration) -> Self {
        Self { graph, timeout }
    }

    /// Re-express `reading` in `target_frame`.
    ///
    /// Decomposes the wrench into its force and torque vectors, rotates
    /// each by the looked-up transform, recombines them, and retags the
    /// result with `target_frame`. The original measurement stamp is
    /// preserved.
    ///
    /// # Errors
    ///
    /// [`ReplayError::TransformUnavailable`] if no transform from the
    /// reading's frame to `target_frame` appears within the bounded wait.
    pub async fn to_command_frame(
        &self,
        reading: &WrenchStamped,
        target_frame: &str,
    ) -> Result<WrenchStamped, ReplayError> {
        let transform = self.wait_for_transform(&reading.frame_id, target_frame).await?;

        let force = transform.rotate_vector(reading.wrench.force);
        let torque = transform.rotate_vector(reading.wrench.torque);

        Ok(WrenchStamped {
            frame_id: target_frame.to_string(),
            stamp: reading.stamp,
            wrench: retrace_types::Wrench { force, torque },
        })
    }

    /// Poll the shared graph until the transform appears or the bounded
    /// wait elapses. The lock is held only for the duration of each
    /// lookup, never across an await point.
    async fn wait_for_transform(
        &self,
        source_frame: &str,
        target_frame: &str,
    ) -> Result<Transform3D, ReplayError> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let found = {
                let graph = self
                    .graph
                    .read()
                    .map_err(|_| ReplayError::Channel("frame graph lock poisoned".to_string()))?;
                graph.lookup(source_frame, target_frame)
            };
            if let Some(transform) = found {
                return Ok(transform);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ReplayError::TransformUnavailable {
                    source_frame: source_frame.to_string(),
                    target_frame: target_frame.to_string(),
                    timeout_secs: self.timeout.as_secs_f64(),
                });
            }
            trace!(source_frame, target_frame, "transform not yet available, retrying");
            tokio::time::sleep(LOOKUP_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FrameGraph, Quaternion, Transform3D, shared};
    use retrace_types::{Vec3, Wrench};
    use std::f64::consts::FRAC_1_SQRT_2;

    fn sensor_reading() -> WrenchStamped {
        WrenchStamped::new(
            "ft_sensor",
            Wrench {
                force: Vec3::new(1.0, 0.0, 0.0),
                torque: Vec3::new(0.0, 2.0, 0.0),
            },
        )
    }

    #[tokio::test]
    async fn identity_transform_preserves_components() {
        let mut graph = FrameGraph::new();
        graph.set_transform("ft_sensor", "ee_link", Transform3D::identity());
        let tx = WrenchTransformer::new(shared(graph));

        let out = tx
            .to_command_frame(&sensor_reading(), "ee_link")
            .await
            .unwrap();
        assert_eq!(out.frame_id, "ee_link");
        assert!((out.wrench.force.x - 1.0).abs() < 1e-12);
        assert!((out.wrench.torque.y - 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn rotation_applies_to_force_and_torque_independently() {
        // 90° yaw: sensor +X maps to command +Y.
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let mut graph = FrameGraph::new();
        graph.set_transform(
            "ft_sensor",
            "ee_link",
            Transform3D::new(Vec3::zero(), q90z),
        );
        let tx = WrenchTransformer::new(shared(graph));

        let out = tx
            .to_command_frame(&sensor_reading(), "ee_link")
            .await
            .unwrap();
        // force (1,0,0) → (0,1,0)
        assert!(out.wrench.force.x.abs() < 1e-9);
        assert!((out.wrench.force.y - 1.0).abs() < 1e-9);
        // torque (0,2,0) → (-2,0,0)
        assert!((out.wrench.torque.x + 2.0).abs() < 1e-9);
        assert!(out.wrench.torque.y.abs() < 1e-9);
    }

    #[tokio::test]
    async fn translation_does_not_leak_into_the_wrench() {
        // A pure translation must leave both vectors untouched: no
        // lever-arm correction is applied.
        let mut graph = FrameGraph::new();
        graph.set_transform(
            "ft_sensor",
            "ee_link",
            Transform3D::new(Vec3::new(0.0, 0.0, 0.3), Quaternion::identity()),
        );
        let tx = WrenchTransformer::new(shared(graph));

        let reading = sensor_reading();
        let out = tx.to_command_frame(&reading, "ee_link").await.unwrap();
        assert_eq!(out.wrench, reading.wrench);
    }

    #[tokio::test]
    async fn stamp_is_preserved() {
        let mut graph = FrameGraph::new();
        graph.set_transform("ft_sensor", "ee_link", Transform3D::identity());
        let tx = WrenchTransformer::new(shared(graph));

        let reading = sensor_reading();
        let out = tx.to_command_frame(&reading, "ee_link").await.unwrap();
        assert_eq!(out.stamp, reading.stamp);
    }

    #[tokio::test]
    async fn missing_transform_times_out() {
        let tx = WrenchTransformer::with_timeout(
            shared(FrameGraph::new()),
            Duration::from_millis(120),
        );
        let result = tx.to_command_frame(&sensor_reading(), "ee_link").await;
        assert!(matches!(
            result,
            Err(ReplayError::TransformUnavailable { ref target_frame, .. }) if target_frame == "ee_link"
        ));
    }

    #[tokio::test]
    async fn transform_arriving_late_is_picked_up() {
        let graph = shared(FrameGraph::new());
        let tx = WrenchTransformer::with_timeout(graph.clone(), Duration::from_secs(1));

        // Simulate the external adapter publishing the edge shortly after
        // the lookup starts.
        let writer = graph.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            writer
                .write()
                .unwrap()
                .set_transform("ft_sensor", "ee_link", Transform3D::identity());
        });

        let out = tx.to_command_frame(&sensor_reading(), "ee_link").await;
        assert!(out.is_ok());
    }
}
