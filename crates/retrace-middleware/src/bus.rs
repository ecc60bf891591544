//! Typed, per-arm publish/subscribe signal bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber
//! blocking the others.
//!
//! # Lanes
//!
//! Traffic is partitioned into indexed lanes so components only receive
//! the signals they care about:
//!
//! | Lane | Direction | Typical traffic |
//! |---|---|---|
//! | wrench (per arm) | inbound | force/torque sensor readings |
//! | velocity (per arm) | outbound | compliant 6-DOF velocity commands |
//! | halt (single) | inbound | external "stop everything" notifications |
//!
//! The lanes are an indexed table sized by the arm count at construction,
//! so nothing about the bus is bounded to a fixed number of arms.

use std::collections::HashMap;

use retrace_types::{ReplayError, TwistStamped, WrenchStamped};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered messages before old ones
/// are dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 64;

/// Shared signal bus. Clone it cheaply – all clones share the same
/// underlying broadcast channels.
///
/// Publishing with no active subscribers is a normal condition for the
/// outbound velocity lanes (the robot side may not be attached in tests),
/// so publish methods return `Ok(0)` rather than an error in that case.
#[derive(Clone, Debug)]
pub struct SignalBus {
    wrench: Vec<broadcast::Sender<WrenchStamped>>,
    velocity: Vec<broadcast::Sender<TwistStamped>>,
    halt: broadcast::Sender<bool>,
    /// Sensor-topic name → arm index, for external adapters that only
    /// know the channel name they are feeding.
    topic_index: HashMap<String, usize>,
}

impl SignalBus {
    /// Create a bus with one wrench lane and one velocity lane per arm.
    ///
    /// `sensor_topics[i]` names arm `i`'s inbound wrench channel for
    /// [`SignalBus::arm_for_topic`] resolution.
    pub fn new(sensor_topics: &[String]) -> Self {
        Self::with_capacity(sensor_topics, DEFAULT_CAPACITY)
    }

    /// Same as [`SignalBus::new`] with an explicit per-lane capacity.
    pub fn with_capacity(sensor_topics: &[String], capacity: usize) -> Self {
        let arm_count = sensor_topics.len();
        let wrench = (0..arm_count)
            .map(|_| broadcast::channel(capacity).0)
            .collect();
        let velocity = (0..arm_count)
            .map(|_| broadcast::channel(capacity).0)
            .collect();
        let (halt, _) = broadcast::channel(capacity);
        let topic_index = sensor_topics
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Self {
            wrench,
            velocity,
            halt,
            topic_index,
        }
    }

    /// Number of arms the bus was sized for.
    pub fn arm_count(&self) -> usize {
        self.wrench.len()
    }

    /// Resolve a sensor-topic name to its arm index.
    pub fn arm_for_topic(&self, topic: &str) -> Option<usize> {
        self.topic_index.get(topic).copied()
    }

    // -----------------------------------------------------------------------
    // Wrench lanes (inbound sensor data)
    // -----------------------------------------------------------------------

    /// Publish a wrench reading on arm `arm`'s lane.
    ///
    /// Returns the number of active receivers. `Ok(0)` when nobody is
    /// listening yet.
    pub fn publish_wrench(&self, arm: usize, reading: WrenchStamped) -> Result<usize, ReplayError> {
        let sender = self.wrench.get(arm).ok_or_else(|| {
            ReplayError::Channel(format!("no wrench lane for arm {arm}"))
        })?;
        Ok(sender.send(reading).unwrap_or(0))
    }

    /// Subscribe to arm `arm`'s wrench lane.
    pub fn subscribe_wrench(
        &self,
        arm: usize,
    ) -> Result<broadcast::Receiver<WrenchStamped>, ReplayError> {
        self.wrench
            .get(arm)
            .map(|s| s.subscribe())
            .ok_or_else(|| ReplayError::Channel(format!("no wrench lane for arm {arm}")))
    }

    // -----------------------------------------------------------------------
    // Velocity lanes (outbound commands)
    // -----------------------------------------------------------------------

    /// Publish a velocity command on arm `arm`'s lane.
    pub fn publish_velocity(
        &self,
        arm: usize,
        command: TwistStamped,
    ) -> Result<usize, ReplayError> {
        let sender = self.velocity.get(arm).ok_or_else(|| {
            ReplayError::Channel(format!("no velocity lane for arm {arm}"))
        })?;
        match sender.send(command) {
            Ok(n) => Ok(n),
            Err(_) => {
                // No robot-side subscriber attached. Command is dropped,
                // which matters enough to log but not to abort the run.
                warn!(arm, "velocity command published with no subscribers");
                Ok(0)
            }
        }
    }

    /// Subscribe to arm `arm`'s velocity lane.
    pub fn subscribe_velocity(
        &self,
        arm: usize,
    ) -> Result<broadcast::Receiver<TwistStamped>, ReplayError> {
        self.velocity
            .get(arm)
            .map(|s| s.subscribe())
            .ok_or_else(|| ReplayError::Channel(format!("no velocity lane for arm {arm}")))
    }

    // -----------------------------------------------------------------------
    // Halt lane
    // -----------------------------------------------------------------------

    /// Publish an external halt notification.
    pub fn publish_halt(&self, halted: bool) -> usize {
        self.halt.send(halted).unwrap_or(0)
    }

    /// Subscribe to the halt lane.
    pub fn subscribe_halt(&self) -> broadcast::Receiver<bool> {
        self.halt.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_types::{Twist, Vec3, Wrench};

    fn two_arm_bus() -> SignalBus {
        SignalBus::new(&[
            "left/ft_sensor".to_string(),
            "right/ft_sensor".to_string(),
        ])
    }

    fn reading(fx: f64) -> WrenchStamped {
        WrenchStamped::new(
            "ft_frame",
            Wrench {
                force: Vec3::new(fx, 0.0, 0.0),
                torque: Vec3::zero(),
            },
        )
    }

    #[tokio::test]
    async fn wrench_publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = two_arm_bus();
        let mut rx = bus.subscribe_wrench(1)?;

        bus.publish_wrench(1, reading(3.5))?;

        let got = rx.recv().await?;
        assert!((got.wrench.force.x - 3.5).abs() < 1e-12);
        Ok(())
    }

    #[tokio::test]
    async fn wrench_lanes_are_isolated_per_arm() -> Result<(), Box<dyn std::error::Error>> {
        let bus = two_arm_bus();
        let mut rx0 = bus.subscribe_wrench(0)?;
        let _rx1 = bus.subscribe_wrench(1)?;

        bus.publish_wrench(1, reading(1.0))?;

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), rx0.recv()).await;
        assert!(result.is_err(), "arm 0 must not see arm 1's readings");
        Ok(())
    }

    #[tokio::test]
    async fn velocity_publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = two_arm_bus();
        let mut rx = bus.subscribe_velocity(0)?;

        let cmd = TwistStamped::new("left_ee", Twist::from_array([0.1, 0.0, 0.0, 0.0, 0.0, 0.0]));
        bus.publish_velocity(0, cmd.clone())?;

        let got = rx.recv().await?;
        assert_eq!(got.twist, cmd.twist);
        Ok(())
    }

    #[test]
    fn velocity_publish_without_subscribers_is_ok() {
        let bus = two_arm_bus();
        let cmd = TwistStamped::new("left_ee", Twist::default());
        let n = bus.publish_velocity(0, cmd).expect("publish must not fail");
        assert_eq!(n, 0);
    }

    #[test]
    fn unknown_arm_index_is_a_channel_error() {
        let bus = two_arm_bus();
        assert!(matches!(
            bus.publish_wrench(2, reading(0.0)),
            Err(ReplayError::Channel(_))
        ));
        assert!(bus.subscribe_velocity(9).is_err());
    }

    #[tokio::test]
    async fn halt_reaches_all_subscribers() -> Result<(), Box<dyn std::error::Error>> {
        let bus = two_arm_bus();
        let mut rx1 = bus.subscribe_halt();
        let mut rx2 = bus.subscribe_halt();

        assert_eq!(bus.publish_halt(true), 2);
        assert!(rx1.recv().await?);
        assert!(rx2.recv().await?);
        Ok(())
    }

    #[test]
    fn topic_name_resolves_to_arm_index() {
        let bus = two_arm_bus();
        assert_eq!(bus.arm_for_topic("right/ft_sensor"), Some(1));
        assert_eq!(bus.arm_for_topic("left/ft_sensor"), Some(0));
        assert_eq!(bus.arm_for_topic("nonexistent"), None);
        assert_eq!(bus.arm_count(), 2);
    }
}
