//! The fixed-rate replay loop.
//!
//! Each tick, for every arm in index order: refresh the latest wrench
//! reading into the arm's command frame, read the nominal velocity sample
//! at the shared tick index, ask the compliance engine for the corrected
//! velocity, publish it, latch the run-scoped force/torque-limit flag on
//! `Met`/`Violation`, and append a telemetry row. After all arms, sleep
//! to the next tick boundary.
//!
//! Terminal conditions are evaluated at the start of every tick,
//! short-circuit, highest priority first: process shutdown, external
//! halt, the latched force/torque limit, caller cancellation, trajectory
//! exhaustion. Cancellation and halt are polled, not preemptive, so the
//! worst-case reaction latency is one tick period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use retrace_middleware::SignalBus;
use retrace_transform::WrenchTransformer;
use retrace_types::{ComplianceStatus, ReplayError, StopReason, Twist, TwistStamped, WrenchStamped};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::compliance::ComplianceEngine;
use crate::safety::SafetyMonitor;
use crate::telemetry_log::TelemetryRecorder;
use crate::trajectory::Trajectory;

/// Floor for the tick period so a degenerate single-sample trajectory
/// (average timestep 0) cannot produce a zero-length interval.
const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Live per-arm state for one run.
///
/// `latest_wrench` is the shared slot the asynchronous sensor ingest task
/// writes into; the scheduler is its only other reader. `status` holds
/// the most recent compliance status, refreshed once per tick.
pub struct ArmContext {
    pub config: crate::config::ArmConfig,
    pub latest_wrench: Arc<Mutex<WrenchStamped>>,
    pub engine: Box<dyn ComplianceEngine>,
    pub status: ComplianceStatus,
}

impl ArmContext {
    pub fn new(
        config: crate::config::ArmConfig,
        initial_reading: WrenchStamped,
        engine: Box<dyn ComplianceEngine>,
    ) -> Self {
        Self {
            config,
            latest_wrench: Arc::new(Mutex::new(initial_reading)),
            engine,
            status: ComplianceStatus::NotMet,
        }
    }
}

/// The fixed-rate control loop for one run. Owns every per-run companion
/// (contexts, telemetry, safety monitor) and releases them when the run
/// ends, whatever the exit path.
pub struct ReplayScheduler {
    arms: Vec<ArmContext>,
    trajectories: Vec<Trajectory>,
    bus: SignalBus,
    transformer: WrenchTransformer,
    telemetry: TelemetryRecorder,
    safety: SafetyMonitor,
    shutdown: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    /// Sticky for the remainder of the run once any arm reports
    /// `Met`/`Violation`.
    force_torque_limit: bool,
    tick: usize,
}

impl ReplayScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arms: Vec<ArmContext>,
        trajectories: Vec<Trajectory>,
        bus: SignalBus,
        transformer: WrenchTransformer,
        telemetry: TelemetryRecorder,
        safety: SafetyMonitor,
        shutdown: Arc<AtomicBool>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            arms,
            trajectories,
            bus,
            transformer,
            telemetry,
            safety,
            shutdown,
            cancel,
            force_torque_limit: false,
            tick: 0,
        }
    }

    /// Run the loop to completion or abort.
    ///
    /// Faults (`TransformUnavailable`, telemetry I/O) propagate as `Err`;
    /// the telemetry log is flushed on every exit path either way.
    pub async fn run(mut self) -> Result<StopReason, ReplayError> {
        let result = self.replay_loop().await;
        let flushed = self.telemetry.flush();
        let reason = result?;
        flushed?;
        Ok(reason)
    }

    async fn replay_loop(&mut self) -> Result<StopReason, ReplayError> {
        // All arms share arm 0's timing: the loader guarantees equal
        // lengths, and the period comes from arm 0's timestamps.
        let length = self.trajectories.first().map_or(0, Trajectory::len);
        let Some(avg_timestep) = self.trajectories.first().and_then(Trajectory::avg_timestep)
        else {
            // Empty trajectory: immediately complete, and in particular
            // no division by zero computing the tick rate.
            info!("trajectory is empty; nothing to replay");
            return Ok(StopReason::Completed);
        };

        let period = Duration::from_secs_f64(avg_timestep.max(0.0)).max(MIN_TICK_PERIOD);
        let mut interval = tokio::time::interval(period);
        // Fixed-rate pacing: overruns delay subsequent ticks rather than
        // skipping samples.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick resolves immediately; consume it so the
        // end-of-tick await sleeps a full period.
        interval.tick().await;

        info!(samples = length, period_ms = period.as_millis() as u64, "replay started");

        loop {
            if let Some(reason) = self.check_terminal(length) {
                return Ok(reason);
            }

            for arm_index in 0..self.arms.len() {
                self.process_arm(arm_index).await?;
            }

            self.tick += 1;
            interval.tick().await;
        }
    }

    /// Ordered short-circuit terminal checks, highest priority first.
    fn check_terminal(&self, length: usize) -> Option<StopReason> {
        if self.shutdown.load(Ordering::Acquire) {
            info!("process shutdown requested; aborting replay");
            return Some(StopReason::Shutdown);
        }
        if self.safety.is_halted() {
            warn!("halted: singularity, joint limit, or collision suspected");
            return Some(StopReason::Halted);
        }
        if self.force_torque_limit {
            info!("force/torque limit reached on a previous tick; stopping");
            return Some(StopReason::ForceTorqueLimit);
        }
        if self.cancel.load(Ordering::Acquire) {
            info!("cancellation requested by caller");
            return Some(StopReason::Cancelled);
        }
        if self.tick >= length {
            info!(ticks = self.tick, "trajectory exhausted");
            return Some(StopReason::Completed);
        }
        None
    }

    async fn process_arm(&mut self, arm_index: usize) -> Result<(), ReplayError> {
        // Snapshot the latest asynchronous reading; the lock is never
        // held across an await.
        let reading = {
            let slot = self.arms[arm_index]
                .latest_wrench
                .lock()
                .map_err(|_| ReplayError::Channel("wrench slot lock poisoned".to_string()))?;
            slot.clone()
        };

        let command_frame = self.arms[arm_index].config.command_frame.clone();
        let wrench = self
            .transformer
            .to_command_frame(&reading, &command_frame)
            .await?;

        // Shared tick index across arms; lengths were validated equal.
        let nominal = self.trajectories[arm_index]
            .nominal(self.tick)
            .ok_or_else(|| ReplayError::DataFormat {
                file: format!("arm {arm_index}"),
                details: format!("no sample at tick {}", self.tick),
            })?;

        let arm = &mut self.arms[arm_index];
        let (corrected, status) = arm.engine.velocity(nominal, &wrench);
        arm.status = status;

        self.bus.publish_velocity(
            arm_index,
            TwistStamped::new(command_frame, Twist::from_array(corrected)),
        )?;

        if matches!(status, ComplianceStatus::Met | ComplianceStatus::Violation) {
            warn!(arm = arm_index, ?status, tick = self.tick, "force/torque limit reached");
            self.force_torque_limit = true;
        }

        debug!(arm = arm_index, tick = self.tick, "published compliant velocity");
        self.telemetry.record(nominal, corrected, &wrench.wrench)
    }
}
