//! The run boundary.
//!
//! [`ReplayController`] accepts a single [`RunRequest`], wires up every
//! per-run companion (signal bus subscriptions, sensor ingest tasks,
//! compliance engines, trajectory data, telemetry, safety monitor), runs
//! the [`ReplayScheduler`] to completion or abort, and reports a
//! [`RunOutcome`]. A second request while one is in flight is rejected
//! with [`ReplayError::Busy`].
//!
//! Run sequence: validate configuration → open the telemetry log (every
//! accepted run leaves at least a header-only file) → await the first
//! wrench reading on every arm's sensor lane → transform it into the
//! command frame and seed one compliance engine per arm with it as the
//! bias → load the trajectories → run the scheduler. Cancellation is cooperative: the
//! scheduler polls the flag once per tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use retrace_middleware::SignalBus;
use retrace_transform::graph::{FrameGraph, Quaternion, SharedFrameGraph, Transform3D, shared};
use retrace_transform::WrenchTransformer;
use retrace_types::{ReplayError, RunOutcome, RunRequest, StopReason, Vec3, WrenchStamped};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::compliance::SpringCompliance;
use crate::config::ReplayConfig;
use crate::safety::SafetyMonitor;
use crate::scheduler::{ArmContext, ReplayScheduler};
use crate::telemetry_log::TelemetryRecorder;
use crate::trajectory::TrajectoryStore;

/// How often the startup barrier re-checks the shutdown/cancel flags
/// while waiting for first sensor data.
const BARRIER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation for the active run.
///
/// Cancelling is not preemptive: the scheduler observes the flag at the
/// start of its next tick. The flag is cleared when a new run starts.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of the startup barrier for one arm.
enum Barrier {
    Reading(WrenchStamped),
    Stopped(StopReason),
}

/// Clears the in-flight marker when the run ends, whatever the path.
struct FlightGuard(Arc<AtomicBool>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Aborts the per-run sensor ingest tasks when the run ends.
#[derive(Default)]
struct IngestTasks(Vec<JoinHandle<()>>);

impl Drop for IngestTasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// The request/response boundary: one active run at a time.
pub struct ReplayController {
    config: ReplayConfig,
    graph: SharedFrameGraph,
    bus: SignalBus,
    shutdown: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
}

impl ReplayController {
    /// Validate the configuration and build the controller's transport:
    /// the signal bus (sized by the arm count) and the frame graph
    /// (seeded with any static transforms from the configuration).
    pub fn new(config: ReplayConfig) -> Result<Self, ReplayError> {
        config.validate()?;

        let mut graph = FrameGraph::new();
        for st in &config.transforms {
            let [w, x, y, z] = st.rotation;
            let [tx, ty, tz] = st.translation;
            graph.set_transform(
                &st.parent_frame,
                &st.child_frame,
                Transform3D::new(Vec3::new(tx, ty, tz), Quaternion::new(w, x, y, z)),
            );
        }

        let bus = SignalBus::new(&config.sensor_topics());
        Ok(Self {
            config,
            graph: shared(graph),
            bus,
            shutdown: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The bus external adapters publish sensor readings and halt
    /// notifications on, and subscribe to velocity commands from.
    pub fn bus(&self) -> SignalBus {
        self.bus.clone()
    }

    /// The frame graph live transform streams write into.
    pub fn graph(&self) -> SharedFrameGraph {
        Arc::clone(&self.graph)
    }

    /// Handle for cancelling the active run.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// Process-level shutdown flag (wired to ctrl-c by the binary).
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Execute one replay run to completion or abort.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::Busy`] if a run is already in flight.
    /// - [`ReplayError::DataFormat`], [`ReplayError::TransformUnavailable`],
    ///   or I/O faults abort the run and surface here with a diagnostic.
    ///
    /// Safety aborts and cancellations are not errors: they produce an
    /// unsuccessful [`RunOutcome`] with a distinguishable reason.
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, ReplayError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(request = %request.id, "rejecting request: a run is already in flight");
            return Err(ReplayError::Busy);
        }
        let _flight = FlightGuard(Arc::clone(&self.in_flight));

        // A stale cancellation from a previous run must not kill this one.
        self.cancel.store(false, Ordering::Release);

        info!(request = %request.id, prefix = %request.file_prefix, "replay run accepted");

        // Opened before the startup barrier so even a run stopped while
        // waiting for sensor data leaves a header-only log behind.
        let telemetry = TelemetryRecorder::create(&self.config.telemetry_path)?;

        let transformer = WrenchTransformer::new(self.graph());
        let safety = SafetyMonitor::spawn(&self.bus);
        let mut ingest = IngestTasks::default();
        let mut arms = Vec::with_capacity(self.config.arm_count());

        for (arm_index, arm_config) in self.config.arms.iter().enumerate() {
            let mut rx = self.bus.subscribe_wrench(arm_index)?;

            info!(arm = arm_index, topic = %arm_config.sensor_topic, "waiting for first force/torque reading");
            let mut first = match self.await_first_reading(&mut rx).await? {
                Barrier::Reading(reading) => reading,
                Barrier::Stopped(reason) => {
                    info!(?reason, "run stopped during sensor startup barrier");
                    return Ok(RunOutcome::new(request.id, reason));
                }
            };
            // Readings arrive tagged by the adapter; the configured
            // sensor frame is authoritative for transform lookups.
            first.frame_id = arm_config.sensor_frame.clone();
            info!(arm = arm_index, "received initial force/torque reading");

            // The initial reading, expressed in the command frame, is the
            // compliance bias.
            let bias = transformer
                .to_command_frame(&first, &arm_config.command_frame)
                .await?;
            let engine = Box::new(SpringCompliance::new(arm_config, &bias));

            let context = ArmContext::new(arm_config.clone(), first, engine);
            ingest.0.push(spawn_ingest(
                rx,
                Arc::clone(&context.latest_wrench),
                arm_config.sensor_frame.clone(),
            ));
            arms.push(context);
        }

        let trajectories = TrajectoryStore::load(
            &self.config.data_dir,
            &request.file_prefix,
            self.config.arm_count(),
        )?;

        let scheduler = ReplayScheduler::new(
            arms,
            trajectories,
            self.bus.clone(),
            transformer,
            telemetry,
            safety,
            Arc::clone(&self.shutdown),
            Arc::clone(&self.cancel),
        );

        let reason = scheduler.run().await?;
        let outcome = RunOutcome::new(request.id, reason);
        info!(request = %request.id, successful = outcome.successful, ?reason, "replay run finished");
        Ok(outcome)
    }

    /// Block until the arm's sensor lane delivers at least one reading,
    /// re-checking the shutdown/cancel flags while waiting.
    async fn await_first_reading(
        &self,
        rx: &mut broadcast::Receiver<WrenchStamped>,
    ) -> Result<Barrier, ReplayError> {
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Ok(reading) => return Ok(Barrier::Reading(reading)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(ReplayError::Channel("sensor lane closed".to_string()));
                    }
                },
                _ = tokio::time::sleep(BARRIER_POLL_INTERVAL) => {
                    if self.shutdown.load(Ordering::Acquire) {
                        return Ok(Barrier::Stopped(StopReason::Shutdown));
                    }
                    if self.cancel.load(Ordering::Acquire) {
                        return Ok(Barrier::Stopped(StopReason::Cancelled));
                    }
                }
            }
        }
    }
}

/// Forward readings from the arm's sensor lane into its shared slot.
/// Single writer; the scheduler is the only other reader.
fn spawn_ingest(
    mut rx: broadcast::Receiver<WrenchStamped>,
    slot: Arc<Mutex<WrenchStamped>>,
    sensor_frame: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(mut reading) => {
                    reading.frame_id = sensor_frame.clone();
                    if let Ok(mut latest) = slot.lock() {
                        *latest = reading;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
