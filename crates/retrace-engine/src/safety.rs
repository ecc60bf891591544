//! External halt aggregation.
//!
//! A halt can arrive at any time on the bus halt lane (singularity, joint
//! limit, or collision detected downstream). The monitor folds those
//! asynchronous notifications into a single sticky flag the scheduler
//! reads non-blocking once per tick. Once set, the flag stays set for
//! the remainder of the run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use retrace_middleware::SignalBus;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

/// Sticky "external halt requested" flag fed by a spawned bus subscriber.
pub struct SafetyMonitor {
    halted: Arc<AtomicBool>,
    listener: JoinHandle<()>,
}

impl SafetyMonitor {
    /// Subscribe to the bus halt lane and start folding notifications
    /// into the flag.
    pub fn spawn(bus: &SignalBus) -> Self {
        let halted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&halted);
        let mut rx = bus.subscribe_halt();

        let listener = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    // Sticky: a later `false` does not clear the flag.
                    Ok(true) => {
                        warn!("external halt notification received");
                        flag.store(true, Ordering::Release);
                    }
                    Ok(false) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { halted, listener }
    }

    /// Non-blocking read, consulted once per tick by the scheduler.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

impl Drop for SafetyMonitor {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bus() -> SignalBus {
        SignalBus::new(&["arm0/ft_sensor".to_string()])
    }

    async fn settle() {
        // Give the listener task a chance to drain the lane.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn starts_not_halted() {
        let bus = bus();
        let monitor = SafetyMonitor::spawn(&bus);
        assert!(!monitor.is_halted());
    }

    #[tokio::test]
    async fn halt_notification_sets_flag() {
        let bus = bus();
        let monitor = SafetyMonitor::spawn(&bus);

        bus.publish_halt(true);
        settle().await;
        assert!(monitor.is_halted());
    }

    #[tokio::test]
    async fn flag_is_sticky_across_false_notifications() {
        let bus = bus();
        let monitor = SafetyMonitor::spawn(&bus);

        bus.publish_halt(true);
        settle().await;
        bus.publish_halt(false);
        settle().await;
        assert!(monitor.is_halted(), "halt must not auto-clear");
    }

    #[tokio::test]
    async fn false_notification_alone_does_not_halt() {
        let bus = bus();
        let monitor = SafetyMonitor::spawn(&bus);

        bus.publish_halt(false);
        settle().await;
        assert!(!monitor.is_halted());
    }
}
