//! Estimator actor.
//!
//! One Tokio task owns the [`VehicleState`] and the [`FusionPolicy`].
//! Producers never touch the state directly: they send [`SensorUpdate`]
//! messages through an mpsc inbox, and the task applies them strictly in
//! delivery order, so every handler's read-modify-write of the Pose Store
//! stays atomic without any lock.
//!
//! Consumers read the fused pose either as a latest-value snapshot
//! ([`EstimatorHandle::fused_pose`]) or as a stream of
//! [`EventPayload::FusedPose`] events on [`Topic::FusedPose`].
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use rover_middleware::estimator::{Estimator, EstimatorConfig};
//! use rover_middleware::EventBus;
//! use rover_perception::{FusionConfig, FusionPolicy};
//! use rover_types::{GnssFix, GnssYaw, SensorUpdate, VehicleState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), rover_types::RoverError> {
//! let handle = Estimator::spawn(
//!     VehicleState::default(),
//!     FusionPolicy::new(FusionConfig::default()),
//!     EventBus::default(),
//!     EstimatorConfig::default(),
//! );
//!
//! handle.send(SensorUpdate::Gnss(GnssFix {
//!     x: 3.0, y: 4.0, height: 0.0,
//!     yaw: GnssYaw::Fused(90.0),
//!     timestamp: Utc::now(),
//! })).await?;
//!
//! let report = handle.shutdown().await?;
//! assert_eq!(report.state.fused_pose().yaw, 90.0);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rover_perception::FusionPolicy;
use rover_types::{
    Event, EventPayload, FusionDiagnostic, Pose, RoverError, SensorUpdate, VehicleState,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Topic};
use crate::watchdog::{Watchdog, WatchdogConfig};

/// Event source name used on the bus.
pub const SOURCE: &str = "rover-middleware::estimator";

/// Lower bound for the watchdog polling period.
const MIN_WATCHDOG_PERIOD: Duration = Duration::from_millis(10);

/// Runtime parameters of the estimator task.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorConfig {
    /// Inbox capacity; producers wait when it is full.
    pub inbox_capacity: usize,
    pub watchdog: WatchdogConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: 256,
            watchdog: WatchdogConfig::default(),
        }
    }
}

/// Final state handed back by [`EstimatorHandle::shutdown`].
#[derive(Debug, Clone)]
pub struct EstimatorReport {
    pub state: VehicleState,
    /// Accumulated IMU yaw correction at shutdown (degrees).
    pub yaw_offset: f64,
    /// Number of updates applied.
    pub applied: u64,
}

/// Entry point for spawning the estimator task.
pub struct Estimator;

impl Estimator {
    /// Spawn the estimator on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn(
        state: VehicleState,
        policy: FusionPolicy,
        bus: EventBus,
        config: EstimatorConfig,
    ) -> EstimatorHandle {
        let (tx, rx) = mpsc::channel(config.inbox_capacity.max(1));
        let (fused_tx, fused_rx) = watch::channel(state.fused_pose());

        let task = tokio::spawn(run(state, policy, bus, config, rx, fused_tx));

        EstimatorHandle {
            inbox: tx,
            fused: fused_rx,
            task,
        }
    }
}

/// Producer/consumer handle to a running estimator.
pub struct EstimatorHandle {
    inbox: mpsc::Sender<SensorUpdate>,
    fused: watch::Receiver<Pose>,
    task: JoinHandle<EstimatorReport>,
}

impl EstimatorHandle {
    /// Queue one update.  Waits while the inbox is full.
    pub async fn send(&self, update: SensorUpdate) -> Result<(), RoverError> {
        self.inbox
            .send(update)
            .await
            .map_err(|_| RoverError::Channel("estimator has stopped".to_string()))
    }

    /// A sender for a producer task.  The estimator stops only after every
    /// sender, including this handle's, has been dropped.
    pub fn inbox(&self) -> mpsc::Sender<SensorUpdate> {
        self.inbox.clone()
    }

    /// Latest fused pose.
    pub fn fused_pose(&self) -> Pose {
        *self.fused.borrow()
    }

    /// A receiver notified on every fused-pose change.
    pub fn watch_fused(&self) -> watch::Receiver<Pose> {
        self.fused.clone()
    }

    /// Close the inbox, let the task drain queued updates and return its
    /// final state.
    pub async fn shutdown(self) -> Result<EstimatorReport, RoverError> {
        let EstimatorHandle { inbox, task, .. } = self;
        drop(inbox);
        task.await
            .map_err(|e| RoverError::Channel(format!("estimator task failed: {e}")))
    }
}

async fn run(
    mut state: VehicleState,
    mut policy: FusionPolicy,
    bus: EventBus,
    config: EstimatorConfig,
    mut inbox: mpsc::Receiver<SensorUpdate>,
    fused_tx: watch::Sender<Pose>,
) -> EstimatorReport {
    let mut watchdog = Watchdog::from_config(&config.watchdog);
    let mut tick = tokio::time::interval(config.watchdog.min_timeout().max(MIN_WATCHDOG_PERIOD));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut applied = 0u64;

    info!("estimator started");

    loop {
        tokio::select! {
            maybe = inbox.recv() => {
                let Some(update) = maybe else { break };
                watchdog.heartbeat(update.source());
                let fused_changed = policy.apply(&mut state, update);
                applied += 1;

                if fused_changed {
                    let pose = state.fused_pose();
                    fused_tx.send_replace(pose);
                    let event = Event::new(SOURCE, EventPayload::FusedPose(pose));
                    if let Err(e) = bus.publish_to(Topic::FusedPose, event) {
                        warn!(error = %e, "failed to publish fused pose");
                    }
                }
            }
            _ = tick.tick() => {
                for source in watchdog.newly_silent() {
                    policy
                        .diagnostics()
                        .report(&FusionDiagnostic::SensorSilent { source });
                }
            }
        }
    }

    debug!(applied, yaw_offset = policy.yaw_offset(), "estimator inbox closed");
    info!("estimator stopped");

    EstimatorReport {
        yaw_offset: policy.yaw_offset(),
        applied,
        state,
    }
}
