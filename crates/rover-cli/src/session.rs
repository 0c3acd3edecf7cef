//! A replay session: one estimator fed by one recorded log.

use std::sync::Arc;

use rover_middleware::estimator::SOURCE;
use rover_middleware::{
    BusSink, Estimator, EstimatorReport, EventBus, ReplayAdapter, SensorAdapter, Topic, forward,
};
use rover_perception::{CountingSink, DiagnosticHub, DiagnosticSummary, FusionPolicy};
use rover_types::{Event, EventPayload, Pose, RoverError};
use tokio::sync::Notify;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::config::Config;

/// What a finished (or interrupted) replay leaves behind.
#[derive(Debug)]
pub struct ReplayOutcome {
    pub report: EstimatorReport,
    pub diagnostics: DiagnosticSummary,
    /// Fused poses received by the session's subscriber.
    pub published: u64,
    /// `true` when `stop` fired before the log was exhausted.
    pub interrupted: bool,
}

/// Replay `adapter` through a fresh estimator built from `cfg`.
///
/// `on_pose` runs on a separate task for every fused pose published on the
/// bus.  Notifying `stop` ends the replay early; updates already queued are
/// still applied before the final state is returned.
pub async fn run<F>(
    cfg: &Config,
    adapter: ReplayAdapter,
    stop: Arc<Notify>,
    mut on_pose: F,
) -> Result<ReplayOutcome, RoverError>
where
    F: FnMut(&Pose) + Send + 'static,
{
    let bus = EventBus::new(cfg.bus_capacity());
    let mut poses = bus.subscribe_to(Topic::FusedPose);

    let (counting, counts) = CountingSink::new();
    let mut hub = DiagnosticHub::logging();
    hub.add_sink(Box::new(counting));
    hub.add_sink(Box::new(BusSink::new(bus.clone(), SOURCE)));
    let policy = FusionPolicy::with_diagnostics(cfg.fusion(), hub);

    // The bus moves into the estimator; the subscriber sees `Closed` once
    // the estimator task has finished.
    let handle = Estimator::spawn(cfg.vehicle_state(), policy, bus, cfg.estimator());

    let printer = tokio::spawn(async move {
        let mut published = 0u64;
        loop {
            match poses.recv().await {
                Ok(Event {
                    payload: EventPayload::FusedPose(pose),
                    ..
                }) => {
                    published += 1;
                    on_pose(&pose);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "fused-pose subscriber fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
        published
    });

    info!(log = adapter.id(), updates = adapter.len(), "replay started");

    let interrupted = tokio::select! {
        result = forward(&adapter, handle.inbox()) => {
            let forwarded = result?;
            info!(forwarded, "replay log exhausted");
            false
        }
        _ = stop.notified() => {
            warn!("replay interrupted");
            true
        }
    };

    let report = handle.shutdown().await?;
    let published = printer
        .await
        .map_err(|e| RoverError::Channel(format!("fused-pose subscriber failed: {e}")))?;

    Ok(ReplayOutcome {
        diagnostics: counts.snapshot(),
        report,
        published,
        interrupted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_middleware::replay::parse_log;
    use rover_perception::OdometryTarget;
    use std::io::Write;
    use std::sync::Mutex;

    const DRIVE: &str = r#"
# parked: IMU drifts 2 degrees while the wheels stand still
{"source":"odometry","distance":0.0,"speed":0.0,"timestamp":"2024-05-01T12:00:00Z"}
{"source":"imu","yaw":10.0,"roll":0.0,"pitch":0.0,"timestamp":"2024-05-01T12:00:00.010Z"}
{"source":"imu","yaw":12.0,"roll":0.0,"pitch":0.0,"timestamp":"2024-05-01T12:00:00.020Z"}
# pull away
{"source":"odometry","distance":0.0,"speed":1.0,"timestamp":"2024-05-01T12:00:00.030Z"}
{"source":"imu","yaw":12.0,"roll":1.0,"pitch":2.0,"timestamp":"2024-05-01T12:00:00.040Z"}
{"source":"gnss","x":3.0,"y":4.0,"height":0.5,"yaw":{"kind":"raw","deg":90.0},"timestamp":"2024-05-01T12:00:00.050Z"}
{"source":"odometry","distance":1.0,"speed":1.0,"timestamp":"2024-05-01T12:00:00.060Z"}
"#;

    fn quiet_config() -> Config {
        Config {
            gnss_timeout_ms: 60_000,
            imu_timeout_ms: 60_000,
            odometry_timeout_ms: 60_000,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn replays_log_and_collects_fused_poses() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(DRIVE.as_bytes())?;
        let adapter = ReplayAdapter::from_path(file.path())?;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let outcome = run(&quiet_config(), adapter, Arc::new(Notify::new()), move |pose| {
            sink.lock().unwrap().push(*pose)
        })
        .await?;

        assert!(!outcome.interrupted);
        assert_eq!(outcome.report.applied, 7);
        assert_eq!(outcome.report.yaw_offset, -2.0);

        // Only the GNSS fix touches the fused slot with the raw-only target.
        assert_eq!(outcome.published, 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!((seen[0].x, seen[0].y, seen[0].yaw), (3.0, 4.0, 10.0));
        assert_eq!((seen[0].roll, seen[0].pitch), (1.0, 2.0));

        // The trailing odometry tick moved the IMU slot only.
        assert_eq!(outcome.diagnostics.odometry_not_propagated, 1);
        assert_eq!(outcome.diagnostics.total(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn fused_target_publishes_odometry_motion() -> Result<(), Box<dyn std::error::Error>> {
        let cfg = Config {
            odometry_target: OdometryTarget::Fused,
            ..quiet_config()
        };
        let adapter = ReplayAdapter::new("drive", parse_log(DRIVE)?);

        let outcome = run(&cfg, adapter, Arc::new(Notify::new()), |_| {}).await?;

        // Every odometry tick republishes the fused pose, plus the GNSS fix.
        assert_eq!(outcome.published, 4);
        assert_eq!(outcome.diagnostics.total(), 0);
        let fused = outcome.report.state.fused_pose();
        // Heading 10 degrees, projected with the negated-yaw convention.
        assert!((fused.x - (3.0 + 10f64.to_radians().cos())).abs() < 1e-9);
        assert!((fused.y - (4.0 - 10f64.to_radians().sin())).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn zero_capacity_config_file_still_replays() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "bus_capacity = 0\ngnss_timeout_ms = 60000\nimu_timeout_ms = 60000\nodometry_timeout_ms = 60000\n",
        )?;
        let cfg = crate::config::load_from(&path)?.ok_or("config missing")?;
        let adapter = ReplayAdapter::new("drive", parse_log(DRIVE)?);

        let outcome = run(&cfg, adapter, Arc::new(Notify::new()), |_| {}).await?;

        assert!(!outcome.interrupted);
        assert_eq!(outcome.report.applied, 7);
        Ok(())
    }

    #[tokio::test]
    async fn stop_interrupts_a_paced_replay() -> Result<(), Box<dyn std::error::Error>> {
        let slow = r#"
{"source":"imu","yaw":1.0,"roll":0.0,"pitch":0.0,"timestamp":"2024-05-01T12:00:00Z"}
{"source":"imu","yaw":2.0,"roll":0.0,"pitch":0.0,"timestamp":"2024-05-01T13:00:00Z"}
"#;
        let adapter = ReplayAdapter::new("slow", parse_log(slow)?).paced(1.0);
        let stop = Arc::new(Notify::new());
        stop.notify_one();

        let outcome = run(&quiet_config(), adapter, stop, |_| {}).await?;

        assert!(outcome.interrupted);
        assert!(outcome.report.applied <= 1);
        Ok(())
    }
}
