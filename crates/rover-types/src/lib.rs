//! `rover-types` – shared data model for the rover pose estimator.
//!
//! - [`pose`] – [`Pose`], [`PoseSlot`], the [`PoseStore`] and the shared
//!   [`VehicleState`].
//! - [`sensor`] – payloads produced by the GNSS, IMU and motor-controller
//!   drivers ([`SensorUpdate`]).
//!
//! The crate root also defines the bus [`Event`] envelope, the
//! [`FusionDiagnostic`] taxonomy and the workspace-wide [`RoverError`].

pub mod pose;
pub mod sensor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use pose::{Pose, PoseSlot, PoseStore, VehicleState};
pub use sensor::{GnssFix, GnssYaw, ImuSample, OdometryTick, SensorSource, SensorUpdate};

/// Unified event wrapper for the estimator's event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "rover-middleware::estimator"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// The fused slot changed.
    FusedPose(Pose),
    /// A known estimator limitation was hit.
    Diagnostic(FusionDiagnostic),
}

/// Known correctness gaps of the rule-based fusion pipeline.
///
/// These are reported, never corrected: the estimator keeps updating a
/// moving vehicle's state rather than halting on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FusionDiagnostic {
    /// A GNSS fix older than the current fused estimate overwrote its position.
    StaleGnssOverwrite {
        gnss: DateTime<Utc>,
        fused: DateTime<Utc>,
    },
    /// A published yaw left the configured magnitude limit (yaw is never wrapped).
    YawOutOfRange { slot: PoseSlot, yaw: f64 },
    /// An odometry increment was integrated into a raw slot only; consumers of
    /// the fused pose will not see it until the next GNSS update.
    OdometryNotPropagated { distance: f64 },
    /// A producer has been silent for longer than its deadline.
    SensorSilent { source: SensorSource },
}

impl std::fmt::Display for FusionDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FusionDiagnostic::StaleGnssOverwrite { gnss, fused } => write!(
                f,
                "stale GNSS fix ({gnss}) overwrote fresher fused pose ({fused})"
            ),
            FusionDiagnostic::YawOutOfRange { slot, yaw } => {
                write!(f, "{slot} yaw {yaw:.2}° outside warning limit")
            }
            FusionDiagnostic::OdometryNotPropagated { distance } => write!(
                f,
                "odometry increment of {distance:.3} m not propagated to fused pose"
            ),
            FusionDiagnostic::SensorSilent { source } => write!(f, "{source} producer is silent"),
        }
    }
}

/// Global error type for the estimator's plumbing (the fusion rules themselves
/// are infallible).
#[derive(Error, Debug)]
pub enum RoverError {
    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Replay Error on line {line}: {details}")]
    Replay { line: usize, details: String },

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "rover-middleware::estimator",
            EventPayload::FusedPose(Pose {
                x: 1.0,
                y: 2.0,
                yaw: 90.0,
                ..Pose::default()
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        match back.payload {
            EventPayload::FusedPose(pose) => assert_eq!(pose.yaw, 90.0),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn diagnostic_display_names_the_slot() {
        let d = FusionDiagnostic::YawOutOfRange {
            slot: PoseSlot::Imu,
            yaw: 721.0,
        };
        assert!(d.to_string().contains("imu"));
        assert!(d.to_string().contains("721.00"));
    }

    #[test]
    fn rover_error_display() {
        let err = RoverError::Replay {
            line: 7,
            details: "missing field `yaw`".to_string(),
        };
        assert!(err.to_string().contains("line 7"));

        let io: RoverError = std::io::Error::new(std::io::ErrorKind::NotFound, "log.jsonl").into();
        assert!(io.to_string().starts_with("I/O Error"));
    }
}
