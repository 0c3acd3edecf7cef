//! Payloads delivered by the GNSS, IMU and motor-controller producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Yaw carried by a GNSS fix, tagged by whether the receiver already fused
/// it with its own onboard IMU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "deg", rename_all = "snake_case")]
pub enum GnssYaw {
    /// Receiver-only heading.  Not trusted for the fused pose; the IMU yaw
    /// is published instead.
    Raw(f64),
    /// Heading produced by the receiver's internal orientation fusion
    /// (e.g. dead-reckoning capable receivers).  Published as-is.
    Fused(f64),
}

impl GnssYaw {
    /// The yaw value in degrees regardless of provenance.
    pub fn degrees(self) -> f64 {
        match self {
            GnssYaw::Raw(deg) | GnssYaw::Fused(deg) => deg,
        }
    }

    /// `true` when the receiver fused orientation internally.
    pub fn is_fused(self) -> bool {
        matches!(self, GnssYaw::Fused(_))
    }
}

/// One absolute fix from the GNSS receiver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GnssFix {
    pub x: f64,
    pub y: f64,
    pub height: f64,
    pub yaw: GnssYaw,
    pub timestamp: DateTime<Utc>,
}

/// One raw orientation sample from the IMU (degrees, not drift-corrected).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    pub yaw: f64,
    pub roll: f64,
    pub pitch: f64,
    pub timestamp: DateTime<Utc>,
}

/// One status report from the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometryTick {
    /// Signed distance driven since the previous tick (m, forward positive).
    pub distance: f64,
    /// Current signed speed (m/s).
    pub speed: f64,
    /// Commanded steering angle (degrees), when the controller reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steering_angle: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A single update from any sensor producer, as funnelled to the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SensorUpdate {
    Gnss(GnssFix),
    Imu(ImuSample),
    Odometry(OdometryTick),
}

impl SensorUpdate {
    /// Which producer emitted this update.
    pub fn source(&self) -> SensorSource {
        match self {
            SensorUpdate::Gnss(_) => SensorSource::Gnss,
            SensorUpdate::Imu(_) => SensorSource::Imu,
            SensorUpdate::Odometry(_) => SensorSource::Odometry,
        }
    }

    /// Observation time carried by the payload.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SensorUpdate::Gnss(fix) => fix.timestamp,
            SensorUpdate::Imu(sample) => sample.timestamp,
            SensorUpdate::Odometry(tick) => tick.timestamp,
        }
    }
}

/// The three independent producers feeding the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorSource {
    Gnss,
    Imu,
    Odometry,
}

impl std::fmt::Display for SensorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorSource::Gnss => write!(f, "gnss"),
            SensorSource::Imu => write!(f, "imu"),
            SensorSource::Odometry => write!(f, "odometry"),
        }
    }
}
