//! Odometry integration: relative distance → absolute planar displacement.
//!
//! The displacement is projected along the current heading using the
//! clockwise-positive yaw convention of the GNSS/IMU sources:
//!
//! ```text
//! dx = cos(-yaw) · distance
//! dy = sin(-yaw) · distance
//! ```

use std::str::FromStr;

use rover_types::Pose;
use serde::{Deserialize, Serialize};

/// Where odometry-integrated position ends up.
///
/// Historically the integrated position only reached the IMU slot, leaving
/// consumers of the fused pose without it until the next GNSS fix.  The
/// choice is explicit here; [`OdometryTarget::RawOnly`] keeps that behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OdometryTarget {
    /// Integrate into the IMU slot only.
    #[default]
    RawOnly,
    /// Integrate into the IMU slot and apply the same displacement to the
    /// fused slot.
    Fused,
}

impl std::fmt::Display for OdometryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OdometryTarget::RawOnly => write!(f, "raw_only"),
            OdometryTarget::Fused => write!(f, "fused"),
        }
    }
}

impl FromStr for OdometryTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw_only" | "raw" => Ok(OdometryTarget::RawOnly),
            "fused" => Ok(OdometryTarget::Fused),
            other => Err(format!("unknown odometry target '{other}'")),
        }
    }
}

/// Displacement `(dx, dy)` for driving `distance` metres at `yaw_deg`.
pub fn displacement(yaw_deg: f64, distance: f64) -> (f64, f64) {
    let yaw_rad = yaw_deg.to_radians();
    ((-yaw_rad).cos() * distance, (-yaw_rad).sin() * distance)
}

/// Advance `pose` by `distance` along its own yaw and return the applied
/// displacement.  Only `x` and `y` change.
pub fn integrate(pose: &mut Pose, distance: f64) -> (f64, f64) {
    let (dx, dy) = displacement(pose.yaw, distance);
    pose.x += dx;
    pose.y += dy;
    (dx, dy)
}
