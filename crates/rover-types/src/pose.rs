//! Pose records and the per-vehicle Pose Store.
//!
//! A vehicle carries four [`Pose`] slots, one per provenance tag
//! ([`PoseSlot`]).  Producers overwrite whole slots; there is no partial
//! field update, so callers that want to keep unrelated fields must
//! `get` → mutate → `set`.
//!
//! # Example
//!
//! ```rust
//! use rover_types::{PoseSlot, VehicleState};
//!
//! let mut state = VehicleState::default();
//!
//! let mut gnss = state.position(PoseSlot::Gnss);
//! gnss.x = 12.5;
//! gnss.y = -3.0;
//! state.set_position(PoseSlot::Gnss, gnss);
//!
//! assert_eq!(state.position(PoseSlot::Gnss).x, 12.5);
//! // Slots are independent.
//! assert_eq!(state.fused_pose().x, 0.0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// A vehicle state estimate at one instant.
///
/// Positions are metres in a local planar (ENU-like) frame.  Angles are
/// degrees; yaw is measured clockwise from the reference axis used by the
/// GNSS/IMU source and is never wrapped into a canonical range.
///
/// Any subset of fields may be stale: producers only refresh the fields they
/// own and keep the rest from the previous value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub height: f64,
    pub yaw: f64,
    pub roll: f64,
    pub pitch: f64,
    /// Time of observation or estimate.  The Unix epoch marks a slot that
    /// has never been written.
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
}

impl Pose {
    /// Identity pose: every field zero, timestamp at the Unix epoch.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Overwrite the planar position.
    pub fn set_xy(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PoseSlot
// ────────────────────────────────────────────────────────────────────────────

/// Provenance tag selecting one of the four pose records of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseSlot {
    /// Last fix reported by the GNSS receiver.
    Gnss,
    /// IMU orientation (drift-corrected) and, by default, odometry-integrated position.
    Imu,
    /// Raw odometry record owned by the motor-controller driver.
    Odometry,
    /// The single authoritative pose every consumer reads.
    Fused,
}

impl PoseSlot {
    /// All slots in storage order.
    pub const ALL: [PoseSlot; 4] = [
        PoseSlot::Gnss,
        PoseSlot::Imu,
        PoseSlot::Odometry,
        PoseSlot::Fused,
    ];

    fn index(self) -> usize {
        match self {
            PoseSlot::Gnss => 0,
            PoseSlot::Imu => 1,
            PoseSlot::Odometry => 2,
            PoseSlot::Fused => 3,
        }
    }
}

impl std::fmt::Display for PoseSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoseSlot::Gnss => write!(f, "gnss"),
            PoseSlot::Imu => write!(f, "imu"),
            PoseSlot::Odometry => write!(f, "odometry"),
            PoseSlot::Fused => write!(f, "fused"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PoseStore
// ────────────────────────────────────────────────────────────────────────────

/// Passive record of the four provenance-tagged poses.
///
/// No validation happens here; a write is visible to the next read as soon
/// as [`PoseStore::set`] returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseStore {
    slots: [Pose; 4],
}

impl PoseStore {
    /// Create a store with every slot at [`Pose::identity`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Last pose written to `slot`, or the identity pose if never written.
    pub fn get(&self, slot: PoseSlot) -> Pose {
        self.slots[slot.index()]
    }

    /// Overwrite `slot` wholesale.
    pub fn set(&mut self, slot: PoseSlot, pose: Pose) {
        self.slots[slot.index()] = pose;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// VehicleState
// ────────────────────────────────────────────────────────────────────────────

/// Shared per-vehicle state: the Pose Store plus the scalar attributes the
/// integration math needs.
///
/// Only the fusion policy writes [`PoseSlot::Fused`]; each raw slot belongs
/// to its producer (or to the policy acting on that producer's behalf).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub poses: PoseStore,
    /// Current signed speed (m/s), as reported by the motor controller.
    pub speed: f64,
    /// Distance between front and rear axle (m).
    pub axis_distance: f64,
    /// Current steering angle (degrees).
    pub steering_angle: f64,
    /// Mechanical steering limit (degrees).
    pub max_steering_angle: f64,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            poses: PoseStore::new(),
            speed: 0.0,
            axis_distance: 0.5,
            steering_angle: 0.0,
            max_steering_angle: 30.0,
        }
    }
}

impl VehicleState {
    /// Create a state with the given steering geometry and all poses at identity.
    pub fn new(axis_distance: f64, max_steering_angle: f64) -> Self {
        Self {
            axis_distance,
            max_steering_angle,
            ..Self::default()
        }
    }

    /// Read the pose stored in `slot`.
    pub fn position(&self, slot: PoseSlot) -> Pose {
        self.poses.get(slot)
    }

    /// Overwrite the pose stored in `slot`.
    pub fn set_position(&mut self, slot: PoseSlot, pose: Pose) {
        self.poses.set(slot, pose);
    }

    /// The authoritative pose read by path following, braking and telemetry.
    pub fn fused_pose(&self) -> Pose {
        self.poses.get(PoseSlot::Fused)
    }

}
