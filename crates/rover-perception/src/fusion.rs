//! Pose Fusion Policy.
//!
//! Decides, on every sensor update, which fields of the fused slot to
//! overwrite and from which source.  There are three entry points, one per
//! producer, plus the consumer accessor:
//!
//! | Entry point | Reads | Writes |
//! |---|---|---|
//! | [`FusionPolicy::on_gnss_update`] | GNSS, IMU, Fused | GNSS, Fused |
//! | [`FusionPolicy::on_imu_update`] | IMU, speed | IMU |
//! | [`FusionPolicy::on_odometry_update`] | IMU (+ Fused) | IMU (+ Fused) |
//! | [`FusionPolicy::fused_pose`] | Fused | – |
//!
//! GNSS is always the position/height authority when it updates.  Yaw comes
//! from the receiver only when it fused orientation internally
//! ([`GnssYaw::Fused`]); otherwise the drift-corrected IMU yaw is published.
//! Roll and pitch always come from the IMU.
//!
//! The fused slot reflects whichever source wrote it last.  No staleness or
//! jump checks gate an update; such cases are only reported through the
//! policy's [`DiagnosticHub`].
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use rover_perception::fusion::{FusionConfig, FusionPolicy};
//! use rover_types::{GnssFix, GnssYaw, ImuSample, VehicleState};
//!
//! let mut state = VehicleState::default();
//! let mut policy = FusionPolicy::new(FusionConfig::default());
//!
//! policy.apply_imu_sample(&mut state, ImuSample {
//!     yaw: 45.0, roll: 1.0, pitch: -0.5, timestamp: Utc::now(),
//! });
//! policy.on_gnss_update(&mut state, GnssFix {
//!     x: 10.0, y: 20.0, height: 1.5,
//!     yaw: GnssYaw::Raw(50.0),
//!     timestamp: Utc::now(),
//! });
//!
//! let fused = policy.fused_pose(&state);
//! assert_eq!((fused.x, fused.y), (10.0, 20.0));
//! assert_eq!(fused.yaw, 45.0); // IMU yaw, not the raw GNSS heading
//! ```

use rover_types::{
    FusionDiagnostic, GnssFix, GnssYaw, ImuSample, OdometryTick, Pose, PoseSlot, SensorUpdate,
    VehicleState,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::diagnostics::{DiagnosticHub, DiagnosticSink};
use crate::drift::{DEFAULT_STANDSTILL_SPEED, MotionState, YawDriftCorrector};
use crate::odometry::{self, OdometryTarget};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunables of the fusion policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Speed magnitude below which the vehicle counts as stationary.
    pub standstill_speed: f64,
    /// Where odometry-integrated position is written.
    pub odometry_target: OdometryTarget,
    /// Published yaw magnitude (degrees) above which a
    /// [`FusionDiagnostic::YawOutOfRange`] is reported.
    pub yaw_warn_limit: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            standstill_speed: DEFAULT_STANDSTILL_SPEED,
            odometry_target: OdometryTarget::default(),
            yaw_warn_limit: 360.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FusionPolicy
// ────────────────────────────────────────────────────────────────────────────

/// Rule-based pose fusion for one vehicle.
///
/// Owns the drift-correction history; construct one per vehicle and route
/// every sensor update of that vehicle through it, in delivery order.
#[derive(Debug)]
pub struct FusionPolicy {
    config: FusionConfig,
    drift: YawDriftCorrector,
    diagnostics: DiagnosticHub,
}

impl FusionPolicy {
    /// Create a policy whose diagnostics are logged via `tracing`.
    pub fn new(config: FusionConfig) -> Self {
        Self::with_diagnostics(config, DiagnosticHub::logging())
    }

    /// Create a policy reporting into `diagnostics`.
    pub fn with_diagnostics(config: FusionConfig, diagnostics: DiagnosticHub) -> Self {
        Self {
            config,
            drift: YawDriftCorrector::new(config.standstill_speed),
            diagnostics,
        }
    }

    /// Create a policy reporting into a single `sink`.
    pub fn with_sink(config: FusionConfig, sink: Box<dyn DiagnosticSink>) -> Self {
        let mut diagnostics = DiagnosticHub::new();
        diagnostics.add_sink(sink);
        Self::with_diagnostics(config, diagnostics)
    }

    /// Replace the drift corrector, e.g. to resume from a known offset.
    ///
    /// The corrector's standstill threshold replaces the configured one, so
    /// [`FusionPolicy::config`] keeps describing the policy that runs.
    pub fn with_drift_corrector(mut self, drift: YawDriftCorrector) -> Self {
        self.config.standstill_speed = drift.standstill_speed();
        self.drift = drift;
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// The diagnostic fan-out, for reporting conditions detected outside the
    /// policy (e.g. silent producers).
    pub fn diagnostics(&self) -> &DiagnosticHub {
        &self.diagnostics
    }

    /// Mutable access to the diagnostic fan-out, for registering sinks after
    /// construction.
    pub fn diagnostics_mut(&mut self) -> &mut DiagnosticHub {
        &mut self.diagnostics
    }

    /// Accumulated IMU yaw correction (degrees).
    pub fn yaw_offset(&self) -> f64 {
        self.drift.yaw_offset()
    }

    /// `true` when the last IMU update saw the vehicle stationary.
    pub fn is_standstill(&self) -> bool {
        self.drift.motion_state() == MotionState::Standstill
    }

    // ------------------------------------------------------------------------
    // GNSS
    // ------------------------------------------------------------------------

    /// Store `fix` in the GNSS slot and republish the fused pose.
    ///
    /// - position and height: from GNSS
    /// - yaw: from GNSS for [`GnssYaw::Fused`], else the corrected IMU yaw
    /// - roll and pitch: from the IMU slot
    /// - timestamp: the fix's
    ///
    /// A fix older than the current fused estimate still overwrites it.
    pub fn on_gnss_update(&mut self, state: &mut VehicleState, fix: GnssFix) {
        let mut gnss = state.position(PoseSlot::Gnss);
        gnss.set_xy(fix.x, fix.y);
        gnss.height = fix.height;
        gnss.yaw = fix.yaw.degrees();
        gnss.timestamp = fix.timestamp;
        state.set_position(PoseSlot::Gnss, gnss);

        self.fuse_gnss(state, fix.yaw);
    }

    fn fuse_gnss(&mut self, state: &mut VehicleState, yaw: GnssYaw) {
        let gnss = state.position(PoseSlot::Gnss);
        let imu = state.position(PoseSlot::Imu);
        let mut fused = state.position(PoseSlot::Fused);

        if gnss.timestamp < fused.timestamp {
            self.diagnostics.report(&FusionDiagnostic::StaleGnssOverwrite {
                gnss: gnss.timestamp,
                fused: fused.timestamp,
            });
        }

        fused.set_xy(gnss.x, gnss.y);
        fused.height = gnss.height;
        fused.yaw = match yaw {
            GnssYaw::Fused(_) => gnss.yaw,
            GnssYaw::Raw(_) => imu.yaw,
        };
        fused.roll = imu.roll;
        fused.pitch = imu.pitch;
        fused.timestamp = gnss.timestamp;

        trace!(x = fused.x, y = fused.y, yaw = fused.yaw, "fused pose from gnss");
        self.check_yaw(PoseSlot::Fused, fused.yaw);
        state.set_position(PoseSlot::Fused, fused);
    }

    // ------------------------------------------------------------------------
    // IMU
    // ------------------------------------------------------------------------

    /// Drift-correct the yaw the IMU producer last wrote into the IMU slot.
    ///
    /// The slot must hold a fresh raw sample: calling this twice without a
    /// new sample in between corrects an already-corrected yaw.  Use
    /// [`apply_imu_sample`](Self::apply_imu_sample) to write and correct in
    /// one step.
    pub fn on_imu_update(&mut self, state: &mut VehicleState) {
        let mut imu = state.position(PoseSlot::Imu);
        imu.yaw = self.drift.correct(imu.yaw, state.speed);
        self.check_yaw(PoseSlot::Imu, imu.yaw);
        state.set_position(PoseSlot::Imu, imu);
    }

    /// Write a raw IMU sample into the IMU slot, then correct it.
    pub fn apply_imu_sample(&mut self, state: &mut VehicleState, sample: ImuSample) {
        let mut imu = state.position(PoseSlot::Imu);
        imu.yaw = sample.yaw;
        imu.roll = sample.roll;
        imu.pitch = sample.pitch;
        imu.timestamp = sample.timestamp;
        state.set_position(PoseSlot::Imu, imu);

        self.on_imu_update(state);
    }

    // ------------------------------------------------------------------------
    // Odometry
    // ------------------------------------------------------------------------

    /// Integrate `distance` (m, forward positive) along the corrected IMU yaw.
    ///
    /// The IMU slot always receives the displacement.  With
    /// [`OdometryTarget::Fused`] the fused slot is shifted by the same
    /// amount; with [`OdometryTarget::RawOnly`] a
    /// [`FusionDiagnostic::OdometryNotPropagated`] is reported instead.
    pub fn on_odometry_update(&mut self, state: &mut VehicleState, distance: f64) {
        let mut imu = state.position(PoseSlot::Imu);
        let (dx, dy) = odometry::integrate(&mut imu, distance);
        state.set_position(PoseSlot::Imu, imu);

        match self.config.odometry_target {
            OdometryTarget::Fused => {
                let mut fused = state.position(PoseSlot::Fused);
                fused.x += dx;
                fused.y += dy;
                state.set_position(PoseSlot::Fused, fused);
            }
            OdometryTarget::RawOnly if distance != 0.0 => {
                self.diagnostics.report(&FusionDiagnostic::OdometryNotPropagated { distance });
            }
            OdometryTarget::RawOnly => {}
        }
    }

    /// Apply a motor-controller report: update speed and steering, stamp the
    /// odometry slot, then integrate the driven distance.
    ///
    /// A reported steering angle is clamped to the vehicle's mechanical limit.
    pub fn apply_odometry_tick(&mut self, state: &mut VehicleState, tick: OdometryTick) {
        state.speed = tick.speed;
        if let Some(angle) = tick.steering_angle {
            let limit = state.max_steering_angle.abs();
            state.steering_angle = angle.clamp(-limit, limit);
        }

        let mut odom = state.position(PoseSlot::Odometry);
        odom.timestamp = tick.timestamp;
        state.set_position(PoseSlot::Odometry, odom);

        self.on_odometry_update(state, tick.distance);

        if self.config.odometry_target == OdometryTarget::Fused {
            let mut fused = state.position(PoseSlot::Fused);
            fused.timestamp = fused.timestamp.max(tick.timestamp);
            state.set_position(PoseSlot::Fused, fused);
        }
    }

    // ------------------------------------------------------------------------
    // Dispatch & consumers
    // ------------------------------------------------------------------------

    /// Route one producer update to its entry point.
    ///
    /// Returns `true` when the fused slot was written.
    pub fn apply(&mut self, state: &mut VehicleState, update: SensorUpdate) -> bool {
        match update {
            SensorUpdate::Gnss(fix) => {
                self.on_gnss_update(state, fix);
                true
            }
            SensorUpdate::Imu(sample) => {
                self.apply_imu_sample(state, sample);
                false
            }
            SensorUpdate::Odometry(tick) => {
                self.apply_odometry_tick(state, tick);
                self.config.odometry_target == OdometryTarget::Fused
            }
        }
    }

    /// The pose every downstream consumer reads.
    pub fn fused_pose(&self, state: &VehicleState) -> Pose {
        state.fused_pose()
    }

    fn check_yaw(&self, slot: PoseSlot, yaw: f64) {
        if yaw.abs() > self.config.yaw_warn_limit {
            self.diagnostics.report(&FusionDiagnostic::YawOutOfRange { slot, yaw });
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CountingSink, DiagnosticCounts};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn policy_with(config: FusionConfig) -> (FusionPolicy, Arc<DiagnosticCounts>) {
        let (sink, counts) = CountingSink::new();
        (FusionPolicy::with_sink(config, Box::new(sink)), counts)
    }

    fn imu(yaw: f64, at: DateTime<Utc>) -> ImuSample {
        ImuSample {
            yaw,
            roll: 1.25,
            pitch: -0.75,
            timestamp: at,
        }
    }

    fn fix(x: f64, y: f64, yaw: GnssYaw, at: DateTime<Utc>) -> GnssFix {
        GnssFix {
            x,
            y,
            height: 2.0,
            yaw,
            timestamp: at,
        }
    }

    #[test]
    fn fresh_state_has_identity_fused_pose() {
        let (policy, _) = policy_with(FusionConfig::default());
        let state = VehicleState::default();
        assert_eq!(policy.fused_pose(&state), Pose::identity());
    }

    #[test]
    fn gnss_fused_mode_copies_gnss_yaw() {
        let (mut policy, _) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();
        policy.apply_imu_sample(&mut state, imu(10.0, t(0)));
        policy.on_gnss_update(&mut state, fix(4.0, 5.0, GnssYaw::Fused(77.0), t(1)));

        let gnss = state.position(PoseSlot::Gnss);
        let imu_slot = state.position(PoseSlot::Imu);
        let fused = policy.fused_pose(&state);
        assert_eq!(
            (fused.x, fused.y, fused.height, fused.yaw),
            (gnss.x, gnss.y, gnss.height, gnss.yaw)
        );
        assert_eq!((fused.roll, fused.pitch), (imu_slot.roll, imu_slot.pitch));
        assert_eq!(fused.timestamp, t(1));
    }

    #[test]
    fn gnss_raw_mode_publishes_imu_yaw() {
        let (mut policy, _) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();
        state.speed = 1.0;
        policy.apply_imu_sample(&mut state, imu(123.0, t(0)));
        policy.on_gnss_update(&mut state, fix(1.0, 1.0, GnssYaw::Raw(5.0), t(1)));

        let fused = policy.fused_pose(&state);
        assert_eq!(fused.yaw, 123.0);
        assert_eq!(state.position(PoseSlot::Gnss).yaw, 5.0);
    }

    #[test]
    fn gnss_update_keeps_gnss_slot_roll_and_pitch() {
        let (mut policy, _) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();
        let mut gnss = state.position(PoseSlot::Gnss);
        gnss.roll = 9.0;
        state.set_position(PoseSlot::Gnss, gnss);

        policy.on_gnss_update(&mut state, fix(0.0, 0.0, GnssYaw::Raw(0.0), t(0)));
        assert_eq!(state.position(PoseSlot::Gnss).roll, 9.0);
        assert_eq!(state.fused_pose().roll, 0.0);
    }

    #[test]
    fn stale_gnss_still_overwrites_and_is_reported() {
        let (mut policy, counts) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();
        policy.on_gnss_update(&mut state, fix(1.0, 1.0, GnssYaw::Fused(0.0), t(10)));
        policy.on_gnss_update(&mut state, fix(-3.0, 2.0, GnssYaw::Fused(0.0), t(5)));

        let fused = state.fused_pose();
        assert_eq!((fused.x, fused.y), (-3.0, 2.0));
        assert_eq!(counts.snapshot().stale_gnss_overwrite, 1);
    }

    #[test]
    fn position_jumps_are_not_filtered() {
        let (mut policy, counts) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();
        policy.on_gnss_update(&mut state, fix(0.0, 0.0, GnssYaw::Fused(0.0), t(0)));
        policy.on_gnss_update(&mut state, fix(5_000.0, 0.0, GnssYaw::Fused(180.0), t(1)));
        assert_eq!(state.fused_pose().x, 5_000.0);
        assert_eq!(counts.snapshot().total(), 0);
    }

    #[test]
    fn imu_update_corrects_slot_in_place() {
        let (mut policy, _) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();
        let speeds = [0.0, 0.0, 0.0, 1.0];
        let raws = [10.0, 12.0, 12.0, 12.0];
        let mut published = Vec::new();
        for (speed, raw) in speeds.into_iter().zip(raws) {
            state.speed = speed;
            policy.apply_imu_sample(&mut state, imu(raw, t(0)));
            published.push(state.position(PoseSlot::Imu).yaw);
        }
        assert_eq!(published, vec![10.0, 10.0, 10.0, 10.0]);
        assert_eq!(policy.yaw_offset(), -2.0);
        assert!(!policy.is_standstill());
        // The fused slot is untouched by IMU updates.
        assert_eq!(state.fused_pose(), Pose::identity());
    }

    #[test]
    fn on_imu_update_reads_raw_value_from_slot() {
        let (mut policy, _) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();

        let mut slot = state.position(PoseSlot::Imu);
        slot.yaw = 42.0;
        state.set_position(PoseSlot::Imu, slot);
        policy.on_imu_update(&mut state);

        assert_eq!(state.position(PoseSlot::Imu).yaw, 42.0);
        assert!(policy.is_standstill());
    }

    #[test]
    fn odometry_raw_only_moves_imu_slot_and_reports() {
        let (mut policy, counts) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();
        state.speed = 1.0;
        policy.apply_imu_sample(&mut state, imu(90.0, t(0)));
        policy.on_odometry_update(&mut state, 1.0);

        let slot = state.position(PoseSlot::Imu);
        assert!(slot.x.abs() < 1e-12);
        assert!((slot.y + 1.0).abs() < 1e-12);
        assert_eq!(state.fused_pose(), Pose::identity());
        assert_eq!(counts.snapshot().odometry_not_propagated, 1);
    }

    #[test]
    fn odometry_zero_distance_is_silent() {
        let (mut policy, counts) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();
        policy.on_odometry_update(&mut state, 0.0);
        assert_eq!(counts.snapshot().total(), 0);
    }

    #[test]
    fn odometry_fused_target_shifts_fused_slot() {
        let config = FusionConfig {
            odometry_target: OdometryTarget::Fused,
            ..FusionConfig::default()
        };
        let (mut policy, counts) = policy_with(config);
        let mut state = VehicleState::default();
        state.speed = 1.0;
        policy.on_gnss_update(&mut state, fix(10.0, 10.0, GnssYaw::Fused(0.0), t(0)));
        policy.apply_imu_sample(&mut state, imu(0.0, t(0)));
        policy.on_odometry_update(&mut state, 2.0);

        let fused = state.fused_pose();
        assert!((fused.x - 12.0).abs() < 1e-12);
        assert!((fused.y - 10.0).abs() < 1e-12);
        assert_eq!(counts.snapshot().odometry_not_propagated, 0);
    }

    #[test]
    fn odometry_round_trip_restores_position() {
        let (mut policy, _) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();
        state.speed = 1.0;
        policy.apply_imu_sample(&mut state, imu(-213.5, t(0)));
        let before = state.position(PoseSlot::Imu);

        policy.on_odometry_update(&mut state, 3.3);
        policy.on_odometry_update(&mut state, -3.3);

        let after = state.position(PoseSlot::Imu);
        assert!((after.x - before.x).abs() < 1e-9);
        assert!((after.y - before.y).abs() < 1e-9);
    }

    #[test]
    fn odometry_tick_updates_speed_and_timestamps() {
        let config = FusionConfig {
            odometry_target: OdometryTarget::Fused,
            ..FusionConfig::default()
        };
        let (mut policy, _) = policy_with(config);
        let mut state = VehicleState::default();
        let at = t(3) + Duration::milliseconds(250);
        let changed = policy.apply(
            &mut state,
            SensorUpdate::Odometry(OdometryTick {
                distance: 0.5,
                speed: 1.2,
                steering_angle: None,
                timestamp: at,
            }),
        );

        assert!(changed);
        assert_eq!(state.speed, 1.2);
        assert_eq!(state.position(PoseSlot::Odometry).timestamp, at);
        assert_eq!(state.fused_pose().timestamp, at);
        assert!((state.fused_pose().x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn odometry_tick_steering_is_clamped_and_optional() {
        let (mut policy, _) = policy_with(FusionConfig::default());
        let mut state = VehicleState::new(0.5, 30.0);
        let tick = |steering_angle| OdometryTick {
            distance: 0.0,
            speed: 0.0,
            steering_angle,
            timestamp: t(1),
        };

        policy.apply_odometry_tick(&mut state, tick(Some(-12.5)));
        assert_eq!(state.steering_angle, -12.5);

        policy.apply_odometry_tick(&mut state, tick(Some(80.0)));
        assert_eq!(state.steering_angle, 30.0);

        // A tick without steering keeps the last reported angle.
        policy.apply_odometry_tick(&mut state, tick(None));
        assert_eq!(state.steering_angle, 30.0);
    }

    #[test]
    fn drift_corrector_threshold_replaces_configured_one() {
        let (policy, _) = policy_with(FusionConfig::default());
        let policy = policy.with_drift_corrector(YawDriftCorrector::with_offset(0.25, 4.0));
        assert_eq!(policy.config().standstill_speed, 0.25);
        assert_eq!(policy.yaw_offset(), 4.0);
    }

    #[test]
    fn apply_reports_fused_changes_per_source() {
        let (mut policy, _) = policy_with(FusionConfig::default());
        let mut state = VehicleState::default();
        assert!(!policy.apply(&mut state, SensorUpdate::Imu(imu(1.0, t(0)))));
        assert!(policy.apply(
            &mut state,
            SensorUpdate::Gnss(fix(0.0, 0.0, GnssYaw::Raw(0.0), t(0)))
        ));
        assert!(!policy.apply(
            &mut state,
            SensorUpdate::Odometry(OdometryTick {
                distance: 0.1,
                speed: 0.5,
                steering_angle: None,
                timestamp: t(1),
            })
        ));
    }

    #[test]
    fn unbounded_yaw_is_reported_not_wrapped() {
        let config = FusionConfig {
            yaw_warn_limit: 180.0,
            ..FusionConfig::default()
        };
        let (mut policy, counts) = policy_with(config);
        let mut state = VehicleState::default();
        state.speed = 1.0;
        policy.apply_imu_sample(&mut state, imu(270.0, t(0)));
        policy.on_gnss_update(&mut state, fix(0.0, 0.0, GnssYaw::Raw(0.0), t(1)));

        assert_eq!(state.fused_pose().yaw, 270.0);
        let summary = counts.snapshot();
        assert_eq!(summary.yaw_out_of_range, 2); // IMU slot + fused slot
    }

    #[test]
    fn resumed_offset_applies_to_first_sample() {
        let (policy, _) = policy_with(FusionConfig::default());
        let mut policy = policy.with_drift_corrector(YawDriftCorrector::with_offset(0.05, 3.0));
        let mut state = VehicleState::default();
        state.speed = 2.0;
        policy.apply_imu_sample(&mut state, imu(10.0, t(0)));
        assert_eq!(state.position(PoseSlot::Imu).yaw, 13.0);
    }
}
