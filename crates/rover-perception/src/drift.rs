//! IMU yaw drift correction.
//!
//! Raw IMU yaw drifts slowly.  Without GNSS heading the only ground truth
//! available is that yaw cannot change while the vehicle stands still, so
//! any change of the raw value during standstill is drift.
//!
//! The corrector is a two-state machine:
//!
//! | State | Entered when | Published yaw |
//! |---|---|---|
//! | Standstill | `|speed| < threshold` | frozen at the value when standstill began |
//! | Moving | `|speed| >= threshold` | `raw + yaw_offset` |
//!
//! Drift observed during a standstill run is committed into the offset only
//! on the standstill → moving transition.  The sample that reports motion is
//! already a moving sample and does not contribute to the committed drift.
//! The offset is never wrapped.

use tracing::debug;

/// Speed magnitude below which the vehicle is considered stationary.
pub const DEFAULT_STANDSTILL_SPEED: f64 = 0.05;

/// Motion classification used by [`YawDriftCorrector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Standstill,
    Moving,
}

/// Stateful standstill detector and yaw drift compensator.
///
/// # Example
///
/// ```rust
/// use rover_perception::drift::YawDriftCorrector;
///
/// let mut corrector = YawDriftCorrector::default();
///
/// // Three stationary samples drifting by 2°, then motion begins.
/// assert_eq!(corrector.correct(10.0, 0.0), 10.0);
/// assert_eq!(corrector.correct(12.0, 0.0), 10.0);
/// assert_eq!(corrector.correct(12.0, 0.0), 10.0);
/// assert_eq!(corrector.correct(12.0, 1.0), 10.0);
/// assert_eq!(corrector.yaw_offset(), -2.0);
/// ```
#[derive(Debug, Clone)]
pub struct YawDriftCorrector {
    standstill_speed: f64,
    yaw_offset: f64,
    standstill_at_last_call: bool,
    yaw_at_standstill_start: f64,
    drift_since_standstill: f64,
}

impl Default for YawDriftCorrector {
    fn default() -> Self {
        Self::new(DEFAULT_STANDSTILL_SPEED)
    }
}

impl YawDriftCorrector {
    /// Create a corrector with zero offset.  `standstill_speed` is taken as a
    /// magnitude.
    pub fn new(standstill_speed: f64) -> Self {
        Self::with_offset(standstill_speed, 0.0)
    }

    /// Create a corrector starting from a known `yaw_offset` (degrees).
    pub fn with_offset(standstill_speed: f64, yaw_offset: f64) -> Self {
        Self {
            standstill_speed: standstill_speed.abs(),
            yaw_offset,
            standstill_at_last_call: false,
            yaw_at_standstill_start: 0.0,
            drift_since_standstill: 0.0,
        }
    }

    /// Classify `speed` against the standstill threshold.
    pub fn classify(&self, speed: f64) -> MotionState {
        if speed.abs() < self.standstill_speed {
            MotionState::Standstill
        } else {
            MotionState::Moving
        }
    }

    /// Feed one raw yaw sample (degrees) observed at `speed` and return the
    /// corrected yaw to publish.
    pub fn correct(&mut self, raw_yaw: f64, speed: f64) -> f64 {
        let standstill = self.classify(speed) == MotionState::Standstill;

        match (self.standstill_at_last_call, standstill) {
            (false, true) => {
                self.yaw_at_standstill_start = raw_yaw;
                self.drift_since_standstill = 0.0;
                debug!(raw_yaw, "standstill began");
            }
            (true, true) => {
                self.drift_since_standstill = self.yaw_at_standstill_start - raw_yaw;
            }
            (true, false) => {
                self.yaw_offset += self.drift_since_standstill;
                debug!(
                    drift = self.drift_since_standstill,
                    yaw_offset = self.yaw_offset,
                    "motion resumed, drift committed"
                );
                self.drift_since_standstill = 0.0;
            }
            (false, false) => {}
        }
        self.standstill_at_last_call = standstill;

        if standstill {
            self.yaw_at_standstill_start + self.yaw_offset
        } else {
            raw_yaw + self.yaw_offset
        }
    }

    /// Accumulated correction added to raw yaw (degrees).
    pub fn yaw_offset(&self) -> f64 {
        self.yaw_offset
    }

    /// Drift observed in the current standstill run, not yet committed.
    pub fn drift_since_standstill(&self) -> f64 {
        self.drift_since_standstill
    }

    /// Motion state recorded by the most recent [`correct`](Self::correct) call.
    pub fn motion_state(&self) -> MotionState {
        if self.standstill_at_last_call {
            MotionState::Standstill
        } else {
            MotionState::Moving
        }
    }

    pub fn standstill_speed(&self) -> f64 {
        self.standstill_speed
    }

    /// Forget all history, including the accumulated offset.
    pub fn reset(&mut self) {
        *self = Self::new(self.standstill_speed);
    }
}
