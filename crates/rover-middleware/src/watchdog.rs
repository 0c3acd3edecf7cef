//! [`Watchdog`] – sensor liveness monitor.
//!
//! The estimator calls [`Watchdog::heartbeat`] for the producing
//! [`SensorSource`] on every update it applies.  A source is *silent* once
//! its deadline has passed without a heartbeat.
//!
//! [`Watchdog::newly_silent`] reports each outage exactly once, so the
//! estimator can turn it into a single diagnostic instead of one per tick.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rover_types::SensorSource;

struct SourceEntry {
    last_heartbeat: Instant,
    timeout: Duration,
    reported: bool,
}

/// Per-source heartbeat deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub gnss_timeout: Duration,
    pub imu_timeout: Duration,
    pub odometry_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            gnss_timeout: Duration::from_secs(2),
            imu_timeout: Duration::from_millis(500),
            odometry_timeout: Duration::from_millis(500),
        }
    }
}

impl WatchdogConfig {
    /// Smallest deadline, a sensible polling period for [`Watchdog::newly_silent`].
    pub fn min_timeout(&self) -> Duration {
        self.gnss_timeout
            .min(self.imu_timeout)
            .min(self.odometry_timeout)
    }
}

/// Tracks heartbeats from the sensor producers.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rover_middleware::watchdog::Watchdog;
/// use rover_types::SensorSource;
///
/// let mut wd = Watchdog::new();
/// wd.register(SensorSource::Imu, Duration::from_secs(1));
/// wd.heartbeat(SensorSource::Imu);
///
/// assert!(wd.newly_silent().is_empty());
/// ```
#[derive(Default)]
pub struct Watchdog {
    sources: HashMap<SensorSource, SourceEntry>,
}

impl Watchdog {
    /// Create an empty watchdog with no registered sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a watchdog with all three sources registered.
    pub fn from_config(config: &WatchdogConfig) -> Self {
        let mut wd = Self::new();
        wd.register(SensorSource::Gnss, config.gnss_timeout);
        wd.register(SensorSource::Imu, config.imu_timeout);
        wd.register(SensorSource::Odometry, config.odometry_timeout);
        wd
    }

    /// Register `source` with a maximum heartbeat `timeout`.
    ///
    /// The deadline starts now; re-registering resets it.
    pub fn register(&mut self, source: SensorSource, timeout: Duration) {
        self.sources.insert(
            source,
            SourceEntry {
                last_heartbeat: Instant::now(),
                timeout,
                reported: false,
            },
        );
    }

    /// Record a heartbeat for `source`.  No-op for unregistered sources.
    pub fn heartbeat(&mut self, source: SensorSource) {
        if let Some(entry) = self.sources.get_mut(&source) {
            entry.last_heartbeat = Instant::now();
            entry.reported = false;
        }
    }

    /// Sources that went silent since the last call.  A source is reported
    /// again only after a heartbeat revived it.
    pub fn newly_silent(&mut self) -> Vec<SensorSource> {
        self.sources
            .iter_mut()
            .filter(|(_, entry)| !entry.reported && entry.last_heartbeat.elapsed() > entry.timeout)
            .map(|(source, entry)| {
                entry.reported = true;
                *source
            })
            .collect()
    }
}
