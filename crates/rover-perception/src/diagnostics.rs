//! Fusion diagnostics – surfacing the estimator's known limitations.
//!
//! The fusion rules never reject an update.  When one of the retained gaps
//! is hit (stale GNSS overwrite, unbounded yaw, odometry that never reaches
//! the fused slot) the policy hands a [`FusionDiagnostic`] to its
//! [`DiagnosticHub`], which fans it out to every registered
//! [`DiagnosticSink`] in insertion order.
//!
//! Two built-in sinks are provided:
//! - [`LogSink`] – emits a `tracing` warning.
//! - [`CountingSink`] – bumps shared counters, readable through
//!   [`DiagnosticCounts::snapshot`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rover_types::FusionDiagnostic;
use tracing::warn;

// ────────────────────────────────────────────────────────────────────────────
// Sink trait
// ────────────────────────────────────────────────────────────────────────────

/// Receiver of fusion diagnostics.
///
/// Implementations must be cheap: they run inline on the estimator's update
/// path.
pub trait DiagnosticSink: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Consume one diagnostic.
    fn report(&self, diagnostic: &FusionDiagnostic);
}

// ────────────────────────────────────────────────────────────────────────────
// DiagnosticHub
// ────────────────────────────────────────────────────────────────────────────

/// Fan-out of diagnostics to every registered [`DiagnosticSink`].
///
/// # Example
///
/// ```
/// use rover_perception::diagnostics::{CountingSink, DiagnosticHub};
/// use rover_types::FusionDiagnostic;
///
/// let (sink, counts) = CountingSink::new();
/// let mut hub = DiagnosticHub::new();
/// hub.add_sink(Box::new(sink));
///
/// hub.report(&FusionDiagnostic::OdometryNotPropagated { distance: 0.2 });
/// assert_eq!(counts.snapshot().odometry_not_propagated, 1);
/// ```
#[derive(Default)]
pub struct DiagnosticHub {
    sinks: Vec<Box<dyn DiagnosticSink>>,
}

impl DiagnosticHub {
    /// Create a hub with no sinks; diagnostics are dropped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hub that logs every diagnostic through [`LogSink`].
    pub fn logging() -> Self {
        let mut hub = Self::new();
        hub.add_sink(Box::new(LogSink));
        hub
    }

    /// Register a new sink.  Sinks are invoked in insertion order.
    pub fn add_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.sinks.push(sink);
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver `diagnostic` to every sink.
    pub fn report(&self, diagnostic: &FusionDiagnostic) {
        for sink in &self.sinks {
            sink.report(diagnostic);
        }
    }
}

impl std::fmt::Debug for DiagnosticHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("DiagnosticHub").field("sinks", &names).finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in sinks
// ────────────────────────────────────────────────────────────────────────────

/// Logs every diagnostic as a `tracing` warning.
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn report(&self, diagnostic: &FusionDiagnostic) {
        warn!(target: "rover::fusion", %diagnostic, "fusion diagnostic");
    }
}

/// Shared per-kind diagnostic counters.
#[derive(Debug, Default)]
pub struct DiagnosticCounts {
    stale_gnss_overwrite: AtomicU64,
    yaw_out_of_range: AtomicU64,
    odometry_not_propagated: AtomicU64,
    sensor_silent: AtomicU64,
}

/// Point-in-time copy of [`DiagnosticCounts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticSummary {
    pub stale_gnss_overwrite: u64,
    pub yaw_out_of_range: u64,
    pub odometry_not_propagated: u64,
    pub sensor_silent: u64,
}

impl DiagnosticSummary {
    pub fn total(&self) -> u64 {
        self.stale_gnss_overwrite
            + self.yaw_out_of_range
            + self.odometry_not_propagated
            + self.sensor_silent
    }
}

impl DiagnosticCounts {
    /// Record one occurrence of `diagnostic`.
    pub fn record(&self, diagnostic: &FusionDiagnostic) {
        let counter = match diagnostic {
            FusionDiagnostic::StaleGnssOverwrite { .. } => &self.stale_gnss_overwrite,
            FusionDiagnostic::YawOutOfRange { .. } => &self.yaw_out_of_range,
            FusionDiagnostic::OdometryNotPropagated { .. } => &self.odometry_not_propagated,
            FusionDiagnostic::SensorSilent { .. } => &self.sensor_silent,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticSummary {
        DiagnosticSummary {
            stale_gnss_overwrite: self.stale_gnss_overwrite.load(Ordering::Relaxed),
            yaw_out_of_range: self.yaw_out_of_range.load(Ordering::Relaxed),
            odometry_not_propagated: self.odometry_not_propagated.load(Ordering::Relaxed),
            sensor_silent: self.sensor_silent.load(Ordering::Relaxed),
        }
    }
}

/// Counts diagnostics by kind.  The counters stay readable after the sink
/// has been moved into a policy.
pub struct CountingSink {
    counts: Arc<DiagnosticCounts>,
}

impl CountingSink {
    /// Create a sink together with a handle to its counters.
    pub fn new() -> (Self, Arc<DiagnosticCounts>) {
        let counts = Arc::new(DiagnosticCounts::default());
        (
            Self {
                counts: Arc::clone(&counts),
            },
            counts,
        )
    }
}

impl DiagnosticSink for CountingSink {
    fn name(&self) -> &str {
        "counter"
    }

    fn report(&self, diagnostic: &FusionDiagnostic) {
        self.counts.record(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::{PoseSlot, SensorSource};

    #[test]
    fn empty_hub_drops_diagnostics() {
        let hub = DiagnosticHub::new();
        assert!(hub.is_empty());
        // Must not panic.
        hub.report(&FusionDiagnostic::SensorSilent {
            source: SensorSource::Gnss,
        });
    }

    #[test]
    fn counting_sink_counts_by_kind() {
        let (sink, counts) = CountingSink::new();
        let mut hub = DiagnosticHub::new();
        hub.add_sink(Box::new(sink));

        hub.report(&FusionDiagnostic::YawOutOfRange {
            slot: PoseSlot::Fused,
            yaw: 400.0,
        });
        hub.report(&FusionDiagnostic::YawOutOfRange {
            slot: PoseSlot::Imu,
            yaw: -400.0,
        });
        hub.report(&FusionDiagnostic::SensorSilent {
            source: SensorSource::Imu,
        });

        let summary = counts.snapshot();
        assert_eq!(summary.yaw_out_of_range, 2);
        assert_eq!(summary.sensor_silent, 1);
        assert_eq!(summary.stale_gnss_overwrite, 0);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn every_sink_receives_each_diagnostic() {
        let (first, first_counts) = CountingSink::new();
        let (second, second_counts) = CountingSink::new();
        let mut hub = DiagnosticHub::logging();
        hub.add_sink(Box::new(first));
        hub.add_sink(Box::new(second));
        assert_eq!(hub.len(), 3);

        hub.report(&FusionDiagnostic::OdometryNotPropagated { distance: 1.0 });

        assert_eq!(first_counts.snapshot().odometry_not_propagated, 1);
        assert_eq!(second_counts.snapshot().odometry_not_propagated, 1);
    }

    #[test]
    fn debug_lists_sink_names() {
        let hub = DiagnosticHub::logging();
        assert!(format!("{hub:?}").contains("log"));
    }
}
