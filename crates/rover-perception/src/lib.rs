//! `rover-perception` – the pose-fusion engine.
//!
//! Combines three asynchronous, heterogeneous sources into the single fused
//! pose every motion-control consumer reads: GNSS (absolute position, and
//! yaw when the receiver fused it internally), IMU (relative yaw/roll/pitch
//! that drifts) and wheel odometry (relative distance).
//!
//! # Modules
//!
//! - [`fusion`] – [`FusionPolicy`][fusion::FusionPolicy]: the per-update
//!   decision logic deciding which fused fields are overwritten and from
//!   which source.
//! - [`drift`] – [`YawDriftCorrector`][drift::YawDriftCorrector]: standstill
//!   detection and IMU yaw drift compensation.
//! - [`odometry`] – projection of driven distance onto the current heading.
//! - [`diagnostics`] – [`DiagnosticHub`][diagnostics::DiagnosticHub]: fan-out
//!   of the estimator's known-limitation reports.
//!
//! Everything here is synchronous, allocation-light and free of I/O; the
//! concurrency model lives in `rover-middleware`.

pub mod diagnostics;
pub mod drift;
pub mod fusion;
pub mod odometry;

pub use diagnostics::{CountingSink, DiagnosticHub, DiagnosticSink, DiagnosticSummary, LogSink};
pub use drift::{MotionState, YawDriftCorrector};
pub use fusion::{FusionConfig, FusionPolicy};
pub use odometry::OdometryTarget;
