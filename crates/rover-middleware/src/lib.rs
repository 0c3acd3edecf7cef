//! `rover-middleware` – The Nervous System
//!
//! Moves sensor updates into the fusion engine and fused poses out of it,
//! serialising every access to the shared vehicle state through one task.
//!
//! # Modules
//!
//! - [`estimator`] – [`Estimator`]: the actor that owns the
//!   [`VehicleState`][rover_types::VehicleState] and applies updates in
//!   delivery order.
//! - [`bus`] – topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`watchdog`] – [`Watchdog`]: per-producer liveness deadlines.
//! - [`adapter`] – the [`SensorAdapter`] trait every producer implements.
//! - [`replay`] – [`ReplayAdapter`]: replays recorded JSON-lines sensor logs.

pub mod adapter;
pub mod bus;
pub mod estimator;
pub mod replay;
pub mod watchdog;

pub use adapter::{SensorAdapter, forward};
pub use bus::{BusSink, EventBus, Topic, TopicReceiver};
pub use estimator::{Estimator, EstimatorConfig, EstimatorHandle, EstimatorReport};
pub use replay::ReplayAdapter;
pub use watchdog::{Watchdog, WatchdogConfig};
