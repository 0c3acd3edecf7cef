//! Replay of recorded sensor logs.
//!
//! A log is a JSON-lines file, one [`SensorUpdate`] per line:
//!
//! ```text
//! # drive around the yard
//! {"source":"imu","yaw":10.0,"roll":0.0,"pitch":0.0,"timestamp":"2024-05-01T12:00:00Z"}
//! {"source":"odometry","distance":0.0,"speed":0.0,"timestamp":"2024-05-01T12:00:00.050Z"}
//! {"source":"gnss","x":1.0,"y":2.0,"height":0.0,"yaw":{"kind":"raw","deg":9.0},"timestamp":"2024-05-01T12:00:00.100Z"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use rover_types::{RoverError, SensorUpdate};

use crate::adapter::SensorAdapter;

/// Parse a JSON-lines sensor log.
///
/// # Errors
///
/// [`RoverError::Replay`] naming the 1-based line of the first malformed entry.
pub fn parse_log(raw: &str) -> Result<Vec<SensorUpdate>, RoverError> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line.trim()).map_err(|e| RoverError::Replay {
                line: idx + 1,
                details: e.to_string(),
            })
        })
        .collect()
}

/// A [`SensorAdapter`] that replays a recorded log.
///
/// By default updates are delivered back to back.  With
/// [`ReplayAdapter::paced`] the gaps between consecutive timestamps are
/// reproduced, divided by the given speed-up factor.
#[derive(Debug, Clone)]
pub struct ReplayAdapter {
    id: String,
    updates: Vec<SensorUpdate>,
    speedup: Option<f64>,
}

impl ReplayAdapter {
    /// Wrap already-parsed updates.
    pub fn new(id: impl Into<String>, updates: Vec<SensorUpdate>) -> Self {
        Self {
            id: id.into(),
            updates,
            speedup: None,
        }
    }

    /// Read and parse the log at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RoverError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let updates = parse_log(&raw)?;
        Ok(Self::new(path.display().to_string(), updates))
    }

    /// Reproduce recorded timing, `speedup` times faster than real time.
    /// Non-positive factors disable pacing.
    pub fn paced(mut self, speedup: f64) -> Self {
        self.speedup = (speedup > 0.0).then_some(speedup);
        self
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Delay to wait before each update.  Out-of-order timestamps yield no
    /// delay; a scaled gap too large for a [`Duration`] saturates.
    fn delays(&self) -> Vec<Duration> {
        let Some(speedup) = self.speedup else {
            return vec![Duration::ZERO; self.updates.len()];
        };
        let mut previous: Option<DateTime<Utc>> = None;
        self.updates
            .iter()
            .map(|update| {
                let at = update.timestamp();
                let gap = previous
                    .map(|prev| (at - prev).to_std().unwrap_or(Duration::ZERO))
                    .unwrap_or(Duration::ZERO);
                previous = Some(at);
                Duration::try_from_secs_f64(gap.as_secs_f64() / speedup).unwrap_or(Duration::MAX)
            })
            .collect()
    }
}

#[async_trait]
impl SensorAdapter for ReplayAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn sensor_stream(&self) -> BoxStream<'static, SensorUpdate> {
        let items: Vec<(Duration, SensorUpdate)> =
            self.delays().into_iter().zip(self.updates.clone()).collect();
        stream::iter(items)
            .then(|(delay, update)| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                update
            })
            .boxed()
    }
}
