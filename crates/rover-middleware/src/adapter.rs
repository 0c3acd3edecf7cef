//! The Sensor Adapter Pattern.
//!
//! The estimator never speaks to serial ports, I2C buses or receivers.
//! Drivers implement [`SensorAdapter`] and translate their hardware traffic
//! into a stream of [`SensorUpdate`] values; [`forward`] pumps that stream
//! into the estimator's inbox in order.
//!
//! - [`ReplayAdapter`][crate::replay::ReplayAdapter] – replays a recorded
//!   JSON-lines sensor log.

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use rover_types::{RoverError, SensorUpdate};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Every sensor producer must implement this trait.
///
/// # Contract
///
/// * `id` – a stable identifier used in logs.
/// * `sensor_stream` – a live stream of updates in delivery order.  The
///   stream ends when the producer has nothing more to deliver.
#[async_trait]
pub trait SensorAdapter: Send + Sync {
    fn id(&self) -> &str;

    /// Translate producer traffic into a stream of [`SensorUpdate`] values.
    async fn sensor_stream(&self) -> BoxStream<'static, SensorUpdate>;
}

/// Pump every update of `adapter` into `inbox`.
///
/// Returns the number of forwarded updates once the stream ends, or
/// [`RoverError::Channel`] if the estimator stopped first.
pub async fn forward(
    adapter: &dyn SensorAdapter,
    inbox: mpsc::Sender<SensorUpdate>,
) -> Result<u64, RoverError> {
    let mut stream = adapter.sensor_stream().await;
    let mut forwarded = 0u64;
    info!(adapter = adapter.id(), "sensor adapter started");

    while let Some(update) = stream.next().await {
        inbox.send(update).await.map_err(|_| {
            RoverError::Channel(format!(
                "estimator inbox closed while forwarding from '{}'",
                adapter.id()
            ))
        })?;
        forwarded += 1;
    }

    debug!(adapter = adapter.id(), forwarded, "sensor stream ended");
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures_util::stream;
    use rover_types::ImuSample;

    struct FixedAdapter(Vec<SensorUpdate>);

    #[async_trait]
    impl SensorAdapter for FixedAdapter {
        fn id(&self) -> &str {
            "fixed"
        }

        async fn sensor_stream(&self) -> BoxStream<'static, SensorUpdate> {
            stream::iter(self.0.clone()).boxed()
        }
    }

    fn imu(yaw: f64) -> SensorUpdate {
        SensorUpdate::Imu(ImuSample {
            yaw,
            roll: 0.0,
            pitch: 0.0,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn forward_preserves_order() {
        let adapter = FixedAdapter(vec![imu(1.0), imu(2.0), imu(3.0)]);
        let (tx, mut rx) = mpsc::channel(8);

        let n = forward(&adapter, tx).await.unwrap();
        assert_eq!(n, 3);

        let mut yaws = Vec::new();
        while let Some(SensorUpdate::Imu(sample)) = rx.recv().await {
            yaws.push(sample.yaw);
        }
        assert_eq!(yaws, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn forward_fails_when_inbox_closed() {
        let adapter = FixedAdapter(vec![imu(1.0)]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = forward(&adapter, tx).await.unwrap_err();
        assert!(matches!(err, RoverError::Channel(_)));
    }
}
