//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others, including the estimator that publishes.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::FusedPose`] | Every change of the fused slot |
//! | [`Topic::Diagnostics`] | Known-limitation reports from the fusion policy and watchdog |

use rover_perception::DiagnosticSink;
use rover_types::{Event, FusionDiagnostic, RoverError};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Fused pose snapshots for path following, braking and telemetry.
    FusedPose,
    /// Fusion diagnostics and silent-sensor alerts.
    Diagnostics,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    fused_pose: broadcast::Sender<Event>,
    diagnostics: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero, like [`broadcast::channel`].
    pub fn new(capacity: usize) -> Self {
        let (fused_pose, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        Self {
            fused_pose,
            diagnostics,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when no subscribers are currently listening on the
    /// topic; consumers come and go and the estimator must keep running.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, RoverError> {
        let sender = self.topic_sender(topic);
        if sender.receiver_count() == 0 {
            trace!(?topic, "no subscribers, event dropped");
            return Ok(0);
        }
        sender
            .send(event)
            .map_err(|e| RoverError::Channel(format!("event bus send error on {topic:?}: {e}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::FusedPose => &self.fused_pose,
            Topic::Diagnostics => &self.diagnostics,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

// ---------------------------------------------------------------------------
// Diagnostic sink
// ---------------------------------------------------------------------------

/// Forwards fusion diagnostics onto [`Topic::Diagnostics`].
pub struct BusSink {
    bus: EventBus,
    source: String,
}

impl BusSink {
    pub fn new(bus: EventBus, source: impl Into<String>) -> Self {
        Self {
            bus,
            source: source.into(),
        }
    }
}

impl DiagnosticSink for BusSink {
    fn name(&self) -> &str {
        "bus"
    }

    fn report(&self, diagnostic: &FusionDiagnostic) {
        let event = Event::new(
            self.source.clone(),
            rover_types::EventPayload::Diagnostic(diagnostic.clone()),
        );
        // Publishing only fails when the channel is closed, which cannot
        // happen while `self.bus` holds a sender.
        let _ = self.bus.publish_to(Topic::Diagnostics, event);
    }
}
