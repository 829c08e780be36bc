//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the stage services
//! and any subscribers (the worker's log subscriber, tests).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storyreel_core::types::DbId;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// Something that happened to a pipeline entity.
///
/// Constructed via [`PipelineEvent::new`] and enriched with
/// [`with_source`](PipelineEvent::with_source),
/// [`with_chapter`](PipelineEvent::with_chapter) and
/// [`with_payload`](PipelineEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Dot-separated event name, see [`crate::names`].
    pub event_type: String,

    /// Entity kind the event is about (e.g. `"narration"`, `"video"`).
    pub source_entity_type: Option<String>,

    pub source_entity_id: Option<DbId>,

    /// Chapter the entity belongs to, when there is one.
    pub chapter_id: Option<DbId>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            chapter_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_chapter(mut self, chapter_id: DbId) -> Self {
        self.chapter_id = Some(chapter_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed events are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped if nobody listens.
    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names;

    #[tokio::test]
    async fn subscriber_receives_enriched_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            PipelineEvent::new(names::VIDEO_FAILED)
                .with_source("video", 42)
                .with_chapter(7)
                .with_payload(serde_json::json!({"error": "timed out"})),
        );

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, "video.failed");
        assert_eq!(received.source_entity_type.as_deref(), Some("video"));
        assert_eq!(received.source_entity_id, Some(42));
        assert_eq!(received.chapter_id, Some(7));
        assert_eq!(received.payload["error"], "timed out");
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PipelineEvent::new(names::AUDIO_BATCH_FINISHED));

        assert_eq!(rx1.recv().await.unwrap().event_type, "audio.batch_finished");
        assert_eq!(rx2.recv().await.unwrap().event_type, "audio.batch_finished");
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let bus = EventBus::default();
        bus.publish(PipelineEvent::new(names::NARRATION_COMPLETED));
        assert!(PipelineEvent::new("bare").payload.is_object());
    }
}
