//! Writes every published event to the tracing log.

use tokio::sync::broadcast;

use crate::bus::PipelineEvent;

/// Background subscriber that logs events until the bus is dropped.
pub struct EventLogger;

impl EventLogger {
    pub async fn run(mut receiver: broadcast::Receiver<PipelineEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    tracing::info!(
                        event_type = %event.event_type,
                        entity_type = event.source_entity_type.as_deref().unwrap_or("-"),
                        entity_id = ?event.source_entity_id,
                        chapter_id = ?event.chapter_id,
                        payload = %event.payload,
                        "Pipeline event"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event bus closed, event logger shutting down");
                    break;
                }
            }
        }
    }
}
