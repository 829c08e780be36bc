//! Collaborators shared by every stage service.

use std::sync::Arc;

use storyreel_db::store::PipelineStore;
use storyreel_events::{EventBus, PipelineEvent};
use storyreel_providers::ProviderSet;
use storyreel_storage::BlobStore;
use tokio::sync::Semaphore;

use crate::config::PipelineConfig;

pub struct PipelineContext {
    pub store: Arc<dyn PipelineStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub providers: ProviderSet,
    pub events: Arc<EventBus>,
    pub config: PipelineConfig,
    /// Provider call budget shared by every stage.
    pub(crate) limiter: Semaphore,
}

impl PipelineContext {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        blobs: Arc<dyn BlobStore>,
        providers: ProviderSet,
        events: Arc<EventBus>,
        config: PipelineConfig,
    ) -> Arc<Self> {
        let limiter = Semaphore::new(config.max_concurrent_provider_calls.max(1));
        Arc::new(Self {
            store,
            blobs,
            providers,
            events,
            config,
            limiter,
        })
    }

    pub(crate) fn publish(&self, event: PipelineEvent) {
        self.events.publish(event);
    }
}
