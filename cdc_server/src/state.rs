use std::sync::Arc;

use cdc_core::{gateway::Gateway, render::FeedMetadata, store::EventStore};

/// Shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub events: EventStore,
    pub metadata: Arc<FeedMetadata>,
}
