pub mod access;
pub mod config;
pub mod events;
pub mod models;
pub mod realtime;
pub mod routes;
pub mod schema;
pub mod services;
pub mod socket;
pub mod storage;
pub mod store;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::AppConfig;
use crate::realtime::RealtimeHub;
use crate::services::{ConversationService, MessageService};
use crate::storage::AttachmentStorage;
use crate::store::Store;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn Store>,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub hub: RealtimeHub,
    /// `None` when no object storage is configured; uploads are then refused.
    pub storage: Option<Arc<dyn AttachmentStorage>>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the services around one store and one hub.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        hub: RealtimeHub,
        events: Option<events::EventPublisher>,
        storage: Option<Arc<dyn AttachmentStorage>>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            conversations: ConversationService::new(store.clone(), hub.clone()),
            messages: MessageService::new(store.clone(), hub.clone(), events),
            config,
            store,
            hub,
            storage,
            metrics_handle,
        }
    }
}
