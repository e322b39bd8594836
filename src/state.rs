use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::effects::{DispatchEvent, SideEffect};
use crate::gateways::{
    AuditSink, BackOfficeGateway, GeocodingProvider, LoggingAuditSink, LoggingBackOffice,
    LoggingNotifier, NotificationGateway, UnconfiguredGeocoder,
};
use crate::models::courier::Courier;
use crate::models::location::LocationSample;
use crate::models::request::DeliveryRequest;
use crate::observability::metrics::Metrics;

/// Everything a unit of work touches. Per-key DashMap guards give the
/// per-entity serialization the lifecycle and capacity checks rely on;
/// unrelated entities never contend.
pub struct AppState {
    pub config: Config,
    pub couriers: DashMap<Uuid, Courier>,
    pub requests: DashMap<Uuid, DeliveryRequest>,
    /// Request-number uniqueness index: number -> request id.
    pub request_numbers: DashMap<String, Uuid>,
    /// Append-only position history per courier, pruned by age.
    pub samples: DashMap<Uuid, Vec<LocationSample>>,
    pub effect_tx: mpsc::Sender<SideEffect>,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
    pub notifier: Arc<dyn NotificationGateway>,
    pub geocoder: Arc<dyn GeocodingProvider>,
    pub back_office: Arc<dyn BackOfficeGateway>,
    pub audit: Arc<dyn AuditSink>,
    request_seq: AtomicU64,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<SideEffect>) {
        Self::with_gateways(
            config,
            Arc::new(LoggingNotifier),
            Arc::new(UnconfiguredGeocoder),
            Arc::new(LoggingBackOffice),
            Arc::new(LoggingAuditSink),
        )
    }

    pub fn with_gateways(
        config: Config,
        notifier: Arc<dyn NotificationGateway>,
        geocoder: Arc<dyn GeocodingProvider>,
        back_office: Arc<dyn BackOfficeGateway>,
        audit: Arc<dyn AuditSink>,
    ) -> (Self, mpsc::Receiver<SideEffect>) {
        let (effect_tx, effect_rx) = mpsc::channel(config.effect_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        (
            Self {
                config,
                couriers: DashMap::new(),
                requests: DashMap::new(),
                request_numbers: DashMap::new(),
                samples: DashMap::new(),
                effect_tx,
                events_tx,
                metrics: Metrics::new(),
                notifier,
                geocoder,
                back_office,
                audit,
                request_seq: AtomicU64::new(1),
            },
            effect_rx,
        )
    }

    /// Date-prefixed sequential request number, e.g. `20260827-0041`.
    pub fn next_request_number(&self) -> String {
        let seq = self.request_seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:04}", Utc::now().format("%Y%m%d"), seq)
    }

    /// Queues a side effect without blocking the committed transition.
    pub fn queue_effect(&self, effect: SideEffect) {
        match self.effect_tx.try_send(effect) {
            Ok(()) => self.metrics.effects_in_queue.inc(),
            Err(err) => tracing::warn!(error = %err, "side-effect queue full; effect dropped"),
        }
    }

    pub fn publish_event(&self, event: DispatchEvent) {
        // no subscribers is fine
        let _ = self.events_tx.send(event);
    }
}
