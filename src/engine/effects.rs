use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateways::{BackOfficeGateway, NotificationGateway};
use crate::models::request::RequestStatus;
use crate::observability::metrics::Metrics;

/// Fire-and-forget collaborator call queued by the lifecycle after a
/// transition commits. The transition is the source of truth; a failed
/// effect is logged and dropped, never replayed into the state machine.
#[derive(Debug, Clone)]
pub enum SideEffect {
    Notify {
        recipient_phone: String,
        template_key: &'static str,
        params: Vec<(&'static str, String)>,
    },
    SyncBackOffice {
        external_id: String,
        status: RequestStatus,
        comment: Option<String>,
    },
}

/// Event published to WebSocket subscribers on every committed change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    StatusChanged {
        request_id: Uuid,
        old_status: RequestStatus,
        new_status: RequestStatus,
        at: DateTime<Utc>,
    },
    CourierAssigned {
        request_id: Uuid,
        courier_id: Uuid,
        distance_m: Option<f64>,
        at: DateTime<Utc>,
    },
}

pub struct EffectWorker {
    pub notifier: Arc<dyn NotificationGateway>,
    pub back_office: Arc<dyn BackOfficeGateway>,
    pub metrics: Metrics,
    pub collaborator_timeout: Duration,
}

/// Drains the side-effect queue. Each job gets one bounded attempt; a
/// slow or failing collaborator never stalls dispatch decisions.
pub async fn run_effect_worker(worker: EffectWorker, mut effect_rx: mpsc::Receiver<SideEffect>) {
    info!("side-effect worker started");

    while let Some(effect) = effect_rx.recv().await {
        worker.metrics.effects_in_queue.dec();

        let (gateway, result) = match &effect {
            SideEffect::Notify {
                recipient_phone,
                template_key,
                params,
            } => {
                let borrowed: Vec<(&str, String)> = params
                    .iter()
                    .map(|(key, value)| (*key, value.clone()))
                    .collect();
                let call = worker
                    .notifier
                    .notify(recipient_phone, template_key, &borrowed);
                ("notification", timeout(worker.collaborator_timeout, call).await)
            }
            SideEffect::SyncBackOffice {
                external_id,
                status,
                comment,
            } => {
                let call = worker
                    .back_office
                    .sync_status(external_id, *status, comment.as_deref());
                ("back_office", timeout(worker.collaborator_timeout, call).await)
            }
        };

        match result {
            Ok(Ok(())) => {
                worker
                    .metrics
                    .side_effects_total
                    .with_label_values(&[gateway, "ok"])
                    .inc();
            }
            Ok(Err(err)) => {
                worker
                    .metrics
                    .side_effects_total
                    .with_label_values(&[gateway, "error"])
                    .inc();
                warn!(gateway, error = %err, "side effect failed; dropped");
            }
            Err(_) => {
                worker
                    .metrics
                    .side_effects_total
                    .with_label_values(&[gateway, "timeout"])
                    .inc();
                warn!(gateway, "side effect timed out; dropped");
            }
        }
    }

    warn!("side-effect worker stopped: queue channel closed");
}
