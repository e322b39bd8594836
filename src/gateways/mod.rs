use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::courier::GeoPoint;
use crate::models::request::RequestStatus;

/// Sends a templated SMS/email to a client or courier. Failures are
/// logged and dropped; a missed notification never blocks dispatch.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(
        &self,
        recipient_phone: &str,
        template_key: &str,
        params: &[(&str, String)],
    ) -> Result<(), DispatchError>;
}

/// Resolves a free-form address to coordinates.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, DispatchError>;
}

/// Mirrors lifecycle transitions into the bank back office, best effort.
#[async_trait]
pub trait BackOfficeGateway: Send + Sync {
    async fn sync_status(
        &self,
        external_id: &str,
        status: RequestStatus,
        comment: Option<&str>,
    ) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    PermissionChecked {
        actor_id: Uuid,
        role: &'static str,
        resource: &'static str,
        action: &'static str,
        allowed: bool,
    },
    StatusChanged {
        request_id: Uuid,
        old_status: RequestStatus,
        new_status: RequestStatus,
        actor_id: Uuid,
    },
}

/// Compliance trail. The core records into it but never depends on its
/// availability to complete an operation.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Default gateways log what a real integration would send. Geocoding
/// has no meaningful stand-in, so it reports itself unavailable.
pub struct LoggingNotifier;

#[async_trait]
impl NotificationGateway for LoggingNotifier {
    async fn notify(
        &self,
        recipient_phone: &str,
        template_key: &str,
        params: &[(&str, String)],
    ) -> Result<(), DispatchError> {
        tracing::info!(
            recipient = recipient_phone,
            template = template_key,
            ?params,
            "notification sent (logging gateway)"
        );
        Ok(())
    }
}

pub struct LoggingBackOffice;

#[async_trait]
impl BackOfficeGateway for LoggingBackOffice {
    async fn sync_status(
        &self,
        external_id: &str,
        status: RequestStatus,
        comment: Option<&str>,
    ) -> Result<(), DispatchError> {
        tracing::info!(
            external_id,
            status = status.as_str(),
            comment,
            "back-office status synced (logging gateway)"
        );
        Ok(())
    }
}

pub struct LoggingAuditSink;

impl AuditSink for LoggingAuditSink {
    fn record(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "audit", %json, "audit event"),
            Err(err) => tracing::warn!(error = %err, "failed to serialize audit event"),
        }
    }
}

pub struct UnconfiguredGeocoder;

#[async_trait]
impl GeocodingProvider for UnconfiguredGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, DispatchError> {
        Err(DispatchError::CollaboratorUnavailable(format!(
            "no geocoding provider configured (address: {address})"
        )))
    }
}
