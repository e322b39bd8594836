use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    New,
    Processing,
    Assigned,
    InDelivery,
    Delivered,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Delivered | RequestStatus::Rejected | RequestStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::New => "new",
            RequestStatus::Processing => "processing",
            RequestStatus::Assigned => "assigned",
            RequestStatus::InDelivery => "in_delivery",
            RequestStatus::Delivered => "delivered",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

/// Outcome of the operator's confirmation call to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Confirmed,
    NoAnswer,
    CallbackRequested,
    Declined,
}

/// One row per status transition, append-only, totally ordered by
/// timestamp within a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub request_id: Uuid,
    pub old_status: RequestStatus,
    pub new_status: RequestStatus,
    pub actor_id: Uuid,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub id: Uuid,
    /// Human-facing number, date-prefixed sequential, unique.
    pub number: String,
    pub client_name: String,
    pub client_phone: String,
    pub client_address: String,
    /// Card or payment reference carried for the back office.
    pub payment_ref: Option<String>,
    /// Back-office record id this request mirrors into.
    pub external_id: Option<String>,
    pub status: RequestStatus,
    pub call_outcome: Option<CallOutcome>,
    pub assigned_courier: Option<Uuid>,
    pub branch_id: Uuid,
    /// Operator who created the request.
    pub operator_id: Uuid,
    pub priority: Priority,
    /// Geocoded delivery coordinates, cached after first resolution.
    pub delivery_point: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub history: Vec<StatusHistoryEntry>,
}
