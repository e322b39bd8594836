use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw position report row, append-only. Kept even when the report does
/// not move the live position, so routes can be reconstructed later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSample {
    pub courier_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: Option<f64>,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Result of ingesting one position report.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PositionReport {
    /// Whether the report moved the courier's live position. A rejected
    /// report is still recorded as a sample.
    pub accepted: bool,
    /// Distance from the previous live position, if one existed.
    pub distance_moved_m: Option<f64>,
}

/// Derived online state of a courier.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Activity {
    pub online: bool,
    pub seconds_since_update: Option<i64>,
}
