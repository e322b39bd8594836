use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Foot,
    Bicycle,
    Motorbike,
    Car,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub branch_id: Uuid,
    pub vehicle: VehicleType,
    pub online: bool,
    /// Live position. `online == false` implies this is `None`; a stale
    /// position is never surfaced as live.
    pub position: Option<GeoPoint>,
    pub accuracy_m: Option<f64>,
    pub last_position_at: Option<DateTime<Utc>>,
    pub daily_capacity: u8,
    /// Requests currently in `assigned` or `in_delivery` on this courier.
    pub current_load: u8,
    pub rating: f64,
    pub updated_at: DateTime<Utc>,
}

impl Courier {
    pub fn has_free_slot(&self) -> bool {
        self.current_load < self.daily_capacity
    }
}

/// Read-model row for the live-positions listing.
#[derive(Debug, Clone, Serialize)]
pub struct CourierPosition {
    pub courier_id: Uuid,
    pub name: String,
    pub branch_id: Uuid,
    pub position: GeoPoint,
    pub accuracy_m: Option<f64>,
    pub last_position_at: DateTime<Utc>,
}
