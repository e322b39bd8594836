use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::access::{self, Action, Resource};
use crate::engine::matcher;
use crate::error::DispatchError;
use crate::gateways::AuditEvent;
use crate::lifecycle;
use crate::models::actor::{ActorContext, Role};
use crate::models::courier::{Courier, CourierPosition, GeoPoint, VehicleType};
use crate::models::location::{Activity, PositionReport};
use crate::models::request::{CallOutcome, DeliveryRequest, Priority, RequestStatus};
use crate::state::AppState;
use crate::tracker;

#[derive(Debug, Deserialize)]
pub struct NewCourier {
    pub name: String,
    pub phone: String,
    pub branch_id: Uuid,
    pub vehicle: VehicleType,
    pub daily_capacity: u8,
    pub rating: f64,
}

#[derive(Debug, Deserialize)]
pub struct NewRequest {
    pub client_name: String,
    pub client_phone: String,
    pub client_address: String,
    pub payment_ref: Option<String>,
    pub external_id: Option<String>,
    pub branch_id: Uuid,
    pub priority: Priority,
    /// Operator-chosen number; generated when absent.
    pub number: Option<String>,
    pub delivery_point: Option<GeoPoint>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestFilters {
    pub status: Option<RequestStatus>,
    pub branch_id: Option<Uuid>,
}

/// The single surface callers go through. Every operation takes an
/// explicit actor and clears access control before touching anything.
#[derive(Clone)]
pub struct DispatchService {
    state: Arc<AppState>,
}

impl DispatchService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    fn authorize(
        &self,
        actor: &ActorContext,
        resource: Resource,
        action: Action,
    ) -> Result<(), DispatchError> {
        let allowed = access::check_permission(actor.role, resource, action);
        self.state.audit.record(AuditEvent::PermissionChecked {
            actor_id: actor.id,
            role: actor.role.as_str(),
            resource: resource.as_str(),
            action: action.as_str(),
            allowed,
        });
        if allowed {
            Ok(())
        } else {
            Err(DispatchError::PermissionDenied(format!(
                "role {} may not {} {}",
                actor.role.as_str(),
                action.as_str(),
                resource.as_str()
            )))
        }
    }

    /// Visibility is part of authorization: an actor who may not see a
    /// request may not act on it either.
    fn check_visible(
        &self,
        actor: &ActorContext,
        request: &DeliveryRequest,
    ) -> Result<(), DispatchError> {
        if access::visibility(actor).allows(request) {
            Ok(())
        } else {
            Err(DispatchError::PermissionDenied(format!(
                "request {} is not visible to this actor",
                request.number
            )))
        }
    }

    pub fn register_courier(
        &self,
        actor: &ActorContext,
        new: NewCourier,
    ) -> Result<Courier, DispatchError> {
        self.authorize(actor, Resource::Courier, Action::Create)?;

        if new.name.trim().is_empty() {
            return Err(DispatchError::Validation("name cannot be empty".to_string()));
        }
        if new.daily_capacity == 0 {
            return Err(DispatchError::Validation(
                "daily capacity must be > 0".to_string(),
            ));
        }

        let courier = Courier {
            id: Uuid::new_v4(),
            name: new.name,
            phone: new.phone,
            branch_id: new.branch_id,
            vehicle: new.vehicle,
            online: false,
            position: None,
            accuracy_m: None,
            last_position_at: None,
            daily_capacity: new.daily_capacity,
            current_load: 0,
            rating: new.rating.clamp(0.0, 5.0),
            updated_at: Utc::now(),
        };

        self.state.couriers.insert(courier.id, courier.clone());
        info!(courier_id = %courier.id, name = %courier.name, "courier registered");
        Ok(courier)
    }

    pub fn report_location(
        &self,
        actor: &ActorContext,
        courier_id: Uuid,
        lat: f64,
        lng: f64,
        accuracy_m: Option<f64>,
    ) -> Result<PositionReport, DispatchError> {
        self.authorize(actor, Resource::Courier, Action::Update)?;
        // a courier device only ever speaks for its own courier
        if actor.role == Role::Courier && actor.id != courier_id {
            return Err(DispatchError::PermissionDenied(
                "couriers may only report their own position".to_string(),
            ));
        }

        tracker::report_position(&self.state, courier_id, lat, lng, accuracy_m)
    }

    pub fn list_active_couriers(
        &self,
        actor: &ActorContext,
        branch_id: Option<Uuid>,
    ) -> Result<Vec<CourierPosition>, DispatchError> {
        self.authorize(actor, Resource::Courier, Action::Read)?;
        Ok(tracker::list_active_positions(&self.state, branch_id))
    }

    pub fn courier_activity(
        &self,
        actor: &ActorContext,
        courier_id: Uuid,
    ) -> Result<Activity, DispatchError> {
        self.authorize(actor, Resource::Courier, Action::Read)?;
        tracker::evaluate_activity(&self.state, courier_id)
    }

    pub fn create_request(
        &self,
        actor: &ActorContext,
        new: NewRequest,
    ) -> Result<DeliveryRequest, DispatchError> {
        self.authorize(actor, Resource::Request, Action::Create)?;

        for (field, value) in [
            ("client_name", &new.client_name),
            ("client_phone", &new.client_phone),
            ("client_address", &new.client_address),
        ] {
            if value.trim().is_empty() {
                return Err(DispatchError::Validation(format!(
                    "{field} cannot be empty"
                )));
            }
        }
        if let Some(point) = &new.delivery_point {
            crate::geo::validate_coords(point.lat, point.lng)?;
        }

        let id = Uuid::new_v4();
        let number = new
            .number
            .unwrap_or_else(|| self.state.next_request_number());

        match self.state.request_numbers.entry(number.clone()) {
            Entry::Occupied(_) => {
                return Err(DispatchError::Conflict(format!(
                    "request number {number} already exists"
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let request = DeliveryRequest {
            id,
            number,
            client_name: new.client_name,
            client_phone: new.client_phone,
            client_address: new.client_address,
            payment_ref: new.payment_ref,
            external_id: new.external_id,
            status: RequestStatus::New,
            call_outcome: None,
            assigned_courier: None,
            branch_id: new.branch_id,
            operator_id: actor.id,
            priority: new.priority,
            delivery_point: new.delivery_point,
            created_at: Utc::now(),
            processed_at: None,
            delivered_at: None,
            history: Vec::new(),
        };

        self.state.requests.insert(id, request.clone());
        info!(request = %request.number, operator = %actor.id, "request created");
        Ok(request)
    }

    pub fn get_request(
        &self,
        actor: &ActorContext,
        request_id: Uuid,
    ) -> Result<DeliveryRequest, DispatchError> {
        self.authorize(actor, Resource::Request, Action::Read)?;
        let request = self
            .state
            .requests
            .get(&request_id)
            .ok_or_else(|| DispatchError::NotFound(format!("request {request_id}")))?
            .clone();
        self.check_visible(actor, &request)?;
        Ok(request)
    }

    /// Visibility comes first, remaining filters after. There is no way
    /// around the visibility predicate on any read path.
    pub fn list_requests(
        &self,
        actor: &ActorContext,
        filters: &RequestFilters,
    ) -> Result<Vec<DeliveryRequest>, DispatchError> {
        self.authorize(actor, Resource::Request, Action::Read)?;
        let visibility = access::visibility(actor);

        let mut rows: Vec<DeliveryRequest> = self
            .state
            .requests
            .iter()
            .filter(|entry| visibility.allows(entry.value()))
            .filter(|entry| {
                filters
                    .status
                    .is_none_or(|status| entry.value().status == status)
            })
            .filter(|entry| {
                filters
                    .branch_id
                    .is_none_or(|branch| entry.value().branch_id == branch)
            })
            .map(|entry| entry.value().clone())
            .collect();

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    /// Records the outcome of the operator's confirmation call. Pure
    /// reference data next to the status machine; terminal requests are
    /// closed to it like to everything else.
    pub fn record_call_outcome(
        &self,
        actor: &ActorContext,
        request_id: Uuid,
        outcome: CallOutcome,
    ) -> Result<DeliveryRequest, DispatchError> {
        self.authorize(actor, Resource::Request, Action::Update)?;

        let mut request = self
            .state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| DispatchError::NotFound(format!("request {request_id}")))?;
        self.check_visible(actor, &request)?;

        if request.status.is_terminal() {
            return Err(DispatchError::InvalidTransition(format!(
                "request {} is closed",
                request.number
            )));
        }

        request.call_outcome = Some(outcome);
        Ok(request.clone())
    }

    pub fn change_status(
        &self,
        actor: &ActorContext,
        request_id: Uuid,
        new_status: RequestStatus,
        comment: Option<String>,
    ) -> Result<DeliveryRequest, DispatchError> {
        self.authorize(actor, Resource::Request, Action::Update)?;
        {
            let request = self
                .state
                .requests
                .get(&request_id)
                .ok_or_else(|| DispatchError::NotFound(format!("request {request_id}")))?;
            self.check_visible(actor, &request)?;
        }
        lifecycle::change_status(&self.state, request_id, new_status, actor, comment)
    }

    pub fn assign_courier(
        &self,
        actor: &ActorContext,
        request_id: Uuid,
        courier_id: Uuid,
    ) -> Result<DeliveryRequest, DispatchError> {
        self.authorize(actor, Resource::Request, Action::Assign)?;
        lifecycle::assign_courier(&self.state, request_id, courier_id, actor, None)
    }

    pub async fn auto_assign_courier(
        &self,
        actor: &ActorContext,
        request_id: Uuid,
    ) -> Result<DeliveryRequest, DispatchError> {
        self.authorize(actor, Resource::Request, Action::Assign)?;
        matcher::auto_assign(&self.state, request_id, actor).await
    }
}
