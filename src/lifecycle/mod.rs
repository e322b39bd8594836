use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::access;
use crate::engine::effects::{DispatchEvent, SideEffect};
use crate::error::DispatchError;
use crate::gateways::AuditEvent;
use crate::models::actor::ActorContext;
use crate::models::request::{DeliveryRequest, RequestStatus, StatusHistoryEntry};
use crate::state::AppState;
use crate::tracker;

/// The request status graph. Delivered, rejected and cancelled are
/// terminal; a delivered request can never become rejected or cancelled.
pub fn allowed_targets(from: RequestStatus) -> &'static [RequestStatus] {
    use RequestStatus::*;
    match from {
        New => &[Processing, Rejected, Cancelled],
        Processing => &[Assigned, Rejected, Cancelled],
        Assigned => &[InDelivery, Rejected, Cancelled],
        InDelivery => &[Delivered, Rejected],
        Delivered | Rejected | Cancelled => &[],
    }
}

pub fn transition_allowed(from: RequestStatus, to: RequestStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Moves a request through the status graph.
///
/// Checks run in order: request exists, the actor's role may target the
/// status at all, the edge exists in the graph. The status write and the
/// history append happen under the request's map guard, so no reader can
/// observe one without the other.
pub fn change_status(
    state: &AppState,
    request_id: Uuid,
    new_status: RequestStatus,
    actor: &ActorContext,
    comment: Option<String>,
) -> Result<DeliveryRequest, DispatchError> {
    apply_transition(state, request_id, new_status, actor, comment, None)
}

fn apply_transition(
    state: &AppState,
    request_id: Uuid,
    new_status: RequestStatus,
    actor: &ActorContext,
    comment: Option<String>,
    set_courier: Option<Uuid>,
) -> Result<DeliveryRequest, DispatchError> {
    if !access::can_transition(actor.role, new_status) {
        return Err(DispatchError::PermissionDenied(format!(
            "role {} may not set status {}",
            actor.role.as_str(),
            new_status.as_str()
        )));
    }

    let now = Utc::now();

    let (snapshot, old_status, released_courier) = {
        let mut request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| DispatchError::NotFound(format!("request {request_id}")))?;

        let old_status = request.status;
        if !transition_allowed(old_status, new_status) {
            return Err(DispatchError::InvalidTransition(format!(
                "{} -> {} is not allowed for request {}",
                old_status.as_str(),
                new_status.as_str(),
                request.number
            )));
        }

        request.status = new_status;
        match new_status {
            RequestStatus::Processing | RequestStatus::Assigned => {
                if request.processed_at.is_none() {
                    request.processed_at = Some(now);
                }
            }
            RequestStatus::Delivered => request.delivered_at = Some(now),
            _ => {}
        }

        if let Some(courier_id) = set_courier {
            request.assigned_courier = Some(courier_id);
        }

        request.history.push(StatusHistoryEntry {
            request_id,
            old_status,
            new_status,
            actor_id: actor.id,
            comment: comment.clone(),
            at: now,
        });

        // a terminal transition frees the courier's slot
        let released_courier = if new_status.is_terminal()
            && matches!(old_status, RequestStatus::Assigned | RequestStatus::InDelivery)
        {
            request.assigned_courier
        } else {
            None
        };

        (request.clone(), old_status, released_courier)
    };

    if let Some(courier_id) = released_courier {
        release_slot(state, courier_id);
    }

    state
        .metrics
        .status_transitions_total
        .with_label_values(&[new_status.as_str()])
        .inc();

    state.audit.record(AuditEvent::StatusChanged {
        request_id,
        old_status,
        new_status,
        actor_id: actor.id,
    });

    state.publish_event(DispatchEvent::StatusChanged {
        request_id,
        old_status,
        new_status,
        at: now,
    });

    state.queue_effect(SideEffect::Notify {
        recipient_phone: snapshot.client_phone.clone(),
        template_key: "request_status_changed",
        params: vec![
            ("number", snapshot.number.clone()),
            ("status", new_status.as_str().to_string()),
        ],
    });
    if let Some(external_id) = &snapshot.external_id {
        state.queue_effect(SideEffect::SyncBackOffice {
            external_id: external_id.clone(),
            status: new_status,
            comment,
        });
    }

    info!(
        request = %snapshot.number,
        old = old_status.as_str(),
        new = new_status.as_str(),
        actor = %actor.id,
        "request status changed"
    );

    Ok(snapshot)
}

/// Assigns a courier to a request: reserve a capacity slot, then run the
/// transition to `assigned`. The slot is reserved first so two racing
/// assignments cannot both fit into the courier's last free slot; if the
/// transition then fails, the reservation is rolled back.
pub fn assign_courier(
    state: &AppState,
    request_id: Uuid,
    courier_id: Uuid,
    actor: &ActorContext,
    distance_m: Option<f64>,
) -> Result<DeliveryRequest, DispatchError> {
    {
        let request = state
            .requests
            .get(&request_id)
            .ok_or_else(|| DispatchError::NotFound(format!("request {request_id}")))?;
        if let Some(existing) = request.assigned_courier {
            if existing != courier_id {
                return Err(DispatchError::Conflict(format!(
                    "request {} already carries courier {existing}",
                    request.number
                )));
            }
        }
    }

    reserve_slot(state, courier_id)?;

    let snapshot = match apply_transition(
        state,
        request_id,
        RequestStatus::Assigned,
        actor,
        None,
        Some(courier_id),
    ) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            release_slot(state, courier_id);
            return Err(err);
        }
    };

    let courier_phone = state
        .couriers
        .get(&courier_id)
        .map(|c| c.phone.clone())
        .unwrap_or_default();
    state.queue_effect(SideEffect::Notify {
        recipient_phone: courier_phone,
        template_key: "courier_new_assignment",
        params: vec![
            ("number", snapshot.number.clone()),
            ("address", snapshot.client_address.clone()),
        ],
    });

    state.publish_event(DispatchEvent::CourierAssigned {
        request_id,
        courier_id,
        distance_m,
        at: Utc::now(),
    });

    Ok(snapshot)
}

/// Takes one capacity slot on the courier, failing if the courier is
/// offline or already at its daily maximum. Runs under the courier's
/// map guard, which serializes racing reservations.
fn reserve_slot(state: &AppState, courier_id: Uuid) -> Result<(), DispatchError> {
    let now = Utc::now();
    let mut courier = state
        .couriers
        .get_mut(&courier_id)
        .ok_or_else(|| DispatchError::NotFound(format!("courier {courier_id}")))?;

    tracker::heal_staleness(&mut courier, state.config.staleness_window_secs(), now);

    if !courier.online {
        return Err(DispatchError::Validation(format!(
            "courier {} is offline",
            courier.name
        )));
    }
    if !courier.has_free_slot() {
        return Err(DispatchError::Conflict(format!(
            "courier {} is at capacity ({}/{})",
            courier.name, courier.current_load, courier.daily_capacity
        )));
    }

    courier.current_load += 1;
    courier.updated_at = now;
    Ok(())
}

fn release_slot(state: &AppState, courier_id: Uuid) {
    if let Some(mut courier) = state.couriers.get_mut(&courier_id) {
        courier.current_load = courier.current_load.saturating_sub(1);
        courier.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{allowed_targets, assign_courier, change_status, transition_allowed};
    use crate::config::Config;
    use crate::models::actor::{ActorContext, Role};
    use crate::models::courier::{Courier, VehicleType};
    use crate::models::request::{DeliveryRequest, Priority, RequestStatus};
    use crate::state::AppState;
    use crate::tracker::report_position;

    fn test_state() -> AppState {
        let (state, _effect_rx) = AppState::new(Config::default());
        state
    }

    fn dispatcher() -> ActorContext {
        ActorContext::new(Uuid::new_v4(), Role::Dispatcher)
    }

    fn seed_request(state: &AppState, status: RequestStatus) -> Uuid {
        let id = Uuid::new_v4();
        let request = DeliveryRequest {
            id,
            number: state.next_request_number(),
            client_name: "client".to_string(),
            client_phone: "+70000000001".to_string(),
            client_address: "Tverskaya 1".to_string(),
            payment_ref: None,
            external_id: None,
            status,
            call_outcome: None,
            assigned_courier: None,
            branch_id: Uuid::new_v4(),
            operator_id: Uuid::new_v4(),
            priority: Priority::Normal,
            delivery_point: None,
            created_at: Utc::now(),
            processed_at: None,
            delivered_at: None,
            history: Vec::new(),
        };
        state.requests.insert(id, request);
        id
    }

    fn seed_online_courier(state: &AppState, capacity: u8, load: u8) -> Uuid {
        let id = Uuid::new_v4();
        let courier = Courier {
            id,
            name: "courier".to_string(),
            phone: "+70000000002".to_string(),
            branch_id: Uuid::new_v4(),
            vehicle: VehicleType::Car,
            online: false,
            position: None,
            accuracy_m: None,
            last_position_at: None,
            daily_capacity: capacity,
            current_load: load,
            rating: 4.5,
            updated_at: Utc::now(),
        };
        state.couriers.insert(id, courier);
        report_position(state, id, 55.75, 37.61, None).unwrap();
        id
    }

    const ALL: [RequestStatus; 7] = [
        RequestStatus::New,
        RequestStatus::Processing,
        RequestStatus::Assigned,
        RequestStatus::InDelivery,
        RequestStatus::Delivered,
        RequestStatus::Rejected,
        RequestStatus::Cancelled,
    ];

    #[test]
    fn transition_table_matches_graph() {
        use RequestStatus::*;
        for from in ALL {
            for to in ALL {
                let expected = match (from, to) {
                    (New, Processing | Rejected | Cancelled) => true,
                    (Processing, Assigned | Rejected | Cancelled) => true,
                    (Assigned, InDelivery | Rejected | Cancelled) => true,
                    (InDelivery, Delivered | Rejected) => true,
                    _ => false,
                };
                assert_eq!(transition_allowed(from, to), expected, "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn terminal_states_have_no_targets() {
        assert!(allowed_targets(RequestStatus::Delivered).is_empty());
        assert!(allowed_targets(RequestStatus::Rejected).is_empty());
        assert!(allowed_targets(RequestStatus::Cancelled).is_empty());
    }

    #[test]
    fn every_illegal_edge_fails_with_invalid_transition() {
        let actor = dispatcher();
        for from in ALL {
            for to in ALL {
                if transition_allowed(from, to) {
                    continue;
                }
                let state = test_state();
                let id = seed_request(&state, from);
                let err = change_status(&state, id, to, &actor, None).unwrap_err();
                assert_eq!(err.kind(), "invalid_transition", "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn legal_transition_appends_matching_history() {
        let state = test_state();
        let actor = dispatcher();
        let id = seed_request(&state, RequestStatus::New);

        let updated =
            change_status(&state, id, RequestStatus::Processing, &actor, Some("ok".into()))
                .unwrap();
        assert_eq!(updated.status, RequestStatus::Processing);
        assert!(updated.processed_at.is_some());
        assert_eq!(updated.history.len(), 1);

        let entry = &updated.history[0];
        assert_eq!(entry.old_status, RequestStatus::New);
        assert_eq!(entry.new_status, RequestStatus::Processing);
        assert_eq!(entry.actor_id, actor.id);
        assert_eq!(entry.comment.as_deref(), Some("ok"));
    }

    #[test]
    fn delivered_sets_delivered_at() {
        let state = test_state();
        let actor = dispatcher();
        let id = seed_request(&state, RequestStatus::InDelivery);

        let updated = change_status(&state, id, RequestStatus::Delivered, &actor, None).unwrap();
        assert!(updated.delivered_at.is_some());
    }

    #[test]
    fn delivered_request_is_immutable() {
        let state = test_state();
        let actor = dispatcher();
        let id = seed_request(&state, RequestStatus::Delivered);

        for target in ALL {
            let err = change_status(&state, id, target, &actor, None).unwrap_err();
            assert_eq!(err.kind(), "invalid_transition");
        }
    }

    #[test]
    fn courier_role_cannot_set_processing() {
        let state = test_state();
        let courier_actor = ActorContext::new(Uuid::new_v4(), Role::Courier);
        let id = seed_request(&state, RequestStatus::New);

        let err =
            change_status(&state, id, RequestStatus::Processing, &courier_actor, None).unwrap_err();
        assert_eq!(err.kind(), "permission_denied");
    }

    #[test]
    fn unknown_request_is_not_found() {
        let state = test_state();
        let err = change_status(
            &state,
            Uuid::new_v4(),
            RequestStatus::Processing,
            &dispatcher(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn assign_courier_sets_reference_and_load() {
        let state = test_state();
        let actor = dispatcher();
        let request_id = seed_request(&state, RequestStatus::Processing);
        let courier_id = seed_online_courier(&state, 5, 2);

        let updated = assign_courier(&state, request_id, courier_id, &actor, None).unwrap();
        assert_eq!(updated.status, RequestStatus::Assigned);
        assert_eq!(updated.assigned_courier, Some(courier_id));
        assert!(updated.processed_at.is_some());

        assert_eq!(state.couriers.get(&courier_id).unwrap().current_load, 3);
    }

    #[test]
    fn assign_fails_at_capacity() {
        let state = test_state();
        let actor = dispatcher();
        let request_id = seed_request(&state, RequestStatus::Processing);
        let courier_id = seed_online_courier(&state, 3, 3);

        let err = assign_courier(&state, request_id, courier_id, &actor, None).unwrap_err();
        assert_eq!(err.kind(), "conflict");
        // reservation must not leak
        assert_eq!(state.couriers.get(&courier_id).unwrap().current_load, 3);
    }

    #[test]
    fn assign_fails_for_offline_courier() {
        let state = test_state();
        let actor = dispatcher();
        let request_id = seed_request(&state, RequestStatus::Processing);
        let courier_id = seed_online_courier(&state, 5, 0);
        state.couriers.get_mut(&courier_id).unwrap().online = false;
        state.couriers.get_mut(&courier_id).unwrap().last_position_at = None;

        let err = assign_courier(&state, request_id, courier_id, &actor, None).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert_eq!(state.couriers.get(&courier_id).unwrap().current_load, 0);
    }

    #[test]
    fn failed_transition_rolls_back_reservation() {
        let state = test_state();
        let actor = dispatcher();
        // assignment is only legal from processing
        let request_id = seed_request(&state, RequestStatus::New);
        let courier_id = seed_online_courier(&state, 5, 1);

        let err = assign_courier(&state, request_id, courier_id, &actor, None).unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
        assert_eq!(state.couriers.get(&courier_id).unwrap().current_load, 1);
    }

    #[test]
    fn terminal_transition_releases_courier_slot() {
        let state = test_state();
        let actor = dispatcher();
        let request_id = seed_request(&state, RequestStatus::Processing);
        let courier_id = seed_online_courier(&state, 5, 0);

        assign_courier(&state, request_id, courier_id, &actor, None).unwrap();
        assert_eq!(state.couriers.get(&courier_id).unwrap().current_load, 1);

        change_status(&state, request_id, RequestStatus::InDelivery, &actor, None).unwrap();
        assert_eq!(state.couriers.get(&courier_id).unwrap().current_load, 1);

        change_status(&state, request_id, RequestStatus::Delivered, &actor, None).unwrap();
        assert_eq!(state.couriers.get(&courier_id).unwrap().current_load, 0);
    }

    #[test]
    fn cancelling_assigned_request_releases_slot() {
        let state = test_state();
        let actor = dispatcher();
        let request_id = seed_request(&state, RequestStatus::Processing);
        let courier_id = seed_online_courier(&state, 5, 0);

        assign_courier(&state, request_id, courier_id, &actor, None).unwrap();
        change_status(&state, request_id, RequestStatus::Cancelled, &actor, None).unwrap();
        assert_eq!(state.couriers.get(&courier_id).unwrap().current_load, 0);
    }

    #[test]
    fn reassigning_to_other_courier_conflicts() {
        let state = test_state();
        let actor = dispatcher();
        let request_id = seed_request(&state, RequestStatus::Processing);
        let first = seed_online_courier(&state, 5, 0);
        let second = seed_online_courier(&state, 5, 0);

        assign_courier(&state, request_id, first, &actor, None).unwrap();
        let err = assign_courier(&state, request_id, second, &actor, None).unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert_eq!(state.couriers.get(&second).unwrap().current_load, 0);
    }
}
