use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::lifecycle;
use crate::models::actor::ActorContext;
use crate::models::courier::{Courier, GeoPoint};
use crate::models::request::DeliveryRequest;
use crate::state::AppState;
use crate::tracker;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MatchCandidate {
    pub courier_id: Uuid,
    pub distance_m: f64,
}

/// Picks the best courier for a request, or `None` when nobody is
/// eligible even with the radius relaxed.
///
/// Two passes: first bounded by the configured search radius, then one
/// logged relaxation to unbounded. Among candidates the order is
/// distance, then current load, then rating (higher wins), then id.
pub async fn find_best_courier(
    state: &AppState,
    request_id: Uuid,
) -> Result<Option<MatchCandidate>, DispatchError> {
    let (branch_id, point) = resolve_delivery_point(state, request_id).await?;

    let eligible = |courier: &Courier| courier.branch_id == branch_id && courier.has_free_slot();

    let mut candidates = tracker::nearest_couriers(
        state,
        &point,
        state.config.max_search_radius_m,
        usize::MAX,
        eligible,
    );

    if candidates.is_empty() {
        warn!(
            request_id = %request_id,
            radius_m = state.config.max_search_radius_m,
            "no courier within radius; relaxing to unbounded"
        );
        candidates = tracker::nearest_couriers(state, &point, f64::INFINITY, usize::MAX, eligible);
    }

    candidates.sort_by(|a, b| {
        a.1.total_cmp(&b.1)
            .then_with(|| a.0.current_load.cmp(&b.0.current_load))
            .then_with(|| b.0.rating.total_cmp(&a.0.rating))
            .then_with(|| a.0.id.cmp(&b.0.id))
    });

    Ok(candidates.first().map(|(courier, distance)| MatchCandidate {
        courier_id: courier.id,
        distance_m: *distance,
    }))
}

/// Finds the best courier and assigns them in one go. "Nobody eligible"
/// comes back as its own error kind so operators know to assign by hand
/// rather than retry.
pub async fn auto_assign(
    state: &AppState,
    request_id: Uuid,
    actor: &ActorContext,
) -> Result<DeliveryRequest, DispatchError> {
    let start = Instant::now();

    let result = match find_best_courier(state, request_id).await? {
        Some(candidate) => {
            let assigned = lifecycle::assign_courier(
                state,
                request_id,
                candidate.courier_id,
                actor,
                Some(candidate.distance_m),
            );
            if let Ok(request) = &assigned {
                info!(
                    request = %request.number,
                    courier_id = %candidate.courier_id,
                    distance_m = candidate.distance_m,
                    "auto-assigned"
                );
            }
            assigned
        }
        None => {
            let number = state
                .requests
                .get(&request_id)
                .map(|r| r.number.clone())
                .unwrap_or_else(|| request_id.to_string());
            Err(DispatchError::NoCourierAvailable(number))
        }
    };

    let outcome = match &result {
        Ok(_) => "success",
        Err(DispatchError::NoCourierAvailable(_)) => "no_courier",
        Err(_) => "error",
    };
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();

    result
}

/// Returns the request's branch and delivery coordinates, geocoding the
/// client address once and caching the result on the request.
async fn resolve_delivery_point(
    state: &AppState,
    request_id: Uuid,
) -> Result<(Uuid, GeoPoint), DispatchError> {
    let (branch_id, cached, address) = {
        let request = state
            .requests
            .get(&request_id)
            .ok_or_else(|| DispatchError::NotFound(format!("request {request_id}")))?;
        (
            request.branch_id,
            request.delivery_point,
            request.client_address.clone(),
        )
    };

    if let Some(point) = cached {
        return Ok((branch_id, point));
    }

    let limit = Duration::from_millis(state.config.collaborator_timeout_ms);
    let point = match timeout(limit, state.geocoder.geocode(&address)).await {
        Ok(Ok(point)) => point,
        Ok(Err(err)) => return Err(err),
        Err(_) => {
            return Err(DispatchError::CollaboratorUnavailable(format!(
                "geocoding timed out after {}ms",
                state.config.collaborator_timeout_ms
            )))
        }
    };

    if let Some(mut request) = state.requests.get_mut(&request_id) {
        request.delivery_point = Some(point);
    }

    Ok((branch_id, point))
}
