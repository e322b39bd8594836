use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::actor_from_headers;
use crate::error::DispatchError;
use crate::models::request::{CallOutcome, DeliveryRequest, RequestStatus};
use crate::service::{DispatchService, NewRequest, RequestFilters};

pub fn router() -> Router<DispatchService> {
    Router::new()
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/status", post(change_status))
        .route("/requests/:id/call-outcome", post(record_call_outcome))
        .route("/requests/:id/assign", post(assign_courier))
        .route("/requests/:id/auto-assign", post(auto_assign))
}

#[derive(Deserialize)]
pub struct ChangeStatusPayload {
    pub status: RequestStatus,
    pub comment: Option<String>,
}

#[derive(Deserialize)]
pub struct AssignPayload {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct CallOutcomePayload {
    pub outcome: CallOutcome,
}

async fn create_request(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Json(payload): Json<NewRequest>,
) -> Result<Json<DeliveryRequest>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.create_request(&actor, payload)?))
}

async fn list_requests(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Query(filters): Query<RequestFilters>,
) -> Result<Json<Vec<DeliveryRequest>>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.list_requests(&actor, &filters)?))
}

async fn get_request(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.get_request(&actor, id)?))
}

async fn change_status(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangeStatusPayload>,
) -> Result<Json<DeliveryRequest>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.change_status(
        &actor,
        id,
        payload.status,
        payload.comment,
    )?))
}

async fn record_call_outcome(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<CallOutcomePayload>,
) -> Result<Json<DeliveryRequest>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.record_call_outcome(&actor, id, payload.outcome)?))
}

async fn assign_courier(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignPayload>,
) -> Result<Json<DeliveryRequest>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.assign_courier(&actor, id, payload.courier_id)?))
}

async fn auto_assign(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.auto_assign_courier(&actor, id).await?))
}
