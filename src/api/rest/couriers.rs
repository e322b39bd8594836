use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::actor_from_headers;
use crate::error::DispatchError;
use crate::models::courier::{Courier, CourierPosition};
use crate::models::location::{Activity, PositionReport};
use crate::service::{DispatchService, NewCourier};

pub fn router() -> Router<DispatchService> {
    Router::new()
        .route("/couriers", post(register_courier))
        .route("/couriers/active", get(list_active))
        .route("/couriers/:id/activity", get(activity))
        .route("/couriers/:id/location", post(report_location))
}

#[derive(Deserialize)]
pub struct BranchQuery {
    pub branch_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct LocationPayload {
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: Option<f64>,
}

async fn register_courier(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Json(payload): Json<NewCourier>,
) -> Result<Json<Courier>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.register_courier(&actor, payload)?))
}

async fn list_active(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Query(query): Query<BranchQuery>,
) -> Result<Json<Vec<CourierPosition>>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.list_active_couriers(&actor, query.branch_id)?))
}

async fn activity(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Activity>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.courier_activity(&actor, id)?))
}

async fn report_location(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationPayload>,
) -> Result<Json<PositionReport>, DispatchError> {
    let actor = actor_from_headers(&headers)?;
    Ok(Json(service.report_location(
        &actor,
        id,
        payload.lat,
        payload.lng,
        payload.accuracy_m,
    )?))
}
