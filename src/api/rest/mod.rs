pub mod couriers;
pub mod requests;
pub mod ws;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::services::ServeDir;

use crate::error::DispatchError;
use crate::models::actor::{ActorContext, Role};
use crate::service::DispatchService;

pub fn router(service: DispatchService) -> Router {
    Router::new()
        .merge(couriers::router())
        .merge(requests::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(service)
        .fallback_service(ServeDir::new("static"))
}

/// The gateway in front of this service authenticates; we only need to
/// know who it vouched for.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<ActorContext, DispatchError> {
    let id = headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| DispatchError::Validation("missing x-actor-id header".to_string()))?
        .parse()
        .map_err(|_| DispatchError::Validation("x-actor-id is not a uuid".to_string()))?;

    let role: Role = headers
        .get("x-actor-role")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| DispatchError::Validation("missing x-actor-role header".to_string()))?
        .parse()
        .map_err(DispatchError::Validation)?;

    Ok(ActorContext::new(id, role))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    couriers: usize,
    requests: usize,
}

async fn health(State(service): State<DispatchService>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        couriers: service.state().couriers.len(),
        requests: service.state().requests.len(),
    })
}

async fn metrics(State(service): State<DispatchService>) -> impl IntoResponse {
    match service.state().metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
