use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::store::DataStore;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Whether the static stop schedule has been loaded into memory
    pub schedule_loaded: bool,
    /// Number of scheduled departures for the configured stop
    pub departure_count: usize,
    /// Display name of the configured route, null until the schedule loads
    pub route_name: Option<String>,
    /// Instant the schedule was last loaded (RFC 3339), null until loaded
    pub schedule_loaded_at: Option<String>,
    /// Whether a realtime snapshot has been fetched
    pub realtime_loaded: bool,
    /// Number of trips with a realtime observation in the latest snapshot
    pub realtime_trip_count: usize,
    /// Instant the realtime feed was last fetched (RFC 3339), null until fetched
    pub realtime_fetched_at: Option<String>,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(store): State<DataStore>) -> Json<HealthResponse> {
    let schedule = store.schedule().await;
    let realtime = store.realtime().await;

    Json(HealthResponse {
        healthy: true,
        schedule_loaded: schedule.is_some(),
        departure_count: schedule
            .as_ref()
            .map(|s| s.departures.len())
            .unwrap_or(0),
        route_name: schedule.as_ref().map(|s| s.route_name.clone()),
        schedule_loaded_at: schedule.map(|s| s.loaded_at.to_rfc3339()),
        realtime_loaded: realtime.is_some(),
        realtime_trip_count: realtime
            .as_ref()
            .map(|r| r.updates.len())
            .unwrap_or(0),
        realtime_fetched_at: realtime.map(|r| r.fetched_at.to_rfc3339()),
    })
}

pub fn router(store: DataStore) -> Router {
    Router::new()
        .route("/", get(health_check))
        .with_state(store)
}
