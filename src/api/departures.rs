use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono_tz::Tz;
use tracing::error;

use crate::api::{service_unavailable, ErrorResponse};
use crate::departures::{self, CombinedDeparture};
use crate::store::DataStore;

#[derive(Clone)]
pub struct DeparturesState {
    pub store: DataStore,
    pub timezone: Tz,
}

/// List upcoming departures for the configured stop, merged with the latest
/// realtime delay observations.
#[utoipa::path(
    get,
    path = "/api/schedule",
    responses(
        (status = 200, description = "Upcoming departures, soonest first", body = Vec<CombinedDeparture>),
        (status = 503, description = "Feed data not yet available", body = ErrorResponse)
    ),
    tag = "schedule"
)]
pub async fn get_schedule(
    State(state): State<DeparturesState>,
) -> Result<Json<Vec<CombinedDeparture>>, (StatusCode, Json<ErrorResponse>)> {
    let schedule = state
        .store
        .schedule()
        .await
        .ok_or_else(|| service_unavailable("Static schedule not yet loaded"))?;
    let realtime = state
        .store
        .realtime()
        .await
        .ok_or_else(|| service_unavailable("Realtime feed not yet loaded"))?;

    let now = departures::current_time_of_day(state.timezone);
    match departures::combine(&schedule, &realtime.updates, &now) {
        Ok(combined) => Ok(Json(combined)),
        Err(e) => {
            // Bad schedule rows should not take the endpoint down.
            error!(error = %e, "Failed to merge schedule with realtime data");
            Ok(Json(Vec::new()))
        }
    }
}

pub fn router(store: DataStore, timezone: Tz) -> Router {
    let state = DeparturesState { store, timezone };
    Router::new()
        .route("/", get(get_schedule))
        .with_state(state)
}
