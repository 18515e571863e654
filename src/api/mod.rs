pub mod departures;
pub mod error;
pub mod health;

pub use error::{service_unavailable, ErrorResponse};

use axum::Router;
use chrono_tz::Tz;

use crate::store::DataStore;

pub fn router(store: DataStore, timezone: Tz) -> Router {
    Router::new()
        .nest("/schedule", departures::router(store.clone(), timezone))
        .nest("/health", health::router(store))
}
