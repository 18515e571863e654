use axum::{http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

/// JSON body returned alongside non-2xx statuses.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// 503 for requests that arrive before a feed slot has been populated.
pub fn service_unavailable(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}
