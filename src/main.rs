pub mod api;
mod config;
mod departures;
mod providers;
mod store;
mod sync;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use store::DataStore;
use sync::SyncManager;

#[derive(OpenApi)]
#[openapi(
    info(title = "TAM Departures API", version = "0.1.0"),
    paths(api::departures::get_schedule, api::health::health_check),
    components(schemas(
        api::ErrorResponse,
        api::health::HealthResponse,
        departures::CombinedDeparture,
        departures::RealtimeInfo,
        providers::gtfs::realtime::VehicleStatus,
    )),
    tags(
        (name = "schedule", description = "Merged schedule and realtime departures"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    config.gtfs.validate();
    tracing::info!(
        stop_id = %config.target.stop_id,
        route_id = %config.target.route_id,
        "Loaded configuration"
    );

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    let timezone = config.gtfs.parsed_timezone();
    let bind_addr = config.bind_addr.clone();

    // Start sync manager in background
    let store = DataStore::new();
    let sync_manager = Arc::new(
        SyncManager::new(&config, store.clone()).expect("Failed to initialize sync manager"),
    );
    tokio::spawn(async move {
        sync_manager.start().await;
    });

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(store, timezone))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {bind_addr}: {e}"));

    tracing::info!("Server running on http://{bind_addr}");
    tracing::info!("Swagger UI: http://{bind_addr}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "TAM Departures API"
}
