//! Terrain Service Library
//!
//! HTTP handlers, shared state and router for the terrain height service.
//! This library is used by both the terrain-service binary and integration tests.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use terrain::{
    BatchConfig, CarpetQuery, CoordinateQuery, EngineHandle, PathQuery, PolyPathQuery,
    SrtmTransport,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Batching engine every coordinate lookup goes through.
    pub engine: EngineHandle,
    /// Transport behind the engine, also used for cache statistics.
    pub transport: Arc<SrtmTransport>,
    pub coordinates: CoordinateQuery,
    pub path: PathQuery<SrtmTransport>,
    pub poly_path: PolyPathQuery<SrtmTransport>,
    pub carpet: CarpetQuery<SrtmTransport>,
}

impl AppState {
    /// Start an engine over `transport` and wire up the query types.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(transport: SrtmTransport, config: BatchConfig) -> Self {
        let transport = Arc::new(transport);
        let engine = EngineHandle::spawn(Arc::clone(&transport), config);

        Self {
            coordinates: CoordinateQuery::new(engine.clone()),
            path: PathQuery::new(Arc::clone(&transport)),
            poly_path: PolyPathQuery::new(Arc::clone(&transport)),
            carpet: CarpetQuery::new(Arc::clone(&transport)),
            engine,
            transport,
        }
    }
}

/// OpenAPI documentation for the terrain service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Terrain Height Service",
        version = "0.1.0",
        description = "REST API for terrain heights. Concurrent coordinate lookups are coalesced into shared backend calls.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        handlers::get_elevation,
        handlers::post_elevation,
        handlers::post_geojson,
        handlers::post_path,
        handlers::post_polypath,
        handlers::post_carpet,
        handlers::health_check,
        handlers::get_stats,
    ),
    components(
        schemas(
            handlers::Point,
            handlers::ElevationResponse,
            handlers::BatchRequest,
            handlers::BatchResponse,
            handlers::PathRequest,
            handlers::PathResponse,
            handlers::PolyPathRequest,
            handlers::PolyPathResponse,
            handlers::CarpetRequest,
            handlers::CarpetResponse,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::StatsResponse,
        )
    ),
    tags(
        (name = "elevation", description = "Batched height lookups"),
        (name = "profile", description = "Path and area profiles"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route(
            "/elevation",
            get(handlers::get_elevation).post(handlers::post_elevation),
        )
        .route("/elevation/geojson", post(handlers::post_geojson))
        .route("/path", post(handlers::post_path))
        .route("/polypath", post(handlers::post_polypath))
        .route("/carpet", post(handlers::post_carpet))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

// Re-export commonly used types for convenience
pub use handlers::{
    ApiError, BatchRequest, BatchResponse, CarpetRequest, CarpetResponse, ElevationQuery,
    ElevationResponse, ErrorResponse, HealthResponse, PathRequest, PathResponse, Point,
    PolyPathRequest, PolyPathResponse, StatsResponse,
};
