//! HTTP request handlers for the terrain service.
//!
//! Coordinate lookups go through the shared batching engine, so concurrent
//! requests are answered by as few transport calls as possible. Path and
//! carpet lookups call the transport directly.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use geojson::Geometry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use terrain::{CarpetHeights, Coordinate, PathHeights, TerrainError};
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

/// Query parameters for the single point endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ElevationQuery {
    /// Latitude in decimal degrees (-60 to 60).
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180).
    pub lon: f64,
}

/// A coordinate in request and response bodies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct Point {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

impl From<Point> for Coordinate {
    fn from(point: Point) -> Self {
        Coordinate::new(point.lat, point.lon)
    }
}

/// Height at a single coordinate.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ElevationResponse {
    /// Height in meters (bilinear interpolation).
    pub height: f64,
    /// Latitude queried.
    pub lat: f64,
    /// Longitude queried.
    pub lon: f64,
}

/// Body of `POST /elevation`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchRequest {
    /// Coordinates to look up.
    pub points: Vec<Point>,
}

/// Heights for a list of coordinates, in request order.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchResponse {
    /// `null` where there is no terrain data for the coordinate.
    pub heights: Vec<Option<f64>>,
}

/// Body of `POST /path`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PathRequest {
    pub from: Point,
    pub to: Point,
}

/// Heights sampled along a segment.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PathResponse {
    /// Latitude distance between consecutive samples.
    pub lat_step: f64,
    /// Longitude distance between consecutive samples.
    pub lon_step: f64,
    /// Heights from start to end, both inclusive.
    pub heights: Vec<f64>,
}

impl From<PathHeights> for PathResponse {
    fn from(path: PathHeights) -> Self {
        Self {
            lat_step: path.lat_step,
            lon_step: path.lon_step,
            heights: path.heights,
        }
    }
}

/// Body of `POST /polypath`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PolyPathRequest {
    /// Vertices of the poly-line; at least two.
    pub points: Vec<Point>,
}

/// One entry per leg of the poly-line.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PolyPathResponse {
    pub legs: Vec<PathResponse>,
}

/// Body of `POST /carpet`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CarpetRequest {
    /// South-west corner.
    pub sw: Point,
    /// North-east corner.
    pub ne: Point,
    /// Only return the height range, not the grid.
    #[serde(default)]
    pub stats_only: bool,
}

/// Heights over a rectangular area.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CarpetResponse {
    pub min_height: f64,
    pub max_height: f64,
    /// Rows south to north, columns west to east. Empty for `stats_only`.
    pub carpet: Vec<Vec<f64>>,
}

impl From<CarpetHeights> for CarpetResponse {
    fn from(carpet: CarpetHeights) -> Self {
        Self {
            min_height: carpet.min_height,
            max_height: carpet.max_height,
            carpet: carpet.carpet,
        }
    }
}

/// Error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Engine and tile cache statistics.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    /// Transport calls issued by the engine.
    pub dispatches: u64,
    /// Points sent across all transport calls.
    pub points_dispatched: u64,
    /// Average points per transport call.
    pub points_per_dispatch: f64,
    /// Requests answered with heights.
    pub requests_delivered: u64,
    /// Requests answered with a failure.
    pub requests_failed: u64,
    /// Results dropped because the caller went away.
    pub results_discarded: u64,
    /// Number of tiles in cache.
    pub cached_tiles: u64,
    /// Cache hit count.
    pub cache_hits: u64,
    /// Cache miss count.
    pub cache_misses: u64,
    /// Cache hit rate (0.0 to 1.0).
    pub hit_rate: f64,
}

/// A [`TerrainError`] rendered as a JSON error response.
#[derive(Debug)]
pub struct ApiError(pub TerrainError);

impl From<TerrainError> for ApiError {
    fn from(e: TerrainError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            TerrainError::OutOfBounds { .. }
            | TerrainError::InvalidArea
            | TerrainError::AreaTooLarge { .. }
            | TerrainError::InvalidGeometry { .. }
            | TerrainError::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            TerrainError::TileNotFound { .. } | TerrainError::NoData { .. } => {
                StatusCode::NOT_FOUND
            }
            TerrainError::EngineClosed => StatusCode::SERVICE_UNAVAILABLE,
            TerrainError::QueryFailed
            | TerrainError::Transport { .. }
            | TerrainError::LengthMismatch { .. }
            | TerrainError::Io(_)
            | TerrainError::InvalidFileSize { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(status = status.as_u16(), error = %self.0, "Terrain query failed");
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Reject the request with 400 if any point is outside coverage, before
/// anything is submitted.
fn covered(points: Vec<Point>) -> Result<Vec<Coordinate>, ApiError> {
    points
        .into_iter()
        .map(|p| Coordinate::from(p).covered().map_err(ApiError))
        .collect()
}

/// Get the height at a coordinate.
#[utoipa::path(
    get,
    path = "/elevation",
    tag = "elevation",
    params(ElevationQuery),
    responses(
        (status = 200, description = "Height found", body = ElevationResponse),
        (status = 400, description = "Coordinates out of coverage", body = ErrorResponse),
        (status = 404, description = "No terrain data at the coordinate", body = ErrorResponse),
        (status = 502, description = "Terrain query failed", body = ErrorResponse),
    )
)]
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> Result<Json<ElevationResponse>, ApiError> {
    tracing::debug!(lat = query.lat, lon = query.lon, "Elevation query");

    let point = Coordinate::new(query.lat, query.lon).covered()?;
    let heights = state.coordinates.request(vec![point]).await?;
    let height = heights.first().copied().ok_or(TerrainError::QueryFailed)?;
    if height.is_nan() {
        return Err(TerrainError::NoData {
            lat: query.lat,
            lon: query.lon,
        }
        .into());
    }

    Ok(Json(ElevationResponse {
        height,
        lat: query.lat,
        lon: query.lon,
    }))
}

/// Get heights for many coordinates at once.
#[utoipa::path(
    post,
    path = "/elevation",
    tag = "elevation",
    request_body = BatchRequest,
    responses(
        (status = 200, description = "Heights in request order", body = BatchResponse),
        (status = 400, description = "A coordinate is out of coverage", body = ErrorResponse),
        (status = 502, description = "Terrain query failed", body = ErrorResponse),
    )
)]
pub async fn post_elevation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    tracing::debug!(points = request.points.len(), "Batch elevation query");

    let points = covered(request.points)?;
    let heights = state
        .coordinates
        .request(points)
        .await?
        .into_iter()
        .map(|h| (!h.is_nan()).then_some(h))
        .collect();
    Ok(Json(BatchResponse { heights }))
}

/// Add heights as Z coordinates to a GeoJSON geometry.
#[utoipa::path(
    post,
    path = "/elevation/geojson",
    tag = "elevation",
    request_body = Object,
    responses(
        (status = 200, description = "Geometry with heights as Z coordinates"),
        (status = 400, description = "Invalid geometry or coordinates", body = ErrorResponse),
        (status = 404, description = "No terrain data at a position", body = ErrorResponse),
        (status = 502, description = "Terrain query failed", body = ErrorResponse),
    )
)]
pub async fn post_geojson(
    State(state): State<Arc<AppState>>,
    Json(geometry): Json<Geometry>,
) -> Result<Json<Geometry>, ApiError> {
    let geometry = terrain::geojson::add_heights_to_geometry(&state.engine, geometry).await?;
    Ok(Json(geometry))
}

/// Get heights along a straight segment.
#[utoipa::path(
    post,
    path = "/path",
    tag = "profile",
    request_body = PathRequest,
    responses(
        (status = 200, description = "Heights along the segment", body = PathResponse),
        (status = 400, description = "Coordinates out of coverage", body = ErrorResponse),
        (status = 404, description = "Terrain data unavailable", body = ErrorResponse),
    )
)]
pub async fn post_path(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PathRequest>,
) -> Result<Json<PathResponse>, ApiError> {
    let path = state
        .path
        .request(request.from.into(), request.to.into())
        .await?;
    Ok(Json(path.into()))
}

/// Get heights along every leg of a poly-line.
#[utoipa::path(
    post,
    path = "/polypath",
    tag = "profile",
    request_body = PolyPathRequest,
    responses(
        (status = 200, description = "Heights for each leg", body = PolyPathResponse),
        (status = 400, description = "Fewer than two points or out of coverage", body = ErrorResponse),
        (status = 404, description = "Terrain data unavailable", body = ErrorResponse),
    )
)]
pub async fn post_polypath(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PolyPathRequest>,
) -> Result<Json<PolyPathResponse>, ApiError> {
    let points: Vec<Coordinate> = request.points.into_iter().map(Coordinate::from).collect();
    let legs = state.poly_path.request(&points).await?;
    Ok(Json(PolyPathResponse {
        legs: legs.into_iter().map(PathResponse::from).collect(),
    }))
}

/// Get heights over a rectangular area.
#[utoipa::path(
    post,
    path = "/carpet",
    tag = "profile",
    request_body = CarpetRequest,
    responses(
        (status = 200, description = "Height grid or range", body = CarpetResponse),
        (status = 400, description = "Invalid or too large area", body = ErrorResponse),
        (status = 404, description = "Terrain data unavailable", body = ErrorResponse),
    )
)]
pub async fn post_carpet(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CarpetRequest>,
) -> Result<Json<CarpetResponse>, ApiError> {
    let carpet = state
        .carpet
        .request(request.sw.into(), request.ne.into(), request.stats_only)
        .await?;
    Ok(Json(carpet.into()))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Engine and tile cache statistics.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses((status = 200, description = "Current statistics", body = StatsResponse))
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let engine = state.engine.stats();
    let cache = state.transport.cache_stats();

    Json(StatsResponse {
        dispatches: engine.dispatches,
        points_dispatched: engine.points_dispatched,
        points_per_dispatch: engine.points_per_dispatch(),
        requests_delivered: engine.requests_delivered,
        requests_failed: engine.requests_failed,
        results_discarded: engine.results_discarded,
        cached_tiles: cache.entry_count,
        cache_hits: cache.hit_count,
        cache_misses: cache.miss_count,
        hit_rate: cache.hit_rate(),
    })
}

/// Answer for a request that can never be served.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Not found".to_string(),
        }),
    )
}
