//! Error types for the terrain library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while answering terrain height queries.
#[derive(Error, Debug)]
pub enum TerrainError {
    /// IO error when reading tile files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File size doesn't match SRTM1 or SRTM3 format.
    #[error("Invalid file size: {size} bytes (expected 25934402 for SRTM1 or 2884802 for SRTM3)")]
    InvalidFileSize { size: usize },

    /// Coordinates are outside valid SRTM coverage.
    #[error("Coordinates out of bounds: lat={lat}, lon={lon} (valid: lat ±60°, lon ±180°)")]
    OutOfBounds { lat: f64, lon: f64 },

    /// The tile covering a coordinate is not present in the data directory.
    #[error("Terrain tile not found: {path}")]
    TileNotFound { path: PathBuf },

    /// The tile exists but holds a void sample at the coordinate.
    #[error("No terrain data at lat={lat}, lon={lon}")]
    NoData { lat: f64, lon: f64 },

    /// South-west corner is not south-west of the north-east corner.
    #[error("Invalid area: south-west corner must lie south-west of north-east corner")]
    InvalidArea,

    /// Carpet request would produce more samples than allowed.
    #[error("Area too large: {samples} samples requested (limit {limit})")]
    AreaTooLarge { samples: usize, limit: usize },

    /// A GeoJSON position has fewer than two elements.
    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    /// A poly-path needs at least two coordinates.
    #[error("Invalid path: {count} coordinate(s) given, at least 2 required")]
    InvalidPath { count: usize },

    /// The transport could not produce usable data.
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    /// The transport returned a height list whose length differs from the
    /// number of points sent.
    #[error("Transport returned {actual} heights for {expected} points")]
    LengthMismatch { expected: usize, actual: usize },

    /// The batched query a request was part of failed.
    #[error("Terrain query failed")]
    QueryFailed,

    /// The batching engine has shut down.
    #[error("Terrain batch engine is closed")]
    EngineClosed,
}

/// Result type alias using [`TerrainError`].
pub type Result<T> = std::result::Result<T, TerrainError>;
