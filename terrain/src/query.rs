//! Caller-facing query types.
//!
//! [`CoordinateQuery`] goes through the batching engine. Path, poly-path and
//! carpet queries are not batched: they call the transport directly.

use std::sync::Arc;

use crate::coord::Coordinate;
use crate::engine::EngineHandle;
use crate::error::{Result, TerrainError};
use crate::transport::{CarpetHeights, PathHeights, Transport};

/// Heights at a list of coordinates, coalesced with other callers.
#[derive(Clone)]
pub struct CoordinateQuery {
    engine: EngineHandle,
}

impl CoordinateQuery {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    /// One height per coordinate, in order.
    pub async fn request(&self, coordinates: Vec<Coordinate>) -> Result<Vec<f64>> {
        self.engine.heights(coordinates).await
    }
}

/// Heights along a single segment.
pub struct PathQuery<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: Transport + ?Sized> PathQuery<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub async fn request(&self, from: Coordinate, to: Coordinate) -> Result<PathHeights> {
        self.transport.path_heights(from, to).await
    }
}

/// Heights along every leg of a poly-line.
///
/// Legs are queried one after another; the first failure fails the query.
pub struct PolyPathQuery<T: ?Sized> {
    path: PathQuery<T>,
}

impl<T: Transport + ?Sized> PolyPathQuery<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            path: PathQuery::new(transport),
        }
    }

    /// One [`PathHeights`] per consecutive coordinate pair.
    pub async fn request(&self, coordinates: &[Coordinate]) -> Result<Vec<PathHeights>> {
        if coordinates.len() < 2 {
            return Err(TerrainError::InvalidPath {
                count: coordinates.len(),
            });
        }

        let mut legs = Vec::with_capacity(coordinates.len() - 1);
        for pair in coordinates.windows(2) {
            legs.push(self.path.request(pair[0], pair[1]).await?);
        }
        Ok(legs)
    }
}

/// Heights over a rectangular area.
pub struct CarpetQuery<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: Transport + ?Sized> CarpetQuery<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub async fn request(
        &self,
        sw: Coordinate,
        ne: Coordinate,
        stats_only: bool,
    ) -> Result<CarpetHeights> {
        self.transport.carpet_heights(sw, ne, stats_only).await
    }
}
