//! Sources of terrain heights.
//!
//! A [`Transport`] turns coordinates into heights. The batching engine only
//! ever calls [`Transport::coordinate_heights`], and never has more than one
//! such call outstanding. Path and carpet queries are forwarded straight to
//! the transport by the wrappers in [`crate::query`].

mod srtm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coord::Coordinate;
use crate::error::Result;

pub use srtm::{SrtmTransport, SrtmTransportBuilder, TileCacheStats, DEFAULT_SAMPLE_SPACING};

/// Height reported for a coordinate the source has no data for.
///
/// A coordinate outside the covered tiles or on a void sample does not fail
/// the call it is part of; it gets this value in its slot instead. Test with
/// `f64::is_nan`.
pub const NO_DATA: f64 = f64::NAN;

/// Heights sampled along a straight segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathHeights {
    /// Latitude distance between consecutive samples.
    pub lat_step: f64,
    /// Longitude distance between consecutive samples.
    pub lon_step: f64,
    /// Heights from the start to the end of the segment, both inclusive.
    pub heights: Vec<f64>,
}

/// Heights over a rectangular area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarpetHeights {
    /// Lowest height in the area.
    pub min_height: f64,
    /// Highest height in the area.
    pub max_height: f64,
    /// Rows from south to north, each row from west to east.
    /// Empty for stats-only queries.
    pub carpet: Vec<Vec<f64>>,
}

/// A provider of terrain heights.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Heights for each coordinate, in order.
    ///
    /// On success the returned list has exactly one height per coordinate.
    /// Coordinates without data get [`NO_DATA`]; an `Err` means the whole
    /// call failed (I/O, corrupt tile, unreachable source).
    async fn coordinate_heights(&self, points: &[Coordinate]) -> Result<Vec<f64>>;

    /// Heights along the segment from `from` to `to`.
    async fn path_heights(&self, from: Coordinate, to: Coordinate) -> Result<PathHeights>;

    /// Heights over the rectangle bounded by `sw` and `ne`.
    ///
    /// When `stats_only` is set only the min/max are computed.
    async fn carpet_heights(
        &self,
        sw: Coordinate,
        ne: Coordinate,
        stats_only: bool,
    ) -> Result<CarpetHeights>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn coordinate_heights(&self, points: &[Coordinate]) -> Result<Vec<f64>> {
        (**self).coordinate_heights(points).await
    }

    async fn path_heights(&self, from: Coordinate, to: Coordinate) -> Result<PathHeights> {
        (**self).path_heights(from, to).await
    }

    async fn carpet_heights(
        &self,
        sw: Coordinate,
        ne: Coordinate,
        stats_only: bool,
    ) -> Result<CarpetHeights> {
        (**self).carpet_heights(sw, ne, stats_only).await
    }
}
