//! # Terrain - Coalescing Height Queries
//!
//! Answers terrain height queries for many independent callers while issuing
//! as few backend calls as possible.
//!
//! ## Features
//!
//! - **Coalescing**: Submissions arriving within a short window share one transport call
//! - **Single flight**: At most one coordinate call is outstanding at any time
//! - **Ordered fan-out**: Each caller gets exactly its own slice of the response
//! - **Offline**: [`SrtmTransport`] reads local `.hgt` files (plain or zipped)
//!
//! ## Quick Start
//!
//! ```ignore
//! use terrain::{BatchConfig, Coordinate, EngineHandle, SrtmTransport};
//!
//! let transport = SrtmTransport::builder("/data/srtm").cache_size(50).build();
//! let engine = EngineHandle::spawn(transport, BatchConfig::default());
//!
//! let heights = engine
//!     .heights(vec![Coordinate::new(35.3606, 138.7274)])
//!     .await?;
//! println!("Mount Fuji: {}m", heights[0]);
//! ```
//!
//! ## SRTM Data Format
//!
//! - **SRTM1**: 3601×3601 samples, 1 arc-second (~30m) resolution
//! - **SRTM3**: 1201×1201 samples, 3 arc-second (~90m) resolution
//!
//! Each sample is a 16-bit big-endian signed integer in meters; -32768 marks
//! a void.

pub mod coord;
pub mod engine;
pub mod error;
#[cfg(feature = "geojson")]
pub mod geojson;
pub mod query;
pub mod tile;
pub mod transport;

// Re-export main types at crate root for convenience
pub use coord::Coordinate;
pub use engine::{BatchConfig, ConsumerId, EngineHandle, EngineStats, HeightRequest};
pub use error::{Result, TerrainError};
pub use query::{CarpetQuery, CoordinateQuery, PathQuery, PolyPathQuery};
pub use tile::{HgtTile, Resolution, VOID_VALUE};
pub use transport::{
    CarpetHeights, PathHeights, SrtmTransport, SrtmTransportBuilder, TileCacheStats, Transport,
    NO_DATA,
};
