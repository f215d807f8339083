//! Offline transport backed by local `.hgt` tiles.
//!
//! Tiles are looked up by their southwest corner in a data directory, mapped
//! on first use and kept in an LRU cache. A missing `.hgt` file is extracted
//! from a sibling `.hgt.zip` archive when one exists.
//!
//! ```ignore
//! use terrain::SrtmTransport;
//!
//! let transport = SrtmTransport::builder("/data/srtm")
//!     .cache_size(50)
//!     .build();
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use moka::sync::Cache;

use super::{CarpetHeights, PathHeights, Transport, NO_DATA};
use crate::coord::{tile_filename, Coordinate};
use crate::error::{Result, TerrainError};
use crate::tile::HgtTile;

/// Default distance between path/carpet samples: 3 arc-seconds.
pub const DEFAULT_SAMPLE_SPACING: f64 = 1.0 / 1200.0;

const DEFAULT_CACHE_SIZE: u64 = 100;
const DEFAULT_MAX_CARPET_SAMPLES: usize = 1_000_000;

/// Statistics about the tile cache.
#[derive(Debug, Clone, Default)]
pub struct TileCacheStats {
    /// Number of tiles currently mapped.
    pub entry_count: u64,
    /// Lookups served from the cache.
    pub hit_count: u64,
    /// Lookups that had to open a tile.
    pub miss_count: u64,
}

impl TileCacheStats {
    /// Cache hit rate (0.0 to 1.0), 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

struct TileStore {
    data_dir: PathBuf,
    tiles: Cache<(i32, i32), Arc<HgtTile>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    sample_spacing: f64,
    max_carpet_samples: usize,
}

impl TileStore {
    fn height(&self, point: Coordinate) -> Result<f64> {
        let point = point.covered()?;
        let tile = self.tile(point.tile_key())?;
        tile.height_at(point.lat, point.lon)
            .ok_or(TerrainError::NoData {
                lat: point.lat,
                lon: point.lon,
            })
    }

    fn heights(&self, points: &[Coordinate]) -> Result<Vec<f64>> {
        points
            .iter()
            .map(|&p| match self.height(p) {
                Err(
                    TerrainError::OutOfBounds { .. }
                    | TerrainError::TileNotFound { .. }
                    | TerrainError::NoData { .. },
                ) => Ok(NO_DATA),
                other => other,
            })
            .collect()
    }

    fn path(&self, from: Coordinate, to: Coordinate) -> Result<PathHeights> {
        let d_lat = to.lat - from.lat;
        let d_lon = to.lon - from.lon;
        let steps = (d_lat.abs().max(d_lon.abs()) / self.sample_spacing)
            .ceil()
            .max(1.0) as usize;

        let lat_step = d_lat / steps as f64;
        let lon_step = d_lon / steps as f64;
        let heights = (0..=steps)
            .map(|i| {
                self.height(Coordinate::new(
                    from.lat + lat_step * i as f64,
                    from.lon + lon_step * i as f64,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PathHeights {
            lat_step,
            lon_step,
            heights,
        })
    }

    fn carpet(&self, sw: Coordinate, ne: Coordinate, stats_only: bool) -> Result<CarpetHeights> {
        if sw.lat > ne.lat || sw.lon > ne.lon {
            return Err(TerrainError::InvalidArea);
        }

        let rows = ((ne.lat - sw.lat) / self.sample_spacing).floor() as usize + 1;
        let cols = ((ne.lon - sw.lon) / self.sample_spacing).floor() as usize + 1;
        let samples = rows.saturating_mul(cols);
        if samples > self.max_carpet_samples {
            return Err(TerrainError::AreaTooLarge {
                samples,
                limit: self.max_carpet_samples,
            });
        }

        let mut min_height = f64::INFINITY;
        let mut max_height = f64::NEG_INFINITY;
        let mut carpet = Vec::with_capacity(if stats_only { 0 } else { rows });

        for r in 0..rows {
            let lat = (sw.lat + r as f64 * self.sample_spacing).min(ne.lat);
            let mut row = Vec::with_capacity(if stats_only { 0 } else { cols });
            for c in 0..cols {
                let lon = (sw.lon + c as f64 * self.sample_spacing).min(ne.lon);
                let h = self.height(Coordinate::new(lat, lon))?;
                min_height = min_height.min(h);
                max_height = max_height.max(h);
                if !stats_only {
                    row.push(h);
                }
            }
            if !stats_only {
                carpet.push(row);
            }
        }

        Ok(CarpetHeights {
            min_height,
            max_height,
            carpet,
        })
    }

    fn tile(&self, key: (i32, i32)) -> Result<Arc<HgtTile>> {
        if let Some(tile) = self.tiles.get(&key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(tile);
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);

        let filename = tile_filename(key.0, key.1);
        let path = self.data_dir.join(&filename);

        if !path.exists() {
            let zip_path = self.data_dir.join(format!("{}.zip", filename));
            if !zip_path.exists() {
                return Err(TerrainError::TileNotFound { path });
            }
            extract_from_zip(&zip_path, &path)?;
        }

        let tile = Arc::new(HgtTile::open(&path)?);
        self.tiles.insert(key, tile.clone());
        tracing::debug!(tile = %filename, "Mapped terrain tile");
        Ok(tile)
    }
}

/// Extract the first `.hgt` entry of `zip_path` into `out_path`.
fn extract_from_zip(zip_path: &Path, out_path: &Path) -> Result<()> {
    let invalid = |e: zip::result::ZipError| {
        TerrainError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    };

    let file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(invalid)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(invalid)?;
        if entry.name().ends_with(".hgt") {
            let mut out_file = std::fs::File::create(out_path)?;
            std::io::copy(&mut entry, &mut out_file)?;
            return Ok(());
        }
    }

    Err(TerrainError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("No .hgt file found in {}", zip_path.display()),
    )))
}

/// Terrain transport that reads heights from local `.hgt` tiles.
///
/// Tile I/O runs on tokio's blocking pool so the engine's control task is
/// never stalled by disk access. In a coordinate call, a point outside
/// coverage, in a missing tile or on a void sample gets [`NO_DATA`]; only
/// I/O and corrupt tiles fail the whole call. Path and carpet queries fail on
/// the first point without data.
#[derive(Clone)]
pub struct SrtmTransport {
    store: Arc<TileStore>,
}

impl SrtmTransport {
    /// Transport over `data_dir` with default settings.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        SrtmTransportBuilder::new(data_dir).build()
    }

    /// Builder for more configuration options.
    pub fn builder<P: AsRef<Path>>(data_dir: P) -> SrtmTransportBuilder {
        SrtmTransportBuilder::new(data_dir)
    }

    /// Directory tiles are read from.
    pub fn data_dir(&self) -> &Path {
        &self.store.data_dir
    }

    /// Maximum number of tiles kept mapped.
    pub fn cache_capacity(&self) -> u64 {
        self.store.tiles.policy().max_capacity().unwrap_or(0)
    }

    /// Tile cache statistics.
    pub fn cache_stats(&self) -> TileCacheStats {
        TileCacheStats {
            entry_count: self.store.tiles.entry_count(),
            hit_count: self.store.hit_count.load(Ordering::Relaxed),
            miss_count: self.store.miss_count.load(Ordering::Relaxed),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&TileStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| TerrainError::Transport {
                reason: format!("tile lookup task failed: {}", e),
            })?
    }
}

#[async_trait]
impl Transport for SrtmTransport {
    async fn coordinate_heights(&self, points: &[Coordinate]) -> Result<Vec<f64>> {
        let points = points.to_vec();
        self.blocking(move |store| store.heights(&points)).await
    }

    async fn path_heights(&self, from: Coordinate, to: Coordinate) -> Result<PathHeights> {
        self.blocking(move |store| store.path(from, to)).await
    }

    async fn carpet_heights(
        &self,
        sw: Coordinate,
        ne: Coordinate,
        stats_only: bool,
    ) -> Result<CarpetHeights> {
        self.blocking(move |store| store.carpet(sw, ne, stats_only))
            .await
    }
}

/// Builder for [`SrtmTransport`].
pub struct SrtmTransportBuilder {
    data_dir: PathBuf,
    cache_size: u64,
    sample_spacing: f64,
    max_carpet_samples: usize,
}

impl SrtmTransportBuilder {
    /// Start a builder reading tiles from `data_dir`.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            cache_size: DEFAULT_CACHE_SIZE,
            sample_spacing: DEFAULT_SAMPLE_SPACING,
            max_carpet_samples: DEFAULT_MAX_CARPET_SAMPLES,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `TERRAIN_DATA_DIR` | Directory containing .hgt files | Required |
    /// | `TERRAIN_CACHE_SIZE` | Maximum tiles kept mapped | 100 |
    ///
    /// # Errors
    ///
    /// Returns an error if `TERRAIN_DATA_DIR` is not set.
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("TERRAIN_DATA_DIR").map_err(|_| {
            TerrainError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "TERRAIN_DATA_DIR environment variable not set",
            ))
        })?;

        let cache_size = std::env::var("TERRAIN_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CACHE_SIZE);

        Ok(Self::new(data_dir).cache_size(cache_size))
    }

    /// Maximum number of tiles kept mapped. Default is 100.
    pub fn cache_size(mut self, size: u64) -> Self {
        self.cache_size = size;
        self
    }

    /// Distance in degrees between path and carpet samples.
    pub fn sample_spacing(mut self, degrees: f64) -> Self {
        self.sample_spacing = degrees;
        self
    }

    /// Upper bound on the number of samples a carpet query may produce.
    pub fn max_carpet_samples(mut self, limit: usize) -> Self {
        self.max_carpet_samples = limit;
        self
    }

    /// Build the [`SrtmTransport`].
    pub fn build(self) -> SrtmTransport {
        SrtmTransport {
            store: Arc::new(TileStore {
                data_dir: self.data_dir,
                tiles: Cache::builder().max_capacity(self.cache_size).build(),
                hit_count: AtomicU64::new(0),
                miss_count: AtomicU64::new(0),
                sample_spacing: self.sample_spacing,
                max_carpet_samples: self.max_carpet_samples,
            }),
        }
    }
}
