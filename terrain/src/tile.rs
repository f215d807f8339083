//! Memory-mapped `.hgt` tiles.
//!
//! An `.hgt` file is a square grid of big-endian `i16` samples stored north to
//! south, west to east. Its side length gives the resolution:
//!
//! - **SRTM1**: 3601×3601 samples, 1 arc-second (~30m)
//! - **SRTM3**: 1201×1201 samples, 3 arc-second (~90m)
//!
//! The value -32768 marks a void (no data) sample.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Result, TerrainError};

const SRTM1_SAMPLES: usize = 3601;
const SRTM3_SAMPLES: usize = 1201;

/// Value indicating no data (void) in `.hgt` files.
pub const VOID_VALUE: i16 = -32768;

/// Resolution of a loaded tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 1 arc-second
    Srtm1,
    /// 3 arc-second
    Srtm3,
}

impl Resolution {
    /// Samples per row/column.
    pub fn samples(&self) -> usize {
        match self {
            Resolution::Srtm1 => SRTM1_SAMPLES,
            Resolution::Srtm3 => SRTM3_SAMPLES,
        }
    }

    fn from_len(len: usize) -> Option<Self> {
        [Resolution::Srtm1, Resolution::Srtm3]
            .into_iter()
            .find(|r| r.samples() * r.samples() * 2 == len)
    }
}

/// A single 1°×1° elevation tile backed by a read-only memory map.
pub struct HgtTile {
    data: Mmap,
    resolution: Resolution,
}

impl HgtTile {
    /// Map an `.hgt` file, detecting the resolution from its size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;

        // SAFETY: the file is opened read-only and the mapping never escapes
        // this struct; tiles are not rewritten while the process runs.
        let data = unsafe { Mmap::map(&file)? };

        let resolution = Resolution::from_len(data.len())
            .ok_or(TerrainError::InvalidFileSize { size: data.len() })?;

        Ok(Self { data, resolution })
    }

    /// Tile resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Height in meters at a coordinate inside this tile.
    ///
    /// Uses bilinear interpolation between the four surrounding samples.
    /// If any of them is void the nearest sample is used instead, and `None`
    /// is returned when that one is void too.
    pub fn height_at(&self, lat: f64, lon: f64) -> Option<f64> {
        let last = (self.resolution.samples() - 1) as f64;

        // Row 0 is the north edge.
        let y = (1.0 - (lat - lat.floor())) * last;
        let x = (lon - lon.floor()) * last;

        let row0 = (y.floor() as usize).min(self.resolution.samples() - 1);
        let col0 = (x.floor() as usize).min(self.resolution.samples() - 1);
        let row1 = (row0 + 1).min(self.resolution.samples() - 1);
        let col1 = (col0 + 1).min(self.resolution.samples() - 1);

        let corners = [
            self.sample(row0, col0),
            self.sample(row0, col1),
            self.sample(row1, col0),
            self.sample(row1, col1),
        ];

        if corners.contains(&VOID_VALUE) {
            let nearest = self.sample(y.round() as usize, x.round() as usize);
            return (nearest != VOID_VALUE).then_some(nearest as f64);
        }

        let dy = y - row0 as f64;
        let dx = x - col0 as f64;
        let [nw, ne, sw, se] = corners.map(f64::from);

        let north = nw + (ne - nw) * dx;
        let south = sw + (se - sw) * dx;
        Some(north + (south - north) * dy)
    }

    fn sample(&self, row: usize, col: usize) -> i16 {
        let samples = self.resolution.samples();
        let offset = (row.min(samples - 1) * samples + col.min(samples - 1)) * 2;
        i16::from_be_bytes([self.data[offset], self.data[offset + 1]])
    }
}
