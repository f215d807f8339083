//! Geographic coordinates and tile naming.
//!
//! A [`Coordinate`] is the unit every terrain query is expressed in. Tiles
//! covering a coordinate follow the SRTM naming convention
//! `{N|S}{lat:02}{E|W}{lon:03}.hgt`, named after their **southwest corner**.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

impl Coordinate {
    /// Create a coordinate from latitude and longitude.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether the coordinate lies inside SRTM coverage
    /// (latitude ±60°, longitude ±180°).
    pub fn is_covered(&self) -> bool {
        (-60.0..=60.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Return the coordinate back if it is covered, otherwise `OutOfBounds`.
    pub fn covered(self) -> Result<Self> {
        if self.is_covered() {
            Ok(self)
        } else {
            Err(TerrainError::OutOfBounds {
                lat: self.lat,
                lon: self.lon,
            })
        }
    }

    /// Integer southwest corner of the 1°×1° tile containing this coordinate.
    pub fn tile_key(&self) -> (i32, i32) {
        (self.lat.floor() as i32, self.lon.floor() as i32)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self { lat, lon }
    }
}

/// Build the `.hgt` filename for a tile's southwest corner.
///
/// # Examples
///
/// ```
/// use terrain::coord::tile_filename;
///
/// assert_eq!(tile_filename(35, 138), "N35E138.hgt");
/// assert_eq!(tile_filename(-13, -78), "S13W078.hgt");
/// ```
pub fn tile_filename(lat: i32, lon: i32) -> String {
    let lat_prefix = if lat >= 0 { 'N' } else { 'S' };
    let lon_prefix = if lon >= 0 { 'E' } else { 'W' };
    format!(
        "{}{:02}{}{:03}.hgt",
        lat_prefix,
        lat.abs(),
        lon_prefix,
        lon.abs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_key_floors() {
        assert_eq!(Coordinate::new(35.5, 138.7).tile_key(), (35, 138));
        // floor(-12.3) = -13, floor(-77.1) = -78
        assert_eq!(Coordinate::new(-12.3, -77.1).tile_key(), (-13, -78));
        assert_eq!(Coordinate::new(-0.1, 0.0).tile_key(), (-1, 0));
    }

    #[test]
    fn test_tile_filename() {
        assert_eq!(tile_filename(35, 138), "N35E138.hgt");
        assert_eq!(tile_filename(0, 0), "N00E000.hgt");
        assert_eq!(tile_filename(-1, -1), "S01W001.hgt");
        assert_eq!(tile_filename(19, -100), "N19W100.hgt");
    }

    #[test]
    fn test_coverage() {
        assert!(Coordinate::new(60.0, 180.0).is_covered());
        assert!(Coordinate::new(-60.0, -180.0).is_covered());
        assert!(!Coordinate::new(61.0, 0.0).is_covered());
        assert!(!Coordinate::new(0.0, -181.0).is_covered());

        assert!(matches!(
            Coordinate::new(70.0, 0.0).covered(),
            Err(TerrainError::OutOfBounds { .. })
        ));
    }
}
