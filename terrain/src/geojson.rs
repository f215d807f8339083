//! GeoJSON height enrichment.
//!
//! Enable the `geojson` feature to use this module. Every position of a
//! geometry is sent to the engine as **one** submission, so a large
//! LineString or MultiPolygon is answered with a single transport call and
//! still shares it with concurrent callers.
//!
//! ```ignore
//! use terrain::geojson::add_heights_to_geometry;
//!
//! let geometry: geojson::Geometry =
//!     r#"{"type": "Point", "coordinates": [138.7274, 35.3606]}"#.parse()?;
//! let enriched = add_heights_to_geometry(&engine, geometry).await?;
//! // {"type": "Point", "coordinates": [138.7274, 35.3606, 3776.0]}
//! ```

use geojson::{Geometry, Value as GeoJsonValue};

use crate::coord::Coordinate;
use crate::engine::EngineHandle;
use crate::error::{Result, TerrainError};

/// Set the height of every position in `geometry` as its Z coordinate.
///
/// Positions are in GeoJSON order `[lon, lat]` or `[lon, lat, alt]`; an
/// existing altitude is replaced. All geometry types are supported,
/// including nested collections.
///
/// # Errors
///
/// - [`TerrainError::InvalidGeometry`] if a position has fewer than 2 elements
/// - [`TerrainError::OutOfBounds`] if a position lies outside terrain coverage,
///   checked before anything is submitted
/// - [`TerrainError::NoData`] for the first position the transport has no
///   height for; the geometry is not modified
/// - [`TerrainError::QueryFailed`] if the batched query failed
pub async fn add_heights_to_geometry(
    engine: &EngineHandle,
    mut geometry: Geometry,
) -> Result<Geometry> {
    let mut positions = Vec::new();
    collect_positions(&mut geometry.value, &mut positions);

    let coordinates = positions
        .iter()
        .map(|position| match position.as_slice() {
            [lon, lat, ..] => Coordinate::new(*lat, *lon).covered(),
            _ => Err(TerrainError::InvalidGeometry {
                message: "Position must have at least 2 elements (lon, lat)".to_string(),
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    let heights = engine.heights(coordinates).await?;
    if let Some(i) = heights.iter().position(|h| h.is_nan()) {
        return Err(TerrainError::NoData {
            lat: positions[i][1],
            lon: positions[i][0],
        });
    }

    for (position, height) in positions.into_iter().zip(heights) {
        position.truncate(2);
        position.push(height);
    }
    Ok(geometry)
}

/// Positions of `value` in document order.
fn collect_positions<'a>(value: &'a mut GeoJsonValue, out: &mut Vec<&'a mut Vec<f64>>) {
    match value {
        GeoJsonValue::Point(position) => out.push(position),
        GeoJsonValue::MultiPoint(positions) | GeoJsonValue::LineString(positions) => {
            out.extend(positions.iter_mut())
        }
        GeoJsonValue::MultiLineString(lines) | GeoJsonValue::Polygon(lines) => {
            out.extend(lines.iter_mut().flatten())
        }
        GeoJsonValue::MultiPolygon(polygons) => out.extend(polygons.iter_mut().flatten().flatten()),
        GeoJsonValue::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_positions(&mut geometry.value, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{CarpetHeights, PathHeights, Transport, NO_DATA};
    use crate::BatchConfig;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Height = lat + lon, so each position's Z is easy to predict.
    /// West of the prime meridian there is no data.
    struct SumTransport;

    #[async_trait]
    impl Transport for SumTransport {
        async fn coordinate_heights(&self, points: &[Coordinate]) -> Result<Vec<f64>> {
            Ok(points
                .iter()
                .map(|p| if p.lon < 0.0 { NO_DATA } else { p.lat + p.lon })
                .collect())
        }

        async fn path_heights(&self, _from: Coordinate, _to: Coordinate) -> Result<PathHeights> {
            unimplemented!()
        }

        async fn carpet_heights(
            &self,
            _sw: Coordinate,
            _ne: Coordinate,
            _stats_only: bool,
        ) -> Result<CarpetHeights> {
            unimplemented!()
        }
    }

    fn engine() -> EngineHandle {
        EngineHandle::spawn(
            SumTransport,
            BatchConfig::default().window(Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_point_gets_z() {
        let engine = engine();
        let geometry = Geometry::new(GeoJsonValue::Point(vec![138.5, 35.5]));
        let result = add_heights_to_geometry(&engine, geometry).await.unwrap();

        assert_eq!(result.value, GeoJsonValue::Point(vec![138.5, 35.5, 174.0]));
    }

    #[tokio::test]
    async fn test_existing_altitude_replaced() {
        let engine = engine();
        let geometry = Geometry::new(GeoJsonValue::LineString(vec![
            vec![1.0, 2.0, 999.0],
            vec![3.0, 4.0],
        ]));
        let result = add_heights_to_geometry(&engine, geometry).await.unwrap();

        assert_eq!(
            result.value,
            GeoJsonValue::LineString(vec![vec![1.0, 2.0, 3.0], vec![3.0, 4.0, 7.0]])
        );
    }

    #[tokio::test]
    async fn test_collection_uses_one_dispatch() {
        let engine = engine();
        let geometry = Geometry::new(GeoJsonValue::GeometryCollection(vec![
            Geometry::new(GeoJsonValue::Point(vec![1.0, 1.0])),
            Geometry::new(GeoJsonValue::Polygon(vec![vec![
                vec![0.0, 0.0],
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![0.0, 0.0],
            ]])),
            Geometry::new(GeoJsonValue::MultiPolygon(vec![vec![vec![vec![5.0, 5.0]]]])),
        ]));
        let result = add_heights_to_geometry(&engine, geometry).await.unwrap();

        let GeoJsonValue::GeometryCollection(parts) = result.value else {
            panic!("Expected GeometryCollection");
        };
        assert_eq!(parts[0].value, GeoJsonValue::Point(vec![1.0, 1.0, 2.0]));
        let GeoJsonValue::Polygon(rings) = &parts[1].value else {
            panic!("Expected Polygon");
        };
        assert_eq!(rings[0][1], vec![1.0, 0.0, 1.0]);
        assert_eq!(
            parts[2].value,
            GeoJsonValue::MultiPolygon(vec![vec![vec![vec![5.0, 5.0, 10.0]]]])
        );
        assert_eq!(engine.stats().dispatches, 1);
        assert_eq!(engine.stats().points_dispatched, 6);
    }

    #[tokio::test]
    async fn test_short_position_rejected() {
        let engine = engine();
        let geometry = Geometry::new(GeoJsonValue::Point(vec![138.5]));
        let result = add_heights_to_geometry(&engine, geometry).await;

        assert!(matches!(result, Err(TerrainError::InvalidGeometry { .. })));
        assert_eq!(engine.stats().dispatches, 0);
    }

    #[tokio::test]
    async fn test_out_of_coverage_rejected_before_submit() {
        let engine = engine();
        let geometry = Geometry::new(GeoJsonValue::MultiPoint(vec![
            vec![138.5, 35.5],
            vec![0.0, 91.0],
        ]));
        let result = add_heights_to_geometry(&engine, geometry).await;

        assert!(matches!(result, Err(TerrainError::OutOfBounds { .. })));
        assert_eq!(engine.stats().dispatches, 0);
    }

    #[tokio::test]
    async fn test_no_data_position_fails_only_its_geometry() {
        let engine = engine();
        let sea = Geometry::new(GeoJsonValue::LineString(vec![
            vec![1.0, 1.0],
            vec![-20.0, 10.0],
        ]));
        let land = Geometry::new(GeoJsonValue::Point(vec![2.0, 3.0]));

        let (sea, land) = tokio::join!(
            add_heights_to_geometry(&engine, sea),
            add_heights_to_geometry(&engine, land)
        );

        match sea {
            Err(TerrainError::NoData { lat, lon }) => {
                assert_eq!(lat, 10.0);
                assert_eq!(lon, -20.0);
            }
            other => panic!("Expected NoData, got {:?}", other),
        }
        assert_eq!(land.unwrap().value, GeoJsonValue::Point(vec![2.0, 3.0, 5.0]));
        assert_eq!(engine.stats().dispatches, 1);
    }
}
