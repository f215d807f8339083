//! Add heights to every coordinate of a file.
//!
//! All rows (or features) are submitted to the engine before any result is
//! awaited, so the whole file is answered by a handful of transport calls.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use terrain::geojson::add_heights_to_geometry;
use terrain::{Coordinate, EngineHandle, HeightRequest, TerrainError};

use super::Options;

const VOID: &str = "void";

pub async fn run(
    options: &Options,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: &str,
    lon_col: &str,
) -> Result<()> {
    let engine = options.engine()?;

    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let output_path = match extension.as_str() {
        "csv" => {
            let output = output.unwrap_or_else(|| default_output(&input, "csv"));
            process_csv(&engine, &input, &output, lat_col, lon_col).await?;
            output
        }
        "geojson" | "json" => {
            let output = output.unwrap_or_else(|| default_output(&input, "geojson"));
            process_geojson(&engine, &input, &output).await?;
            output
        }
        _ => bail!(
            "Unsupported file format: {}. Use .csv or .geojson",
            extension
        ),
    };

    let stats = engine.stats();
    println!(
        "{} points answered by {} transport call(s)",
        stats.points_dispatched, stats.dispatches
    );
    println!("Output written to: {}", output_path.display());
    Ok(())
}

fn default_output(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_height.{}", stem, extension))
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn parse_field(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64> {
    record
        .get(index)
        .with_context(|| format!("Missing {}", name))?
        .trim()
        .parse()
        .with_context(|| format!("Invalid {}", name))
}

async fn process_csv(
    engine: &EngineHandle,
    input: &Path,
    output: &Path,
    lat_col: &str,
    lon_col: &str,
) -> Result<()> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;

    // Submit every row up front. Uncovered rows are never sent.
    let mut requests: Vec<Option<HeightRequest>> = Vec::with_capacity(records.len());
    for record in &records {
        let lat = parse_field(record, lat_idx, "latitude")?;
        let lon = parse_field(record, lon_idx, "longitude")?;
        let request = Coordinate::new(lat, lon)
            .covered()
            .ok()
            .map(|point| engine.submit(vec![point]));
        requests.push(request);
    }

    let output_file = File::create(output).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("height");
    writer.write_record(&new_headers)?;

    let pb = progress_bar(records.len() as u64)?;
    for (record, request) in records.iter().zip(requests) {
        let height = match request {
            Some(request) => request
                .heights()
                .await
                .ok()
                .and_then(|h| h.first().copied())
                .filter(|h| !h.is_nan())
                .map(|h| format!("{:.2}", h))
                .unwrap_or_else(|| VOID.to_string()),
            None => VOID.to_string(),
        };

        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(&height);
        writer.write_record(&new_record)?;
        pb.inc(1);
    }
    pb.finish_with_message("done");
    writer.flush()?;

    Ok(())
}

async fn process_geojson(engine: &EngineHandle, input: &Path, output: &Path) -> Result<()> {
    let file = File::open(input).context("Failed to open input file")?;
    let geojson: geojson::GeoJson =
        serde_json::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;

    let result = match geojson {
        geojson::GeoJson::Geometry(geometry) => geojson::GeoJson::Geometry(
            add_heights_to_geometry(engine, geometry)
                .await
                .context("Failed to add heights")?,
        ),
        geojson::GeoJson::Feature(mut feature) => {
            if let Some(geometry) = feature.geometry.take() {
                feature.geometry = Some(
                    add_heights_to_geometry(engine, geometry)
                        .await
                        .context("Failed to add heights")?,
                );
            }
            geojson::GeoJson::Feature(feature)
        }
        geojson::GeoJson::FeatureCollection(mut fc) => {
            // One task per feature so all of them land in the same window.
            let originals: Vec<_> = fc.features.iter().map(|f| f.geometry.clone()).collect();
            let tasks: Vec<_> = fc
                .features
                .iter_mut()
                .map(|feature| {
                    feature.geometry.take().map(|geometry| {
                        let engine = engine.clone();
                        tokio::spawn(
                            async move { add_heights_to_geometry(&engine, geometry).await },
                        )
                    })
                })
                .collect();

            let pb = progress_bar(fc.features.len() as u64)?;
            let mut without_data = 0;
            for ((feature, original), task) in fc.features.iter_mut().zip(originals).zip(tasks) {
                if let Some(task) = task {
                    match task.await.context("Height task failed")? {
                        Ok(geometry) => feature.geometry = Some(geometry),
                        Err(TerrainError::NoData { .. }) => {
                            feature.geometry = original;
                            without_data += 1;
                        }
                        Err(e) => return Err(e).context("Failed to add heights"),
                    }
                }
                pb.inc(1);
            }
            pb.finish_with_message("done");
            if without_data > 0 {
                println!("{} feature(s) left unchanged: no terrain data", without_data);
            }
            geojson::GeoJson::FeatureCollection(fc)
        }
    };

    let output_file = File::create(output).context("Failed to create output file")?;
    let mut writer = BufWriter::new(output_file);
    serde_json::to_writer_pretty(&mut writer, &result)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SRTM3_SAMPLES: usize = 1201;

    fn flat_tile(dir: &Path, filename: &str, height: i16) {
        let data: Vec<u8> = std::iter::repeat(height.to_be_bytes())
            .take(SRTM3_SAMPLES * SRTM3_SAMPLES)
            .flatten()
            .collect();
        std::fs::write(dir.join(filename), data).unwrap();
    }

    fn options(dir: &TempDir) -> Options {
        Options {
            data_dir: Some(dir.path().to_path_buf()),
            cache_size: 10,
            batch_window_ms: 50,
        }
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output(Path::new("/tmp/points.csv"), "csv"),
            PathBuf::from("/tmp/points_height.csv")
        );
    }

    #[tokio::test]
    async fn test_csv_rows_share_one_dispatch() {
        let tmp = TempDir::new().unwrap();
        flat_tile(tmp.path(), "N35E138.hgt", 250);
        let input = tmp.path().join("points.csv");
        std::fs::write(
            &input,
            "name,lat,lon\na,35.1,138.1\nb,35.2,138.2\nfar,75.0,0.0\nc,35.3,138.3\n",
        )
        .unwrap();
        let output = tmp.path().join("out.csv");

        let engine = options(&tmp).engine().unwrap();
        process_csv(&engine, &input, &output, "lat", "lon")
            .await
            .unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "name,lat,lon,height");
        assert_eq!(lines[1], "a,35.1,138.1,250.00");
        assert_eq!(lines[3], "far,75.0,0.0,void");
        assert_eq!(lines[4], "c,35.3,138.3,250.00");
        assert_eq!(engine.stats().dispatches, 1);
        assert_eq!(engine.stats().points_dispatched, 3);
    }

    #[tokio::test]
    async fn test_csv_row_without_data_leaves_others_intact() {
        let tmp = TempDir::new().unwrap();
        flat_tile(tmp.path(), "N35E138.hgt", 250);
        let input = tmp.path().join("points.csv");
        std::fs::write(
            &input,
            "name,lat,lon\na,35.1,138.1\nsea,10.5,10.5\nc,35.3,138.3\n",
        )
        .unwrap();
        let output = tmp.path().join("out.csv");

        let engine = options(&tmp).engine().unwrap();
        process_csv(&engine, &input, &output, "lat", "lon")
            .await
            .unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[1], "a,35.1,138.1,250.00");
        assert_eq!(lines[2], "sea,10.5,10.5,void");
        assert_eq!(lines[3], "c,35.3,138.3,250.00");
        assert_eq!(engine.stats().dispatches, 1);
        assert_eq!(engine.stats().points_dispatched, 3);
    }

    #[tokio::test]
    async fn test_csv_missing_column() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("points.csv");
        std::fs::write(&input, "y,x\n35.1,138.1\n").unwrap();

        let engine = options(&tmp).engine().unwrap();
        let result = process_csv(&engine, &input, &tmp.path().join("out.csv"), "lat", "lon").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_feature_collection_gets_heights() {
        let tmp = TempDir::new().unwrap();
        flat_tile(tmp.path(), "N35E138.hgt", 120);
        let input = tmp.path().join("features.geojson");
        std::fs::write(
            &input,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [138.5, 35.5]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "LineString", "coordinates": [[138.1, 35.1], [138.2, 35.2]]}}
            ]}"#,
        )
        .unwrap();
        let output = tmp.path().join("out.geojson");

        let engine = options(&tmp).engine().unwrap();
        process_geojson(&engine, &input, &output).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        let features = written["features"].as_array().unwrap();
        assert_eq!(features[0]["geometry"]["coordinates"][2], 120.0);
        assert_eq!(features[1]["geometry"]["coordinates"][1][2], 120.0);
        assert_eq!(engine.stats().dispatches, 1);
    }

    #[tokio::test]
    async fn test_feature_without_data_kept_unchanged() {
        let tmp = TempDir::new().unwrap();
        flat_tile(tmp.path(), "N35E138.hgt", 120);
        let input = tmp.path().join("features.geojson");
        std::fs::write(
            &input,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [10.5, 10.5]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [138.5, 35.5]}}
            ]}"#,
        )
        .unwrap();
        let output = tmp.path().join("out.geojson");

        let engine = options(&tmp).engine().unwrap();
        process_geojson(&engine, &input, &output).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        let features = written["features"].as_array().unwrap();
        assert_eq!(
            features[0]["geometry"]["coordinates"],
            serde_json::json!([10.5, 10.5])
        );
        assert_eq!(features[1]["geometry"]["coordinates"][2], 120.0);
        assert_eq!(engine.stats().dispatches, 1);
    }
}
