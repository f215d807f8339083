use anyhow::{Context, Result};
use serde::Serialize;
use terrain::Coordinate;

use super::Options;

#[derive(Serialize)]
struct HeightResponse {
    lat: f64,
    lon: f64,
    /// `null` where there is no terrain data.
    height: Option<f64>,
}

pub async fn run(options: &Options, lat: f64, lon: f64, json: bool) -> Result<()> {
    let point = Coordinate::new(lat, lon)
        .covered()
        .context("Invalid coordinate")?;
    let engine = options.engine()?;

    let heights = engine
        .heights(vec![point])
        .await
        .context("Failed to get height")?;
    let height = *heights.first().context("No height returned")?;
    let height = (!height.is_nan()).then_some(height);

    if json {
        let response = HeightResponse { lat, lon, height };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        match height {
            Some(height) => println!("{:.2}", height),
            None => println!("void"),
        }
    }

    Ok(())
}
