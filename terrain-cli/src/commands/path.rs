use anyhow::{Context, Result};
use std::sync::Arc;
use terrain::{Coordinate, PathQuery};

use super::Options;

pub async fn run(
    options: &Options,
    from: (f64, f64),
    to: (f64, f64),
    json: bool,
) -> Result<()> {
    let query = PathQuery::new(Arc::new(options.transport()?));

    let from = Coordinate::from(from);
    let to = Coordinate::from(to);
    let path = query
        .request(from, to)
        .await
        .context("Failed to get path heights")?;

    if json {
        println!("{}", serde_json::to_string(&path)?);
        return Ok(());
    }

    for (i, height) in path.heights.iter().enumerate() {
        let lat = from.lat + path.lat_step * i as f64;
        let lon = from.lon + path.lon_step * i as f64;
        println!("{:.6},{:.6},{:.2}", lat, lon, height);
    }

    Ok(())
}
