use anyhow::{Context, Result};
use std::sync::Arc;
use terrain::{CarpetQuery, Coordinate};

use super::Options;

pub async fn run(
    options: &Options,
    south_west: (f64, f64),
    north_east: (f64, f64),
    stats_only: bool,
    json: bool,
) -> Result<()> {
    let query = CarpetQuery::new(Arc::new(options.transport()?));

    let carpet = query
        .request(
            Coordinate::from(south_west),
            Coordinate::from(north_east),
            stats_only,
        )
        .await
        .context("Failed to get carpet heights")?;

    if json {
        println!("{}", serde_json::to_string(&carpet)?);
        return Ok(());
    }

    println!("Min height: {:.2}", carpet.min_height);
    println!("Max height: {:.2}", carpet.max_height);

    // Print north to south so the grid reads like a map
    for row in carpet.carpet.iter().rev() {
        let line: Vec<String> = row.iter().map(|h| format!("{:.0}", h)).collect();
        println!("{}", line.join(" "));
    }

    Ok(())
}
