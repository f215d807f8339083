use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::Options;

/// Terrain height query tool
#[derive(Parser)]
#[command(name = "terrain")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing .hgt files
    #[arg(short, long, env = "TERRAIN_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Maximum tiles in cache
    #[arg(
        short,
        long,
        env = "TERRAIN_CACHE_SIZE",
        default_value = "100",
        global = true
    )]
    cache_size: u64,

    /// Coalescing window for coordinate lookups, in milliseconds
    #[arg(
        short,
        long,
        env = "TERRAIN_BATCH_WINDOW_MS",
        default_value = "500",
        global = true
    )]
    batch_window_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the height at a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add heights to every coordinate of a CSV or GeoJSON file
    Batch {
        /// Input file (CSV or GeoJSON)
        input: PathBuf,

        /// Output file (same format as input if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude (CSV only)
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude (CSV only)
        #[arg(long, default_value = "lon")]
        lon_col: String,
    },

    /// Height profile along a straight segment
    Path {
        /// Start latitude
        #[arg(long, allow_hyphen_values = true)]
        from_lat: f64,

        /// Start longitude
        #[arg(long, allow_hyphen_values = true)]
        from_lon: f64,

        /// End latitude
        #[arg(long, allow_hyphen_values = true)]
        to_lat: f64,

        /// End longitude
        #[arg(long, allow_hyphen_values = true)]
        to_lon: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Height grid over a rectangular area
    Carpet {
        /// Southern edge latitude
        #[arg(long, allow_hyphen_values = true)]
        south: f64,

        /// Western edge longitude
        #[arg(long, allow_hyphen_values = true)]
        west: f64,

        /// Northern edge latitude
        #[arg(long, allow_hyphen_values = true)]
        north: f64,

        /// Eastern edge longitude
        #[arg(long, allow_hyphen_values = true)]
        east: f64,

        /// Only report the height range
        #[arg(long)]
        stats_only: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let options = Options {
        data_dir: cli.data_dir,
        cache_size: cli.cache_size,
        batch_window_ms: cli.batch_window_ms,
    };

    match cli.command {
        Commands::Query { lat, lon, json } => commands::query::run(&options, lat, lon, json).await,
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
        } => commands::batch::run(&options, input, output, &lat_col, &lon_col).await,
        Commands::Path {
            from_lat,
            from_lon,
            to_lat,
            to_lon,
            json,
        } => commands::path::run(&options, (from_lat, from_lon), (to_lat, to_lon), json).await,
        Commands::Carpet {
            south,
            west,
            north,
            east,
            stats_only,
            json,
        } => {
            commands::carpet::run(&options, (south, west), (north, east), stats_only, json).await
        }
    }
}
