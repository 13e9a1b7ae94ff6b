#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line driver for SaferPlace region loading.
//!
//! `regions` works offline. The other commands talk to the viewer
//! service configured via `--config` or `SAFERPLACE_BACKEND`.

mod output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use saferplace_region::{
    DEFAULT_REGION_LIMIT, Decomposition, IncidentLoader, LoadPhase, LoaderOptions, decompose,
};
use saferplace_region_models::BoundingBox;
use saferplace_viewer::config::configured_cell_size;
use saferplace_viewer::{ClientConfig, ViewerClient};
use saferplace_viewer_models::AlertWindow;

#[derive(Parser)]
#[command(name = "saferplace", about = "SaferPlace incident map client")]
struct Cli {
    /// TOML config file with the viewer backend settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the grid regions that cover a viewport
    Regions {
        #[command(flatten)]
        bounds: BoundsArgs,
        #[command(flatten)]
        grid: GridArgs,
    },
    /// Load every incident visible in a viewport
    Incidents {
        #[command(flatten)]
        bounds: BoundsArgs,
        #[command(flatten)]
        grid: GridArgs,
        /// Print the incidents as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show a single incident
    Incident {
        /// Incident ID
        id: String,
        /// Print the incident as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent alerts in the region around a position
    Alerting {
        /// Latitude of the position
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude of the position
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// How far back to look (hour, day or week)
        #[arg(long, default_value = "day")]
        window: AlertWindow,
    },
}

/// The viewport, either as `--bbox` or as four separate edges.
#[derive(Args)]
struct BoundsArgs {
    /// Viewport as "west,south,east,north"
    #[arg(long, allow_hyphen_values = true, conflicts_with_all = ["north", "south", "east", "west"])]
    bbox: Option<BoundingBox>,
    /// Northern edge of the viewport
    #[arg(long, allow_negative_numbers = true)]
    north: Option<f64>,
    /// Southern edge of the viewport
    #[arg(long, allow_negative_numbers = true)]
    south: Option<f64>,
    /// Eastern edge of the viewport
    #[arg(long, allow_negative_numbers = true)]
    east: Option<f64>,
    /// Western edge of the viewport
    #[arg(long, allow_negative_numbers = true)]
    west: Option<f64>,
}

impl BoundsArgs {
    fn bounding_box(&self) -> Result<BoundingBox, String> {
        if let Some(bbox) = self.bbox {
            return Ok(bbox);
        }
        match (self.west, self.south, self.east, self.north) {
            (Some(west), Some(south), Some(east), Some(north)) => {
                Ok(BoundingBox::new(west, south, east, north))
            }
            _ => Err("pass --bbox or all of --north, --south, --east and --west".to_string()),
        }
    }
}

#[derive(Args)]
struct GridArgs {
    /// Region size in degrees (defaults to the configured cell size)
    #[arg(long)]
    cell_size: Option<f64>,
    /// Maximum rows or columns a viewport may span
    #[arg(long, default_value_t = DEFAULT_REGION_LIMIT)]
    limit: u32,
}

fn print_zoom_in(rows: i64, columns: i64, limit: u32) {
    println!(
        "Viewport spans {rows} rows and {columns} columns of regions (limit {limit}). Zoom in."
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    match cli.command {
        Commands::Regions { bounds, grid } => {
            let bbox = bounds.bounding_box()?;
            let cell_size = match grid.cell_size {
                Some(cell_size) => cell_size,
                None => configured_cell_size(cli.config.as_deref())?,
            };

            match decompose(Some(&bbox), cell_size, grid.limit)? {
                Decomposition::Regions(regions) => {
                    print!("{}", output::regions_table(&regions));
                    println!("{} region(s)", regions.len());
                }
                Decomposition::TooManyRegions {
                    rows,
                    columns,
                    limit,
                } => print_zoom_in(rows, columns, limit),
            }
        }
        Commands::Incidents { bounds, grid, json } => {
            let bbox = bounds.bounding_box()?;
            let config = ClientConfig::load(cli.config.as_deref())?;
            let options = LoaderOptions {
                cell_size: grid.cell_size.unwrap_or(config.cell_size),
                region_limit: grid.limit,
                ..LoaderOptions::default()
            };
            let client = ViewerClient::new(&config)?;
            let loader = IncidentLoader::new(Arc::new(client), options);

            let start = Instant::now();
            let incidents = loader.load(Some(&bbox)).await?;

            if let LoadPhase::TooManyRegions {
                rows,
                columns,
                limit,
            } = loader.phase()
            {
                print_zoom_in(rows, columns, limit);
                return Ok(());
            }

            log::info!(
                "Loaded {} incident(s) from {} region(s) in {:.1}s",
                incidents.len(),
                loader.cached_regions(),
                start.elapsed().as_secs_f64()
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&incidents)?);
            } else {
                print!("{}", output::incidents_table(&incidents));
            }
        }
        Commands::Incident { id, json } => {
            let config = ClientConfig::load(cli.config.as_deref())?;
            let client = ViewerClient::new(&config)?;
            let incident = client.view_incident(&id).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&incident)?);
            } else {
                print!("{}", output::incident_details(&incident));
            }
        }
        Commands::Alerting { lat, lon, window } => {
            let config = ClientConfig::load(cli.config.as_deref())?;
            let client = ViewerClient::new(&config)?;
            let alerts = client.alerts_near(lat, lon, window).await?;

            if alerts.is_empty() {
                println!("No alerts in the last {window}.");
            } else {
                print!("{}", output::incidents_table(&alerts));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_negative_edges() {
        let cli = Cli::try_parse_from([
            "saferplace",
            "regions",
            "--north",
            "53.35",
            "--south",
            "53.34",
            "--east",
            "-6.29",
            "--west",
            "-6.30",
        ])
        .unwrap();

        let Commands::Regions { bounds, grid } = cli.command else {
            panic!("expected regions");
        };
        assert_eq!(
            bounds.bounding_box().unwrap(),
            BoundingBox::new(-6.30, 53.34, -6.29, 53.35)
        );
        assert_eq!(grid.limit, DEFAULT_REGION_LIMIT);
        assert!(grid.cell_size.is_none());
    }

    #[test]
    fn parses_bbox() {
        let cli = Cli::try_parse_from([
            "saferplace",
            "incidents",
            "--bbox",
            "-6.30,53.34,-6.29,53.35",
            "--json",
        ])
        .unwrap();

        let Commands::Incidents { bounds, json, .. } = cli.command else {
            panic!("expected incidents");
        };
        assert!(json);
        assert_eq!(
            bounds.bounding_box().unwrap(),
            BoundingBox::new(-6.30, 53.34, -6.29, 53.35)
        );
    }

    #[test]
    fn missing_edges_are_reported() {
        let cli = Cli::try_parse_from(["saferplace", "regions", "--north", "53.35"]).unwrap();
        let Commands::Regions { bounds, .. } = cli.command else {
            panic!("expected regions");
        };
        assert!(bounds.bounding_box().is_err());
    }

    #[test]
    fn parses_alert_window() {
        let cli = Cli::try_parse_from([
            "saferplace",
            "alerting",
            "--lat",
            "53.35",
            "--lon",
            "-6.30",
            "--window",
            "week",
        ])
        .unwrap();

        let Commands::Alerting { window, .. } = cli.command else {
            panic!("expected alerting");
        };
        assert_eq!(window, AlertWindow::Week);
    }
}
