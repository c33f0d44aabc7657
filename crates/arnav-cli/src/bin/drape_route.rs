//! CLI tool to drape a walking route over terrain and print it as JSON.

use std::sync::Arc;

use anyhow::Context;
use arnav_cli::init_tracing;
use arnav_cli::sim::RollingHills;
use arnav_core::drape::drape;
use arnav_core::models::{Route, SpatialReference};
use arnav_core::routing::maneuvers_for_path;
use arnav_core::spatial::path_length_m;
use arnav_core::terrain::{ElevationSource, TerrainSurface};
use arnav_nav::{Config, GridSettings, OpenMeteoTerrain};
use clap::Parser;
use reqwest::Client;

/// Drape a route over terrain and print the draped path
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Route vertex as "lat,lon"; repeat for each vertex
    #[arg(long = "point", required = true, num_args = 1)]
    points: Vec<String>,

    /// Use synthetic hills instead of the elevation service
    #[arg(long)]
    synthetic: bool,

    /// Maximum vertex spacing in meters (overrides ARNAV_DENSIFY_MAX_SPACING)
    #[arg(long)]
    spacing: Option<f64>,

    /// Print the route alongside the draped path
    #[arg(long)]
    with_route: bool,
}

fn parse_point(value: &str) -> anyhow::Result<(f64, f64)> {
    let (lat, lon) = value
        .split_once(',')
        .with_context(|| format!("expected \"lat,lon\", got \"{}\"", value))?;
    Ok((lat.trim().parse()?, lon.trim().parse()?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("arnav_core=info")?;
    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(spacing) = args.spacing {
        config.densify_max_spacing = spacing;
    }

    let points = args
        .points
        .iter()
        .map(|value| parse_point(value))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let sr = SpatialReference::WebMercator;
    let route = Route {
        name: "Command line route".to_string(),
        geometry: points.iter().map(|(lat, lon)| sr.from_lat_lon(*lat, *lon)).collect(),
        maneuvers: maneuvers_for_path(&points),
        spatial_reference: sr,
        total_length_m: path_length_m(&points),
    };

    let source: Arc<dyn ElevationSource> = if args.synthetic {
        Arc::new(RollingHills::default())
    } else {
        Arc::new(OpenMeteoTerrain::new(
            Client::new(),
            GridSettings::from_config(&config),
            points.clone(),
        ))
    };
    let surface = TerrainSurface::new(source);
    let path = drape(&route, &surface, &config.drape_config()).await?;

    let output = if args.with_route {
        serde_json::json!({ "route": route, "path": path })
    } else {
        serde_json::to_value(&path)?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points() {
        assert_eq!(parse_point("34.05, -118.25").unwrap(), (34.05, -118.25));
        assert!(parse_point("34.05").is_err());
        assert!(parse_point("north,-118").is_err());
    }
}
