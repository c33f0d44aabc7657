//! Live elevation provider tests.
//!
//! Run with: cargo test --test terrain_test -- --ignored
//!
//! Note: Requires network access to the elevation provider
//! (ARNAV_ELEVATION_URL, Open-Meteo by default).

use std::sync::Arc;

use arnav_core::drape::{drape, DrapeSource, SurfacePlacement};
use arnav_core::models::{Route, SpatialReference};
use arnav_core::routing::maneuvers_for_path;
use arnav_core::spatial::path_length_m;
use arnav_core::terrain::TerrainSurface;
use arnav_nav::{Config, GridSettings, OpenMeteoTerrain};
use reqwest::Client;

fn hillside_walk() -> Vec<(f64, f64)> {
    // Griffith Park, Los Angeles
    vec![(34.1184, -118.3004), (34.1200, -118.3004), (34.1200, -118.2985)]
}

#[tokio::test]
#[ignore]
async fn test_open_meteo_grid_covers_route() {
    let config = Config::from_env();
    let points = hillside_walk();
    let terrain = OpenMeteoTerrain::new(Client::new(), GridSettings::from_config(&config), points.clone());
    let surface = TerrainSurface::new(Arc::new(terrain));

    let sr = SpatialReference::WebMercator;
    let route = Route {
        name: "Hillside".to_string(),
        geometry: points.iter().map(|(lat, lon)| sr.from_lat_lon(*lat, *lon)).collect(),
        maneuvers: maneuvers_for_path(&points),
        spatial_reference: sr,
        total_length_m: path_length_m(&points),
    };

    let path = drape(&route, &surface, &config.drape_config())
        .await
        .expect("terrain loads");

    assert_eq!(path.source, DrapeSource::Terrain);
    assert_eq!(path.placement, SurfacePlacement::Absolute);
    assert!(path.points.iter().all(|point| point.z > 100.0 && point.z < 1_000.0));
}
