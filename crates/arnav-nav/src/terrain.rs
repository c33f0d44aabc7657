//! Open-Meteo elevation grid as a terrain source for route draping.
//!
//! Loading fetches one elevation grid covering the padded bounds of the
//! walking area; queries are answered locally by bilinear interpolation.
//! A query outside every loaded grid (a reroute leaving the planned area)
//! fetches another grid around that point.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use arnav_core::spatial::{lat_span_deg, lon_span_deg, meters_per_deg_lat, meters_per_deg_lon};
use arnav_core::terrain::{ElevationError, ElevationSource};
use dashmap::DashMap;
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cache::{evict_stale, Fetched};
use crate::config::Config;

const MIN_SAMPLE_SPACING_M: f64 = 5.0;
const MAX_SAMPLE_SPACING_M: f64 = 2_000.0;
const BOUNDS_PAD_RATIO: f64 = 0.2;
const MIN_BOUNDS_PAD_DEG: f64 = 0.0015;
/// Half-width of the grid fetched around a point outside the loaded area.
const EXTENSION_RADIUS_M: f64 = 400.0;
const MAX_LOADED_GRIDS: usize = 16;

#[derive(Debug, Error)]
pub enum TerrainFetchError {
    #[error("terrain provider URL is empty")]
    MissingUrl,
    #[error("terrain request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("terrain provider HTTP {0}")]
    Status(StatusCode),
    #[error("terrain provider response is missing elevation")]
    MissingElevation,
    #[error("terrain provider returned {got} samples, expected {expected}")]
    SampleCount { expected: usize, got: usize },
}

/// Settings for grid fetches, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct GridSettings {
    pub provider_url: String,
    pub sample_spacing_m: f64,
    pub max_grid_points: usize,
    pub max_points_per_request: usize,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
}

impl GridSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider_url: config.elevation_url.clone(),
            sample_spacing_m: config.terrain_sample_spacing_m,
            max_grid_points: config.terrain_max_grid_points,
            max_points_per_request: config.terrain_max_points_per_request,
            request_timeout: Duration::from_secs(config.terrain_request_timeout_s.max(3)),
            cache_ttl: Duration::from_secs(config.terrain_cache_ttl_s.max(30)),
            cache_max_entries: config.terrain_cache_max_entries.max(1),
        }
    }
}

/// Regular lat/lon grid of ground elevations, row-major from the south-west
/// corner.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainGrid {
    bounds: GridBounds,
    lat_step_deg: f64,
    lon_step_deg: f64,
    rows: usize,
    cols: usize,
    elevations_m: Vec<f64>,
}

impl TerrainGrid {
    pub fn new(
        min_lat: f64,
        min_lon: f64,
        lat_step_deg: f64,
        lon_step_deg: f64,
        rows: usize,
        cols: usize,
        elevations_m: Vec<f64>,
    ) -> Option<Self> {
        if rows == 0 || cols == 0 || elevations_m.len() != rows * cols {
            return None;
        }
        let bounds = GridBounds {
            min_lat,
            min_lon,
            max_lat: min_lat + lat_step_deg * (rows - 1) as f64,
            max_lon: min_lon + lon_step_deg * (cols - 1) as f64,
        };
        Some(Self {
            bounds,
            lat_step_deg,
            lon_step_deg,
            rows,
            cols,
            elevations_m,
        })
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.bounds.min_lat
            && lat <= self.bounds.max_lat
            && lon >= self.bounds.min_lon
            && lon <= self.bounds.max_lon
    }

    pub fn len(&self) -> usize {
        self.elevations_m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elevations_m.is_empty()
    }

    /// Bilinear elevation at (lat, lon), or `None` outside the grid.
    pub fn sample(&self, lat: f64, lon: f64) -> Option<f64> {
        if !lat.is_finite() || !lon.is_finite() || !self.contains(lat, lon) {
            return None;
        }

        let (south, north, fy) = bracket(
            (lat - self.bounds.min_lat) / self.lat_step_deg.max(1e-9),
            self.rows,
        );
        let (west, east, fx) = bracket(
            (lon - self.bounds.min_lon) / self.lon_step_deg.max(1e-9),
            self.cols,
        );

        let lerp = |from: f64, to: f64, t: f64| from + (to - from) * t;
        let along_south = lerp(self.post(south, west), self.post(south, east), fx);
        let along_north = lerp(self.post(north, west), self.post(north, east), fx);
        Some(lerp(along_south, along_north, fy))
    }

    fn post(&self, row: usize, col: usize) -> f64 {
        self.elevations_m[row * self.cols + col]
    }
}

/// Neighbouring post indices around a fractional grid position, plus the
/// fraction between them.
fn bracket(position: f64, posts: usize) -> (usize, usize, f64) {
    let last = posts.saturating_sub(1);
    let position = position.clamp(0.0, last as f64);
    let lower = (position.floor() as usize).min(last);
    (lower, (lower + 1).min(last), position - lower as f64)
}

/// [`ElevationSource`] backed by grids fetched from an Open-Meteo style
/// elevation endpoint.
pub struct OpenMeteoTerrain {
    client: Client,
    settings: GridSettings,
    area: Vec<(f64, f64)>,
    /// The walking-area grid first, then extensions, oldest first.
    grids: RwLock<Vec<Arc<TerrainGrid>>>,
    extending: Mutex<()>,
}

impl OpenMeteoTerrain {
    /// A source covering the (lat, lon) points of `area`, usually the route
    /// vertices plus the stops.
    pub fn new(client: Client, settings: GridSettings, area: Vec<(f64, f64)>) -> Self {
        Self {
            client,
            settings,
            area,
            grids: RwLock::new(Vec::new()),
            extending: Mutex::new(()),
        }
    }

    /// The walking-area grid, once loaded.
    pub fn grid(&self) -> Option<Arc<TerrainGrid>> {
        self.grids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .cloned()
    }

    pub fn grid_count(&self) -> usize {
        self.grids.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn sample(&self, lat: f64, lon: f64) -> Option<f64> {
        self.grids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find_map(|grid| grid.sample(lat, lon))
    }

    fn add_grid(&self, grid: Arc<TerrainGrid>) {
        let mut grids = self.grids.write().unwrap_or_else(PoisonError::into_inner);
        grids.push(grid);
        if grids.len() > MAX_LOADED_GRIDS {
            grids.remove(1);
        }
    }

    /// Fetch a grid around (lat, lon) and sample it.
    async fn extend_to(&self, lat: f64, lon: f64) -> Result<f64, ElevationError> {
        let _extending = self.extending.lock().await;
        // another query may have covered this point while we waited
        if let Some(elevation) = self.sample(lat, lon) {
            return Ok(elevation);
        }

        let grid = fetch_terrain_grid(&self.client, &self.settings, &extension_area(lat, lon))
            .await
            .map_err(|err| ElevationError::Provider(err.to_string()))?
            .ok_or(ElevationError::NoData { lat, lon })?;
        tracing::info!(
            "Extended terrain to ({:.5}, {:.5}) with {} samples",
            lat,
            lon,
            grid.len()
        );
        let elevation = grid.sample(lat, lon);
        self.add_grid(Arc::new(grid));
        elevation.ok_or(ElevationError::NoData { lat, lon })
    }
}

impl ElevationSource for OpenMeteoTerrain {
    fn load(&self) -> BoxFuture<'_, Result<(), ElevationError>> {
        Box::pin(async move {
            if self.grid_count() > 0 {
                return Ok(());
            }
            let grid = fetch_terrain_grid(&self.client, &self.settings, &self.area)
                .await
                .map_err(|err| ElevationError::LoadFailed(err.to_string()))?
                .ok_or_else(|| {
                    ElevationError::LoadFailed("walking area has no valid coordinates".to_string())
                })?;
            tracing::info!("Loaded terrain grid with {} samples", grid.len());
            self.add_grid(Arc::new(grid));
            Ok(())
        })
    }

    fn elevation(&self, lat: f64, lon: f64) -> BoxFuture<'_, Result<f64, ElevationError>> {
        Box::pin(async move {
            if self.grid_count() == 0 {
                return Err(ElevationError::NotLoaded);
            }
            if let Some(elevation) = self.sample(lat, lon) {
                return Ok(elevation);
            }
            if !lat.is_finite() || !lon.is_finite() {
                return Err(ElevationError::NoData { lat, lon });
            }
            self.extend_to(lat, lon).await
        })
    }
}

/// Corners of the square fetched around a point outside the loaded grids.
fn extension_area(lat: f64, lon: f64) -> Vec<(f64, f64)> {
    let dlat = lat_span_deg(EXTENSION_RADIUS_M, lat);
    let dlon = lon_span_deg(EXTENSION_RADIUS_M, lat);
    vec![(lat - dlat, lon - dlon), (lat + dlat, lon + dlon)]
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GridBounds {
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
}

impl GridBounds {
    /// Grow each side by `ratio` of the span, at least a couple hundred meters.
    fn padded(&self, ratio: f64) -> Self {
        let margin = |span: f64| (span * ratio).max(MIN_BOUNDS_PAD_DEG);
        let lat_margin = margin(self.lat_span());
        let lon_margin = margin(self.lon_span());
        Self {
            min_lat: self.min_lat - lat_margin,
            min_lon: self.min_lon - lon_margin,
            max_lat: self.max_lat + lat_margin,
            max_lon: self.max_lon + lon_margin,
        }
    }

    fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }
}

#[derive(Debug, Clone)]
struct GridCacheEntry {
    fetched_at: Instant,
    grid: TerrainGrid,
}

impl Fetched for GridCacheEntry {
    fn fetched_at(&self) -> Instant {
        self.fetched_at
    }
}

fn grid_cache() -> &'static DashMap<String, GridCacheEntry> {
    static CACHE: OnceLock<DashMap<String, GridCacheEntry>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    elevation: Option<Vec<f64>>,
}

/// Fetch (or reuse) an elevation grid over the padded bounds of `points`.
///
/// Returns `Ok(None)` when no point has finite coordinates. A cached grid
/// up to twice the TTL old is served if the provider fails.
pub async fn fetch_terrain_grid(
    client: &Client,
    settings: &GridSettings,
    points: &[(f64, f64)],
) -> Result<Option<TerrainGrid>, TerrainFetchError> {
    if settings.provider_url.trim().is_empty() {
        return Err(TerrainFetchError::MissingUrl);
    }
    let Some(bounds) = bounds_of(points).map(|bounds| bounds.padded(BOUNDS_PAD_RATIO)) else {
        return Ok(None);
    };

    let key = grid_cache_key(&bounds, settings.sample_spacing_m);
    let cache = grid_cache();
    let cached = cache
        .get(&key)
        .map(|entry| (entry.fetched_at.elapsed(), entry.grid.clone()));
    let stale = match cached {
        Some((age, grid)) if age <= settings.cache_ttl => return Ok(Some(grid)),
        Some((age, grid)) if age <= settings.cache_ttl.saturating_mul(2) => Some(grid),
        _ => None,
    };

    let grid = match download_grid(client, settings, &bounds).await {
        Ok(grid) => grid,
        Err(err) => {
            if let Some(stale) = stale {
                tracing::warn!("Terrain fetch failed, using stale grid: {}", err);
                return Ok(Some(stale));
            }
            return Err(err);
        }
    };

    cache.insert(
        key,
        GridCacheEntry {
            fetched_at: Instant::now(),
            grid: grid.clone(),
        },
    );
    evict_stale(
        cache,
        settings.cache_max_entries,
        settings.cache_ttl.saturating_mul(2),
    );

    Ok(Some(grid))
}

async fn download_grid(
    client: &Client,
    settings: &GridSettings,
    bounds: &GridBounds,
) -> Result<TerrainGrid, TerrainFetchError> {
    let dims = grid_dims(bounds, settings.sample_spacing_m, settings.max_grid_points);
    let total = dims.rows * dims.cols;

    let coordinates: Vec<(f64, f64)> = (0..dims.rows)
        .flat_map(|row| {
            (0..dims.cols).map(move |col| {
                (
                    bounds.min_lat + row as f64 * dims.lat_step_deg,
                    bounds.min_lon + col as f64 * dims.lon_step_deg,
                )
            })
        })
        .collect();

    let mut elevations = Vec::with_capacity(total);
    for chunk in coordinates.chunks(settings.max_points_per_request.max(1)) {
        let latitudes: Vec<f64> = chunk.iter().map(|(lat, _)| *lat).collect();
        let longitudes: Vec<f64> = chunk.iter().map(|(_, lon)| *lon).collect();
        let url = provider_url(
            &settings.provider_url,
            &join_coordinates(&latitudes),
            &join_coordinates(&longitudes),
        );

        let response = client
            .get(url)
            .timeout(settings.request_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TerrainFetchError::Status(response.status()));
        }
        let payload: ElevationResponse = response.json().await?;
        let values = payload.elevation.ok_or(TerrainFetchError::MissingElevation)?;
        if values.len() != chunk.len() {
            return Err(TerrainFetchError::SampleCount {
                expected: chunk.len(),
                got: values.len(),
            });
        }
        elevations.extend(
            values
                .into_iter()
                .map(|value| if value.is_finite() { value } else { 0.0 }),
        );
    }

    TerrainGrid::new(
        bounds.min_lat,
        bounds.min_lon,
        dims.lat_step_deg,
        dims.lon_step_deg,
        dims.rows,
        dims.cols,
        elevations,
    )
    .ok_or(TerrainFetchError::SampleCount {
        expected: total,
        got: 0,
    })
}

fn bounds_of(points: &[(f64, f64)]) -> Option<GridBounds> {
    let finite = points
        .iter()
        .filter(|(lat, lon)| lat.is_finite() && lon.is_finite());
    let mut bounds: Option<GridBounds> = None;
    for &(lat, lon) in finite {
        bounds = Some(match bounds {
            None => GridBounds {
                min_lat: lat,
                min_lon: lon,
                max_lat: lat,
                max_lon: lon,
            },
            Some(b) => GridBounds {
                min_lat: b.min_lat.min(lat),
                min_lon: b.min_lon.min(lon),
                max_lat: b.max_lat.max(lat),
                max_lon: b.max_lon.max(lon),
            },
        });
    }
    bounds
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GridDims {
    rows: usize,
    cols: usize,
    lat_step_deg: f64,
    lon_step_deg: f64,
}

impl GridDims {
    fn posts(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }
}

/// Grid layout over `bounds`, widening the spacing until the grid fits in
/// `max_points` posts.
fn grid_dims(bounds: &GridBounds, spacing_m: f64, max_points: usize) -> GridDims {
    let mid_lat = (bounds.min_lat + bounds.max_lat) / 2.0;
    let lat_m = meters_per_deg_lat(mid_lat);
    let lon_m = meters_per_deg_lon(mid_lat).max(1.0);
    let max_points = max_points.max(4);
    let posts_across = |span_deg: f64, step_deg: f64| (span_deg / step_deg).ceil().max(1.0) as usize + 1;

    let mut spacing = spacing_m.max(MIN_SAMPLE_SPACING_M);
    loop {
        let (lat_step_deg, lon_step_deg) = (spacing / lat_m, spacing / lon_m);
        let dims = GridDims {
            rows: posts_across(bounds.lat_span(), lat_step_deg),
            cols: posts_across(bounds.lon_span(), lon_step_deg),
            lat_step_deg,
            lon_step_deg,
        };
        if dims.posts() <= max_points || spacing >= MAX_SAMPLE_SPACING_M {
            return dims;
        }
        spacing *= (dims.posts() as f64 / max_points as f64).sqrt().max(1.1);
    }
}

fn join_coordinates(values: &[f64]) -> String {
    values
        .iter()
        .map(|value| format!("{:.6}", value))
        .collect::<Vec<_>>()
        .join(",")
}

fn provider_url(base: &str, latitudes: &str, longitudes: &str) -> String {
    let joiner = if base.contains('?') { '&' } else { '?' };
    format!("{base}{joiner}latitude={latitudes}&longitude={longitudes}")
}

fn grid_cache_key(bounds: &GridBounds, spacing_m: f64) -> String {
    format!(
        "grid/{:.4},{:.4}/{:.4},{:.4}/{:.1}m",
        bounds.min_lat, bounds.min_lon, bounds.max_lat, bounds.max_lon, spacing_m
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> TerrainGrid {
        // 3x3 grid rising 10 m per row and 1 m per column
        let elevations = (0..3)
            .flat_map(|row| (0..3).map(move |col| 100.0 + row as f64 * 10.0 + col as f64))
            .collect();
        TerrainGrid::new(34.0, -118.0, 0.001, 0.001, 3, 3, elevations).unwrap()
    }

    #[test]
    fn samples_bilinearly_between_posts() {
        let grid = ramp();
        assert_eq!(grid.sample(34.0, -118.0), Some(100.0));
        let mid = grid.sample(34.0005, -117.9995).unwrap();
        assert!((mid - 105.5).abs() < 1e-6);
    }

    #[test]
    fn outside_grid_has_no_sample() {
        let grid = ramp();
        assert_eq!(grid.sample(33.99, -118.0), None);
        assert_eq!(grid.sample(f64::NAN, -118.0), None);
    }

    #[test]
    fn rejects_mismatched_elevation_count() {
        assert!(TerrainGrid::new(0.0, 0.0, 0.1, 0.1, 2, 2, vec![1.0; 3]).is_none());
    }

    #[test]
    fn grid_dims_respect_point_limit() {
        let bounds = bounds_of(&[(34.0, -118.0), (34.02, -117.98)])
            .unwrap()
            .padded(BOUNDS_PAD_RATIO);
        let dims = grid_dims(&bounds, 10.0, 400);
        assert!(dims.posts() <= 400);
        assert!(dims.rows >= 2 && dims.cols >= 2);
    }

    #[test]
    fn provider_url_appends_query() {
        assert_eq!(
            provider_url("https://example.test/v1/elevation", "1.000000", "2.000000"),
            "https://example.test/v1/elevation?latitude=1.000000&longitude=2.000000"
        );
        assert_eq!(
            provider_url("https://example.test/e?key=k", "1", "2"),
            "https://example.test/e?key=k&latitude=1&longitude=2"
        );
    }

    #[tokio::test]
    async fn elevation_before_load_is_rejected() {
        let settings = GridSettings::from_config(&Config::default());
        let terrain = OpenMeteoTerrain::new(Client::new(), settings, vec![(34.0, -118.0)]);
        assert_eq!(
            terrain.elevation(34.0, -118.0).await,
            Err(ElevationError::NotLoaded)
        );
    }

    /// Put a flat grid for the area `fetch_terrain_grid` would fetch for
    /// `points` into the shared cache.
    fn seed_cache(points: &[(f64, f64)], spacing_m: f64, elevation_m: f64) {
        let bounds = bounds_of(points).unwrap().padded(BOUNDS_PAD_RATIO);
        let grid = TerrainGrid::new(
            bounds.min_lat,
            bounds.min_lon,
            bounds.lat_span(),
            bounds.lon_span(),
            2,
            2,
            vec![elevation_m; 4],
        )
        .unwrap();
        grid_cache().insert(
            grid_cache_key(&bounds, spacing_m),
            GridCacheEntry {
                fetched_at: Instant::now(),
                grid,
            },
        );
    }

    #[tokio::test]
    async fn queries_outside_the_walking_area_fetch_another_grid() {
        let settings = GridSettings::from_config(&Config::default());
        let area = vec![(46.5000, 7.9000), (46.5010, 7.9010)];
        let far = (46.5300, 7.9500);
        seed_cache(&area, settings.sample_spacing_m, 1_200.0);
        seed_cache(&extension_area(far.0, far.1), settings.sample_spacing_m, 1_450.0);

        let terrain = OpenMeteoTerrain::new(Client::new(), settings, area);
        terrain.load().await.unwrap();
        assert_eq!(terrain.grid_count(), 1);
        assert_eq!(terrain.elevation(46.5005, 7.9005).await, Ok(1_200.0));

        let elevation = terrain.elevation(far.0, far.1).await.unwrap();
        assert!((elevation - 1_450.0).abs() < 1e-9);
        assert_eq!(terrain.grid_count(), 2);

        // nearby queries reuse the extension
        let nearby = terrain.elevation(far.0 + 0.001, far.1).await.unwrap();
        assert!((nearby - 1_450.0).abs() < 1e-9);
        assert_eq!(terrain.grid_count(), 2);
    }

    #[test]
    fn extension_area_spans_both_sides() {
        let bounds = bounds_of(&extension_area(46.53, 7.95)).unwrap();
        assert!(bounds.min_lat < 46.53 && bounds.max_lat > 46.53);
        assert!(bounds.min_lon < 7.95 && bounds.max_lon > 7.95);
        let half_height_m = bounds.lat_span() / 2.0 * meters_per_deg_lat(46.53);
        assert!((half_height_m - EXTENSION_RADIUS_M).abs() < 1.0);
    }

    #[tokio::test]
    async fn empty_area_fails_to_load() {
        let settings = GridSettings::from_config(&Config::default());
        let terrain = OpenMeteoTerrain::new(Client::new(), settings, Vec::new());
        assert!(matches!(
            terrain.load().await,
            Err(ElevationError::LoadFailed(_))
        ));
    }
}
