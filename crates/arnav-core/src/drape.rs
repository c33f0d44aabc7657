//! Terrain draping for the AR route overlay.
//!
//! A solved route is a flat polyline. To show it over the camera feed it is
//! densified, each vertex is lifted to the ground elevation plus a fixed
//! offset, and the result replaces the displayed line in one swap. If any
//! elevation sample cannot be resolved the flat route is shown instead: a
//! line with holes or kinks at missing samples reads worse than a flat one.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{GeoPoint, Route, SpatialReference};
use crate::spatial::densify;
use crate::terrain::{ElevationError, TerrainSurface};

pub const DEFAULT_MAX_SPACING: f64 = 0.3;
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_VERTICAL_OFFSET_M: f64 = 3.0;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Tuning for a draping pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrapeConfig {
    /// Maximum vertex spacing after densification, in the route's linear unit.
    pub max_spacing: f64,
    /// Bounded wait for each elevation sample.
    pub sample_timeout: Duration,
    /// Height of the line above the ground in meters.
    pub vertical_offset_m: f64,
    /// Elevation queries allowed in flight at once.
    pub max_in_flight: usize,
}

impl Default for DrapeConfig {
    fn default() -> Self {
        Self {
            max_spacing: DEFAULT_MAX_SPACING,
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
            vertical_offset_m: DEFAULT_VERTICAL_OFFSET_M,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrapedPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// How the renderer should interpret `DrapedPoint::z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfacePlacement {
    /// z is an absolute elevation.
    Absolute,
    /// z is an offset above the ground surface.
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrapeSource {
    /// Every densified vertex carries its sampled elevation.
    Terrain,
    /// At least one sample failed; original vertices at a flat offset.
    FlatFallback,
    /// Zero-length route.
    Empty,
}

/// A route polyline ready for 3D display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrapedPath {
    pub spatial_reference: SpatialReference,
    pub points: Vec<DrapedPoint>,
    pub placement: SurfacePlacement,
    pub source: DrapeSource,
    /// Number of elevation samples that failed or timed out.
    pub unresolved: usize,
}

impl DrapedPath {
    pub fn empty(spatial_reference: SpatialReference) -> Self {
        Self {
            spatial_reference,
            points: Vec::new(),
            placement: SurfacePlacement::Relative,
            source: DrapeSource::Empty,
            unresolved: 0,
        }
    }

    /// The undensified route shown `vertical_offset_m` above the ground.
    pub fn flat(route: &Route, vertical_offset_m: f64, unresolved: usize) -> Self {
        Self {
            spatial_reference: route.spatial_reference,
            points: route
                .geometry
                .iter()
                .map(|point| DrapedPoint {
                    x: point.x,
                    y: point.y,
                    z: vertical_offset_m,
                })
                .collect(),
            placement: SurfacePlacement::Relative,
            source: DrapeSource::FlatFallback,
            unresolved,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when the path's x/y vertices are exactly `geometry`.
    pub fn follows(&self, geometry: &[GeoPoint]) -> bool {
        self.points.len() == geometry.len()
            && self
                .points
                .iter()
                .zip(geometry)
                .all(|(draped, point)| draped.x == point.x && draped.y == point.y)
    }
}

#[derive(Debug, Error)]
pub enum DrapeError {
    #[error("terrain surface unavailable: {0}")]
    TerrainUnavailable(#[source] ElevationError),
}

/// Drape `route` over `surface`.
///
/// Waits for the surface to finish loading before the first query. A
/// zero-length route returns an empty path without touching the surface.
pub async fn drape(
    route: &Route,
    surface: &TerrainSurface,
    config: &DrapeConfig,
) -> Result<DrapedPath, DrapeError> {
    if route.is_empty() || route.planar_length() <= 0.0 {
        tracing::debug!("Route '{}' has no length, nothing to drape", route.name);
        return Ok(DrapedPath::empty(route.spatial_reference));
    }

    surface
        .ensure_loaded()
        .await
        .map_err(DrapeError::TerrainUnavailable)?;

    let dense = densify(&route.geometry, config.max_spacing);
    let sr = route.spatial_reference;
    let timeout = config.sample_timeout;

    let queries: Vec<(usize, f64, f64)> = dense
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let (lat, lon) = sr.to_lat_lon(point);
            (index, lat, lon)
        })
        .collect();

    let samples: Vec<Option<f64>> = stream::iter(queries)
        .map(|(index, lat, lon)| async move {
            match tokio::time::timeout(timeout, surface.elevation(lat, lon)).await {
                Ok(Ok(elevation)) if elevation.is_finite() => Some(elevation),
                Ok(Ok(elevation)) => {
                    tracing::debug!("Elevation sample {} not finite: {}", index, elevation);
                    None
                }
                Ok(Err(err)) => {
                    tracing::debug!("Elevation sample {} failed: {}", index, err);
                    None
                }
                Err(_) => {
                    tracing::debug!(
                        "Elevation sample {} failed: {}",
                        index,
                        ElevationError::Timeout(timeout)
                    );
                    None
                }
            }
        })
        .buffered(config.max_in_flight.max(1))
        .collect()
        .await;

    let unresolved = samples.iter().filter(|sample| sample.is_none()).count();
    if unresolved > 0 {
        tracing::warn!(
            "{} of {} elevation samples unresolved for route '{}', showing flat route",
            unresolved,
            samples.len(),
            route.name
        );
        return Ok(DrapedPath::flat(route, config.vertical_offset_m, unresolved));
    }

    let points = dense
        .iter()
        .zip(samples.into_iter().flatten())
        .map(|(point, elevation)| DrapedPoint {
            x: point.x,
            y: point.y,
            z: elevation + config.vertical_offset_m,
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        "Draped route '{}' over terrain: {} vertices from {}",
        route.name,
        points.len(),
        route.geometry.len()
    );

    Ok(DrapedPath {
        spatial_reference: sr,
        points,
        placement: SurfacePlacement::Absolute,
        source: DrapeSource::Terrain,
        unresolved: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::ElevationSource;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Flat ground, optionally hanging forever at one longitude.
    struct StubGround {
        elevation_m: f64,
        hang_at_lon: Option<f64>,
        loads: AtomicUsize,
        queries: AtomicUsize,
    }

    impl StubGround {
        fn flat(elevation_m: f64) -> Self {
            Self {
                elevation_m,
                hang_at_lon: None,
                loads: AtomicUsize::new(0),
                queries: AtomicUsize::new(0),
            }
        }
    }

    impl ElevationSource for StubGround {
        fn load(&self) -> BoxFuture<'_, Result<(), ElevationError>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }.boxed()
        }

        fn elevation(&self, _lat: f64, lon: f64) -> BoxFuture<'_, Result<f64, ElevationError>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let hang = self
                .hang_at_lon
                .is_some_and(|target| (target - lon).abs() < 1e-9);
            let elevation = self.elevation_m;
            async move {
                if hang {
                    futures::future::pending::<()>().await;
                }
                Ok(elevation)
            }
            .boxed()
        }
    }

    fn wgs84_route(lons: &[f64]) -> Route {
        Route {
            name: "test".to_string(),
            geometry: lons.iter().map(|lon| GeoPoint::new(*lon, 34.0)).collect(),
            maneuvers: Vec::new(),
            spatial_reference: SpatialReference::Wgs84,
            total_length_m: 0.0,
        }
    }

    #[tokio::test]
    async fn uniform_terrain_lifts_every_vertex() {
        let ground = Arc::new(StubGround::flat(100.0));
        let surface = TerrainSurface::new(ground.clone());
        let route = wgs84_route(&[0.0, 1.0, 1.5]);

        let path = drape(&route, &surface, &DrapeConfig::default()).await.unwrap();

        let expected = densify(&route.geometry, DEFAULT_MAX_SPACING).len();
        assert_eq!(path.source, DrapeSource::Terrain);
        assert_eq!(path.placement, SurfacePlacement::Absolute);
        assert_eq!(path.len(), expected);
        assert_eq!(ground.queries.load(Ordering::SeqCst), expected);
        assert!(path.points.iter().all(|point| point.z == 103.0));
    }

    #[tokio::test(start_paused = true)]
    async fn one_timed_out_sample_falls_back_to_flat_route() {
        let lons: Vec<f64> = (0..10).map(|i| i as f64 * 0.1).collect();
        let route = wgs84_route(&lons);
        let ground = Arc::new(StubGround {
            hang_at_lon: Some(lons[6]),
            ..StubGround::flat(100.0)
        });
        let surface = TerrainSurface::new(ground);

        let path = drape(&route, &surface, &DrapeConfig::default()).await.unwrap();

        assert_eq!(path.source, DrapeSource::FlatFallback);
        assert_eq!(path.placement, SurfacePlacement::Relative);
        assert_eq!(path.unresolved, 1);
        assert!(path.follows(&route.geometry));
        assert!(path.points.iter().all(|point| point.z == DEFAULT_VERTICAL_OFFSET_M));
    }

    #[tokio::test]
    async fn zero_length_route_issues_no_queries() {
        let ground = Arc::new(StubGround::flat(100.0));
        let surface = TerrainSurface::new(ground.clone());

        for route in [wgs84_route(&[]), wgs84_route(&[0.5, 0.5])] {
            let path = drape(&route, &surface, &DrapeConfig::default()).await.unwrap();
            assert_eq!(path.source, DrapeSource::Empty);
            assert!(path.is_empty());
        }
        assert_eq!(ground.loads.load(Ordering::SeqCst), 0);
        assert_eq!(ground.queries.load(Ordering::SeqCst), 0);
    }

    struct BrokenGround;

    impl ElevationSource for BrokenGround {
        fn load(&self) -> BoxFuture<'_, Result<(), ElevationError>> {
            async { Err(ElevationError::Provider("HTTP 503".to_string())) }.boxed()
        }

        fn elevation(&self, _lat: f64, _lon: f64) -> BoxFuture<'_, Result<f64, ElevationError>> {
            async { Ok(0.0) }.boxed()
        }
    }

    #[tokio::test]
    async fn drape_runs_on_a_spawned_task() {
        let surface = Arc::new(TerrainSurface::new(Arc::new(StubGround::flat(20.0))));
        let route = wgs84_route(&[0.0, 0.5]);

        let task = tokio::spawn(async move {
            drape(&route, &surface, &DrapeConfig::default()).await
        });
        let path = task.await.unwrap().unwrap();
        assert_eq!(path.source, DrapeSource::Terrain);
    }

    #[tokio::test]
    async fn unloadable_terrain_is_an_error() {
        let surface = TerrainSurface::new(Arc::new(BrokenGround));
        let route = wgs84_route(&[0.0, 0.2]);

        let err = drape(&route, &surface, &DrapeConfig::default()).await.unwrap_err();
        assert!(matches!(
            err,
            DrapeError::TerrainUnavailable(ElevationError::LoadFailed(_))
        ));
    }
}
