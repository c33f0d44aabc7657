//! Offline stand-ins for the routing and elevation services.

use std::time::Duration;

use arnav_core::models::{Route, RouteParameters, RouteResult, RouteServiceInfo, TravelMode};
use arnav_core::routing::{maneuvers_for_path, RouteService, RoutingError};
use arnav_core::spatial::{meters_per_deg_lat, meters_per_deg_lon, path_length_m};
use arnav_core::terrain::{ElevationError, ElevationSource};
use futures::future::BoxFuture;

/// Routes that walk north/south first, then east/west, between
/// consecutive stops, like a street grid.
#[derive(Debug, Clone)]
pub struct LShapedRoutes {
    pub latency: Duration,
}

impl Default for LShapedRoutes {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(150),
        }
    }
}

impl LShapedRoutes {
    fn path_through(stops: &[(f64, f64)]) -> Vec<(f64, f64)> {
        let mut points = Vec::with_capacity(stops.len() * 2);
        for pair in stops.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if points.is_empty() {
                points.push(from);
            }
            let corner = (to.0, from.1);
            if corner != from && corner != to {
                points.push(corner);
            }
            points.push(to);
        }
        points
    }
}

impl RouteService for LShapedRoutes {
    fn load(&self) -> BoxFuture<'_, Result<RouteServiceInfo, RoutingError>> {
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;
            Ok(RouteServiceInfo {
                travel_modes: vec![
                    TravelMode::new("Driving Time"),
                    TravelMode::new("Walking Time"),
                    TravelMode::new("Walking Distance"),
                ],
                supports_rerouting: true,
            })
        })
    }

    fn default_parameters(&self) -> BoxFuture<'_, Result<RouteParameters, RoutingError>> {
        Box::pin(async { Ok(RouteParameters::default()) })
    }

    fn solve_route(
        &self,
        parameters: RouteParameters,
    ) -> BoxFuture<'_, Result<RouteResult, RoutingError>> {
        Box::pin(async move {
            if parameters.stops.len() < 2 {
                return Err(RoutingError::NotEnoughStops(parameters.stops.len()));
            }
            tokio::time::sleep(self.latency).await;

            let stops: Vec<(f64, f64)> =
                parameters.stops.iter().map(|stop| (stop.lat, stop.lon)).collect();
            let points = Self::path_through(&stops);
            let sr = parameters.output_spatial_reference;
            let route = Route {
                name: match parameters.travel_mode.as_ref() {
                    Some(mode) => format!("{} route", mode.name),
                    None => "Route".to_string(),
                },
                geometry: points.iter().map(|(lat, lon)| sr.from_lat_lon(*lat, *lon)).collect(),
                maneuvers: if parameters.return_directions {
                    maneuvers_for_path(&points)
                } else {
                    Vec::new()
                },
                spatial_reference: sr,
                total_length_m: path_length_m(&points),
            };
            Ok(RouteResult {
                routes: vec![route],
                parameters,
            })
        })
    }
}

/// Gentle sinusoidal hills around a base elevation.
#[derive(Debug, Clone)]
pub struct RollingHills {
    pub base_m: f64,
    pub amplitude_m: f64,
    pub wavelength_m: f64,
}

impl Default for RollingHills {
    fn default() -> Self {
        Self {
            base_m: 120.0,
            amplitude_m: 8.0,
            wavelength_m: 400.0,
        }
    }
}

impl RollingHills {
    pub fn height_at(&self, lat: f64, lon: f64) -> f64 {
        let k = std::f64::consts::TAU / self.wavelength_m.max(1.0);
        let north = lat * meters_per_deg_lat(0.0);
        let east = lon * meters_per_deg_lon(lat);
        self.base_m + self.amplitude_m * (k * north).sin() * (k * east).cos()
    }
}

impl ElevationSource for RollingHills {
    fn load(&self) -> BoxFuture<'_, Result<(), ElevationError>> {
        Box::pin(async { Ok(()) })
    }

    fn elevation(&self, lat: f64, lon: f64) -> BoxFuture<'_, Result<f64, ElevationError>> {
        Box::pin(async move { Ok(self.height_at(lat, lon)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arnav_core::models::{ManeuverKind, Stop};

    #[test]
    fn path_turns_at_the_corner() {
        let points = LShapedRoutes::path_through(&[(34.0, -118.0), (34.001, -117.999)]);
        assert_eq!(points, vec![(34.0, -118.0), (34.001, -118.0), (34.001, -117.999)]);

        let straight = LShapedRoutes::path_through(&[(34.0, -118.0), (34.001, -118.0)]);
        assert_eq!(straight.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn solve_returns_directions() {
        let service = LShapedRoutes::default();
        let parameters = RouteParameters {
            stops: vec![Stop::new(34.0, -118.0), Stop::new(34.001, -117.999)],
            return_directions: true,
            ..RouteParameters::default()
        };
        let result = service.solve_route(parameters).await.unwrap();
        let route = result.first_route().unwrap();
        assert_eq!(route.geometry.len(), 3);
        assert_eq!(route.maneuvers.first().map(|m| m.kind), Some(ManeuverKind::Depart));
        assert_eq!(route.maneuvers.last().map(|m| m.kind), Some(ManeuverKind::Stop));
    }

    #[test]
    fn hills_stay_within_amplitude() {
        let hills = RollingHills::default();
        for step in 0..50 {
            let h = hills.height_at(34.0 + step as f64 * 1e-4, -118.0);
            assert!((h - hills.base_m).abs() <= hills.amplitude_m + 1e-9);
        }
    }
}
