//! Navigation configuration from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use arnav_core::altitude::AltitudeAdjustmentMode;
use arnav_core::drape::{
    DrapeConfig, DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_SPACING, DEFAULT_VERTICAL_OFFSET_M,
};
use arnav_core::routing::ReroutingStrategy;

use crate::navigator::NavigatorConfig;
use crate::tracker::TrackerConfig;

const DEFAULT_ELEVATION_URL: &str = "https://api.open-meteo.com/v1/elevation";
/// Smallest densify spacing accepted, in route units.
const MIN_DENSIFY_SPACING: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct Config {
    pub elevation_url: String,
    pub vertical_offset_m: f64,
    pub densify_max_spacing: f64,
    pub elevation_timeout_s: u64,
    pub elevation_max_in_flight: usize,
    pub terrain_sample_spacing_m: f64,
    pub terrain_max_grid_points: usize,
    pub terrain_max_points_per_request: usize,
    pub terrain_request_timeout_s: u64,
    pub terrain_cache_ttl_s: u64,
    pub terrain_cache_max_entries: usize,
    pub altitude_mode: AltitudeAdjustmentMode,
    pub off_route_threshold_m: f64,
    pub off_route_samples: u32,
    pub approach_distance_m: f64,
    pub arrival_distance_m: f64,
    pub reroute_strategy: ReroutingStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elevation_url: DEFAULT_ELEVATION_URL.to_string(),
            vertical_offset_m: DEFAULT_VERTICAL_OFFSET_M,
            densify_max_spacing: DEFAULT_MAX_SPACING,
            elevation_timeout_s: 10,
            elevation_max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            terrain_sample_spacing_m: 10.0,
            terrain_max_grid_points: 2_500,
            terrain_max_points_per_request: 100,
            terrain_request_timeout_s: 10,
            terrain_cache_ttl_s: 600,
            terrain_cache_max_entries: 32,
            altitude_mode: AltitudeAdjustmentMode::NmeaParsedMsl,
            off_route_threshold_m: 25.0,
            off_route_samples: 3,
            approach_distance_m: 20.0,
            arrival_distance_m: 10.0,
            reroute_strategy: ReroutingStrategy::ToNextStop,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            elevation_url: env::var("ARNAV_ELEVATION_URL").unwrap_or(defaults.elevation_url),
            vertical_offset_m: env_or("ARNAV_VERTICAL_OFFSET_M", defaults.vertical_offset_m),
            densify_max_spacing: env_or("ARNAV_DENSIFY_MAX_SPACING", defaults.densify_max_spacing),
            elevation_timeout_s: env_or("ARNAV_ELEVATION_TIMEOUT_S", defaults.elevation_timeout_s),
            elevation_max_in_flight: env_or(
                "ARNAV_ELEVATION_MAX_IN_FLIGHT",
                defaults.elevation_max_in_flight,
            ),
            terrain_sample_spacing_m: env_or(
                "ARNAV_TERRAIN_SAMPLE_SPACING_M",
                defaults.terrain_sample_spacing_m,
            ),
            terrain_max_grid_points: env_or(
                "ARNAV_TERRAIN_MAX_GRID_POINTS",
                defaults.terrain_max_grid_points,
            ),
            terrain_max_points_per_request: env_or(
                "ARNAV_TERRAIN_MAX_POINTS_PER_REQUEST",
                defaults.terrain_max_points_per_request,
            ),
            terrain_request_timeout_s: env_or(
                "ARNAV_TERRAIN_REQUEST_TIMEOUT_S",
                defaults.terrain_request_timeout_s,
            ),
            terrain_cache_ttl_s: env_or("ARNAV_TERRAIN_CACHE_TTL_S", defaults.terrain_cache_ttl_s),
            terrain_cache_max_entries: env_or(
                "ARNAV_TERRAIN_CACHE_MAX_ENTRIES",
                defaults.terrain_cache_max_entries,
            ),
            altitude_mode: env::var("ARNAV_ALTITUDE_MODE")
                .ok()
                .and_then(|value| AltitudeAdjustmentMode::parse(&value))
                .unwrap_or(defaults.altitude_mode),
            off_route_threshold_m: env_or(
                "ARNAV_OFF_ROUTE_THRESHOLD_M",
                defaults.off_route_threshold_m,
            ),
            off_route_samples: env_or("ARNAV_OFF_ROUTE_SAMPLES", defaults.off_route_samples),
            approach_distance_m: env_or("ARNAV_APPROACH_DISTANCE_M", defaults.approach_distance_m),
            arrival_distance_m: env_or("ARNAV_ARRIVAL_DISTANCE_M", defaults.arrival_distance_m),
            reroute_strategy: match env::var("ARNAV_REROUTE_STRATEGY").ok().as_deref() {
                Some("next_waypoint") => ReroutingStrategy::ToNextWaypoint,
                Some("next_stop") => ReroutingStrategy::ToNextStop,
                _ => defaults.reroute_strategy,
            },
        }
    }

    pub fn drape_config(&self) -> DrapeConfig {
        DrapeConfig {
            max_spacing: if self.densify_max_spacing.is_finite() {
                self.densify_max_spacing.max(MIN_DENSIFY_SPACING)
            } else {
                DEFAULT_MAX_SPACING
            },
            sample_timeout: Duration::from_secs(self.elevation_timeout_s.max(1)),
            vertical_offset_m: self.vertical_offset_m,
            max_in_flight: self.elevation_max_in_flight.max(1),
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            off_route_threshold_m: self.off_route_threshold_m,
            off_route_samples: self.off_route_samples.max(1),
            approach_distance_m: self.approach_distance_m,
            arrival_distance_m: self.arrival_distance_m,
        }
    }

    pub fn navigator_config(&self) -> NavigatorConfig {
        NavigatorConfig {
            drape: self.drape_config(),
            altitude_mode: self.altitude_mode,
            reroute_strategy: self.reroute_strategy,
            ..NavigatorConfig::default()
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_configs_use_defaults() {
        let config = Config::default();
        let drape = config.drape_config();
        assert_eq!(drape.max_spacing, 0.3);
        assert_eq!(drape.sample_timeout, Duration::from_secs(10));
        assert_eq!(drape.vertical_offset_m, 3.0);

        let tracker = config.tracker_config();
        assert_eq!(tracker.off_route_samples, 3);
    }

    #[test]
    fn densify_spacing_has_a_floor() {
        let tiny = Config {
            densify_max_spacing: 1e-300,
            ..Config::default()
        };
        assert_eq!(tiny.drape_config().max_spacing, MIN_DENSIFY_SPACING);

        let negative = Config {
            densify_max_spacing: -4.0,
            ..Config::default()
        };
        assert_eq!(negative.drape_config().max_spacing, MIN_DENSIFY_SPACING);

        let broken = Config {
            densify_max_spacing: f64::NAN,
            ..Config::default()
        };
        assert_eq!(broken.drape_config().max_spacing, DEFAULT_MAX_SPACING);
    }
}
