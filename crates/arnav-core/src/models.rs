//! Core data models for walking navigation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spatial::{lat_lon_to_web_mercator, planar_length, web_mercator_to_lat_lon};

/// Coordinate system a route geometry is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialReference {
    /// Spherical Web Mercator, x/y in meters (WKID 3857).
    #[default]
    WebMercator,
    /// Geographic WGS84, x = longitude, y = latitude in degrees (WKID 4326).
    Wgs84,
}

impl SpatialReference {
    pub fn wkid(&self) -> u32 {
        match self {
            SpatialReference::WebMercator => 3857,
            SpatialReference::Wgs84 => 4326,
        }
    }

    /// Convert a point expressed in this reference to (lat, lon) degrees.
    pub fn to_lat_lon(&self, point: &GeoPoint) -> (f64, f64) {
        match self {
            SpatialReference::WebMercator => web_mercator_to_lat_lon(point.x, point.y),
            SpatialReference::Wgs84 => (point.y, point.x),
        }
    }

    /// Express a (lat, lon) position in this reference.
    pub fn from_lat_lon(&self, lat: f64, lon: f64) -> GeoPoint {
        match self {
            SpatialReference::WebMercator => {
                let (x, y) = lat_lon_to_web_mercator(lat, lon);
                GeoPoint::new(x, y)
            }
            SpatialReference::Wgs84 => GeoPoint::new(lon, lat),
        }
    }
}

/// A 2D point in the owning geometry's spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

impl GeoPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Straight-line distance in the reference's linear unit.
    pub fn planar_distance(&self, other: &GeoPoint) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManeuverKind {
    Depart,
    Straight,
    BearLeft,
    BearRight,
    TurnLeft,
    TurnRight,
    SharpLeft,
    SharpRight,
    UTurn,
    Stop,
}

/// A turn instruction attached to a vertex of the route geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maneuver {
    pub kind: ManeuverKind,
    pub text: String,
    /// Index into `Route::geometry` where the maneuver happens.
    pub point_index: usize,
    /// Length of the leg that follows the maneuver.
    pub distance_m: f64,
}

/// A solved route between stops.
///
/// Routes are immutable once solved; a reroute produces a new value and
/// equality is what decides whether the displayed path must be rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    pub geometry: Vec<GeoPoint>,
    #[serde(default)]
    pub maneuvers: Vec<Maneuver>,
    #[serde(default)]
    pub spatial_reference: SpatialReference,
    pub total_length_m: f64,
}

impl Route {
    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
    }

    /// Length of the polyline in the spatial reference's linear unit.
    pub fn planar_length(&self) -> f64 {
        planar_length(&self.geometry)
    }

    pub fn destination(&self) -> Option<&GeoPoint> {
        self.geometry.last()
    }

    /// Geometry converted to (lat, lon) degrees.
    pub fn lat_lon_points(&self) -> Vec<(f64, f64)> {
        self.geometry
            .iter()
            .map(|point| self.spatial_reference.to_lat_lon(point))
            .collect()
    }
}

/// A routing stop placed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl Stop {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            name: None,
            lat,
            lon,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelMode {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl TravelMode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Parameters for a route solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteParameters {
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub travel_mode: Option<TravelMode>,
    pub return_stops: bool,
    pub return_directions: bool,
    pub return_routes: bool,
    #[serde(default)]
    pub output_spatial_reference: SpatialReference,
}

impl Default for RouteParameters {
    fn default() -> Self {
        Self {
            stops: Vec::new(),
            travel_mode: None,
            return_stops: false,
            return_directions: false,
            return_routes: true,
            output_spatial_reference: SpatialReference::default(),
        }
    }
}

/// Output of a route solve: candidate routes plus the parameters used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub routes: Vec<Route>,
    pub parameters: RouteParameters,
}

impl RouteResult {
    /// The candidate used for navigation.
    pub fn first_route(&self) -> Option<&Route> {
        self.routes.first()
    }
}

/// Capabilities reported by a loaded routing service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteServiceInfo {
    pub travel_modes: Vec<TravelMode>,
    pub supports_rerouting: bool,
}

/// A position sample from the device location source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub speed_mps: f64,
    #[serde(default)]
    pub horizontal_accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Location {
    pub fn new(lat: f64, lon: f64, altitude_m: f64) -> Self {
        Self {
            lat,
            lon,
            altitude_m,
            heading_deg: None,
            speed_mps: 0.0,
            horizontal_accuracy_m: None,
            timestamp: Utc::now(),
        }
    }

    /// Copy of this sample with a different altitude.
    pub fn with_altitude(&self, altitude_m: f64) -> Self {
        Self {
            altitude_m,
            ..self.clone()
        }
    }
}
