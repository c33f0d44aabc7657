//! Route service contract and solve-parameter helpers.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    Location, Maneuver, ManeuverKind, RouteParameters, RouteResult, RouteServiceInfo, Stop,
    TravelMode,
};
use crate::spatial::{bearing_deg, haversine_distance};

const STRAIGHT_TOLERANCE_DEG: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    #[error("route service failed to load: {0}")]
    LoadFailed(String),
    #[error("route service is not loaded")]
    NotLoaded,
    #[error("need at least 2 stops, got {0}")]
    NotEnoughStops(usize),
    #[error("no route found: {0}")]
    NoRoute(String),
    #[error("route service error: {0}")]
    Service(String),
}

/// A network routing service.
pub trait RouteService: Send + Sync {
    /// Connect to the service and report its capabilities.
    fn load(&self) -> BoxFuture<'_, Result<RouteServiceInfo, RoutingError>>;

    fn default_parameters(&self) -> BoxFuture<'_, Result<RouteParameters, RoutingError>>;

    fn solve_route(
        &self,
        parameters: RouteParameters,
    ) -> BoxFuture<'_, Result<RouteResult, RoutingError>>;
}

/// Where a reroute should lead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReroutingStrategy {
    /// Current position, then every stop not yet visited.
    #[default]
    ToNextStop,
    /// Current position to the next unvisited stop only.
    ToNextWaypoint,
}

/// Pick the walking travel mode, falling back to the first mode offered.
pub fn select_walking_mode(modes: &[TravelMode]) -> Option<TravelMode> {
    modes
        .iter()
        .find(|mode| mode.name.contains("Walking"))
        .or_else(|| modes.first())
        .cloned()
}

/// Parameters for a pedestrian solve between `stops`, starting from the
/// service defaults.
pub fn walking_parameters(
    defaults: RouteParameters,
    info: &RouteServiceInfo,
    stops: Vec<Stop>,
) -> RouteParameters {
    RouteParameters {
        stops,
        travel_mode: select_walking_mode(&info.travel_modes).or(defaults.travel_mode.clone()),
        return_stops: true,
        return_directions: true,
        return_routes: true,
        ..defaults
    }
}

/// Parameters for a reroute from `from`, given the index of the next stop
/// that has not been reached.
pub fn reroute_parameters(
    original: &RouteParameters,
    from: &Location,
    next_stop: usize,
    strategy: ReroutingStrategy,
) -> RouteParameters {
    let next_stop = next_stop.clamp(1, original.stops.len().max(1));
    let remaining = original.stops.iter().skip(next_stop);
    let remaining: Vec<Stop> = match strategy {
        ReroutingStrategy::ToNextStop => remaining.cloned().collect(),
        ReroutingStrategy::ToNextWaypoint => remaining.take(1).cloned().collect(),
    };

    let mut stops = Vec::with_capacity(remaining.len() + 1);
    stops.push(Stop {
        name: Some("Current location".to_string()),
        lat: from.lat,
        lon: from.lon,
    });
    stops.extend(remaining);

    RouteParameters {
        stops,
        ..original.clone()
    }
}

/// Derive turn-by-turn maneuvers from the bends of a (lat, lon) path.
pub fn maneuvers_for_path(points: &[(f64, f64)]) -> Vec<Maneuver> {
    if points.len() < 2 {
        return Vec::new();
    }

    // Indices where a maneuver starts: departure plus every real bend.
    let mut starts = vec![(0usize, ManeuverKind::Depart)];
    for index in 1..points.len() - 1 {
        let (prev, here, next) = (points[index - 1], points[index], points[index + 1]);
        let inbound = bearing_deg(prev.0, prev.1, here.0, here.1);
        let outbound = bearing_deg(here.0, here.1, next.0, next.1);
        if let Some(kind) = classify_turn(outbound - inbound) {
            starts.push((index, kind));
        }
    }

    let last = points.len() - 1;
    let mut maneuvers = Vec::with_capacity(starts.len() + 1);
    for (slot, (index, kind)) in starts.iter().enumerate() {
        let leg_end = starts.get(slot + 1).map(|(next, _)| *next).unwrap_or(last);
        let distance_m: f64 = points[*index..=leg_end]
            .windows(2)
            .map(|pair| haversine_distance(pair[0].0, pair[0].1, pair[1].0, pair[1].1))
            .sum();
        maneuvers.push(Maneuver {
            kind: *kind,
            text: maneuver_text(*kind, distance_m),
            point_index: *index,
            distance_m,
        });
    }
    maneuvers.push(Maneuver {
        kind: ManeuverKind::Stop,
        text: maneuver_text(ManeuverKind::Stop, 0.0),
        point_index: last,
        distance_m: 0.0,
    });
    maneuvers
}

fn classify_turn(delta_deg: f64) -> Option<ManeuverKind> {
    // Normalize to (-180, 180], positive = clockwise (right)
    let delta = (delta_deg + 540.0).rem_euclid(360.0) - 180.0;
    let magnitude = delta.abs();
    let right = delta > 0.0;
    let kind = match (magnitude, right) {
        (m, _) if m < STRAIGHT_TOLERANCE_DEG => return None,
        (m, true) if m < 45.0 => ManeuverKind::BearRight,
        (m, false) if m < 45.0 => ManeuverKind::BearLeft,
        (m, true) if m < 135.0 => ManeuverKind::TurnRight,
        (m, false) if m < 135.0 => ManeuverKind::TurnLeft,
        (m, true) if m < 170.0 => ManeuverKind::SharpRight,
        (m, false) if m < 170.0 => ManeuverKind::SharpLeft,
        _ => ManeuverKind::UTurn,
    };
    Some(kind)
}

fn maneuver_text(kind: ManeuverKind, distance_m: f64) -> String {
    let action = match kind {
        ManeuverKind::Depart => "Start walking",
        ManeuverKind::Straight => "Continue straight",
        ManeuverKind::BearLeft => "Bear left",
        ManeuverKind::BearRight => "Bear right",
        ManeuverKind::TurnLeft => "Turn left",
        ManeuverKind::TurnRight => "Turn right",
        ManeuverKind::SharpLeft => "Make a sharp left",
        ManeuverKind::SharpRight => "Make a sharp right",
        ManeuverKind::UTurn => "Make a U-turn",
        ManeuverKind::Stop => return "You have arrived at your destination".to_string(),
    };
    format!("{} and continue for {:.0} meters", action, distance_m)
}
