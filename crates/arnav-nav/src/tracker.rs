//! Route tracker driven by location updates.
//!
//! Progress is measured by projecting each fix onto the route polyline.
//! A run of fixes farther than the off-route threshold marks the user off
//! route and, when rerouting is enabled, starts a background solve from the
//! current position.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arnav_core::models::{Location, ManeuverKind, Route, RouteParameters, RouteResult};
use arnav_core::routing::{reroute_parameters, ReroutingStrategy, RouteService, RoutingError};
use arnav_core::spatial::{haversine_distance, project_onto_polyline, PolylineProjection};
use arnav_core::tracking::{
    DestinationStatus, RouteTracker, TrackerEvent, TrackerEventSink, TrackingStatus,
};

const ARRIVED_TEXT: &str = "You have arrived at your destination";
const OFF_ROUTE_TEXT: &str = "You are off route";

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Distance from the route beyond which a fix counts as off route.
    pub off_route_threshold_m: f64,
    /// Consecutive off-route fixes before the user is considered off route.
    pub off_route_samples: u32,
    /// Distance ahead of a maneuver at which it is announced.
    pub approach_distance_m: f64,
    /// Remaining distance at which the destination counts as reached.
    pub arrival_distance_m: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            off_route_threshold_m: 25.0,
            off_route_samples: 3,
            approach_distance_m: 20.0,
            arrival_distance_m: 10.0,
        }
    }
}

/// Creates trackers for solved routes.
pub trait RouteTrackerFactory: Send + Sync {
    fn create(
        &self,
        result: &RouteResult,
        events: TrackerEventSink,
    ) -> Result<Arc<dyn RouteTracker>, RoutingError>;
}

/// Builds [`LocalRouteTracker`]s with a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct LocalTrackerFactory {
    config: TrackerConfig,
}

impl LocalTrackerFactory {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }
}

impl RouteTrackerFactory for LocalTrackerFactory {
    fn create(
        &self,
        result: &RouteResult,
        events: TrackerEventSink,
    ) -> Result<Arc<dyn RouteTracker>, RoutingError> {
        let tracker = LocalRouteTracker::new(result, self.config.clone(), events)?;
        Ok(Arc::new(tracker))
    }
}

struct Rerouting {
    service: Arc<dyn RouteService>,
    strategy: ReroutingStrategy,
}

/// Progress along the active route.
struct Progress {
    route: Route,
    parameters: RouteParameters,
    path: Vec<(f64, f64)>,
    cumulative_m: Vec<f64>,
    maneuver_at_m: Vec<f64>,
    stop_at_m: Vec<f64>,
    status: TrackingStatus,
    off_route_fixes: u32,
    /// Off-route fixes to wait before retrying a failed reroute.
    reroute_hold: u32,
    announced: Option<usize>,
}

impl Progress {
    fn new(route: &Route, parameters: RouteParameters) -> Self {
        let path = route.lat_lon_points();
        let mut cumulative_m = Vec::with_capacity(path.len());
        let mut total = 0.0;
        for (index, point) in path.iter().enumerate() {
            if index > 0 {
                let prev = path[index - 1];
                total += haversine_distance(prev.0, prev.1, point.0, point.1);
            }
            cumulative_m.push(total);
        }

        let at_vertex = |index: usize| {
            cumulative_m
                .get(index.min(cumulative_m.len().saturating_sub(1)))
                .copied()
                .unwrap_or(0.0)
        };
        let maneuver_at_m = route
            .maneuvers
            .iter()
            .map(|maneuver| at_vertex(maneuver.point_index))
            .collect();

        let mut progress = Self {
            route: route.clone(),
            parameters,
            path,
            cumulative_m,
            maneuver_at_m,
            stop_at_m: Vec::new(),
            status: TrackingStatus {
                on_route: true,
                rerouting: false,
                destination: DestinationStatus::NotReached,
                remaining_distance_m: total,
                next_maneuver: if route.maneuvers.is_empty() { None } else { Some(0) },
                next_stop: 1,
            },
            off_route_fixes: 0,
            reroute_hold: 0,
            announced: None,
        };
        progress.stop_at_m = progress.locate_stops();
        progress
    }

    fn total_m(&self) -> f64 {
        self.cumulative_m.last().copied().unwrap_or(0.0)
    }

    fn distance_along(&self, projection: &PolylineProjection) -> f64 {
        let start = self.cumulative_m.get(projection.segment).copied().unwrap_or(0.0);
        let end = self
            .cumulative_m
            .get(projection.segment + 1)
            .copied()
            .unwrap_or(start);
        start + (end - start) * projection.fraction
    }

    fn locate_stops(&self) -> Vec<f64> {
        self.parameters
            .stops
            .iter()
            .map(|stop| {
                project_onto_polyline(stop.lat, stop.lon, &self.path)
                    .map(|projection| self.distance_along(&projection))
                    .unwrap_or(0.0)
            })
            .collect()
    }

    fn next_stop(&self, along_m: f64, arrival_m: f64) -> usize {
        self.stop_at_m
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, at)| **at > along_m + arrival_m)
            .map(|(index, _)| index)
            .unwrap_or(self.stop_at_m.len().max(1))
    }

    fn replace_route(&mut self, route: &Route, parameters: RouteParameters) {
        *self = Self::new(route, parameters);
    }
}

/// Tracks a walking route from raw location fixes.
pub struct LocalRouteTracker {
    config: TrackerConfig,
    progress: Arc<Mutex<Progress>>,
    rerouting: Mutex<Option<Rerouting>>,
    events: TrackerEventSink,
}

impl LocalRouteTracker {
    /// Track the first route of `result`.
    pub fn new(
        result: &RouteResult,
        config: TrackerConfig,
        events: TrackerEventSink,
    ) -> Result<Self, RoutingError> {
        let route = result
            .first_route()
            .filter(|route| !route.is_empty())
            .ok_or_else(|| RoutingError::NoRoute("route result has no geometry".to_string()))?;
        Ok(Self {
            config,
            progress: Arc::new(Mutex::new(Progress::new(route, result.parameters.clone()))),
            rerouting: Mutex::new(None),
            events,
        })
    }

    pub fn status(&self) -> TrackingStatus {
        lock(&self.progress).status.clone()
    }

    pub fn route(&self) -> Route {
        lock(&self.progress).route.clone()
    }

    fn start_reroute(&self, service: Arc<dyn RouteService>, parameters: RouteParameters) {
        let progress = Arc::clone(&self.progress);
        let events = Arc::clone(&self.events);
        let hold = self.config.off_route_samples;
        let solve = async move {
            let outcome = service.solve_route(parameters).await;
            let event = {
                let mut progress = lock(&progress);
                progress.status.rerouting = false;
                let event = match outcome {
                    Ok(result) => match result.first_route().filter(|route| !route.is_empty()) {
                        Some(route) => {
                            progress.replace_route(route, result.parameters.clone());
                            TrackerEvent::RerouteCompleted(result)
                        }
                        None => TrackerEvent::RerouteFailed("reroute returned no route".to_string()),
                    },
                    Err(err) => TrackerEvent::RerouteFailed(err.to_string()),
                };
                if matches!(event, TrackerEvent::RerouteFailed(_)) {
                    progress.reroute_hold = hold;
                }
                event
            };
            if let TrackerEvent::RerouteFailed(reason) = &event {
                tracing::warn!("Reroute failed: {}", reason);
            }
            events(event);
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(solve);
            }
            Err(err) => {
                {
                    let mut progress = lock(&self.progress);
                    progress.status.rerouting = false;
                    progress.reroute_hold = hold;
                }
                (self.events)(TrackerEvent::RerouteFailed(err.to_string()));
            }
        }
    }
}

impl RouteTracker for LocalRouteTracker {
    fn track_location(&self, location: &Location) {
        let mut events = Vec::new();
        let mut reroute = None;
        {
            let mut progress = lock(&self.progress);
            if progress.status.destination == DestinationStatus::Reached {
                return;
            }
            let Some(projection) = project_onto_polyline(location.lat, location.lon, &progress.path)
            else {
                return;
            };

            let along_m = progress.distance_along(&projection);
            let remaining_m = (progress.total_m() - along_m).max(0.0);
            let near_route = projection.distance_m <= self.config.off_route_threshold_m;
            progress.off_route_fixes = if near_route {
                0
            } else {
                progress.off_route_fixes.saturating_add(1)
            };
            if near_route {
                progress.reroute_hold = 0;
            }
            let on_route = progress.off_route_fixes < self.config.off_route_samples;

            let destination = if near_route && remaining_m <= self.config.arrival_distance_m {
                DestinationStatus::Reached
            } else if near_route && remaining_m <= self.config.approach_distance_m {
                DestinationStatus::Approaching
            } else {
                DestinationStatus::NotReached
            };

            let next_maneuver = match destination {
                DestinationStatus::Reached => None,
                _ => progress
                    .maneuver_at_m
                    .iter()
                    .position(|at| *at > along_m)
                    .or_else(|| progress.maneuver_at_m.len().checked_sub(1)),
            };
            let last_stop = progress.stop_at_m.len().max(2) - 1;
            let next_stop = match destination {
                DestinationStatus::Reached => last_stop + 1,
                _ if near_route => progress
                    .next_stop(along_m, self.config.arrival_distance_m)
                    .min(last_stop),
                _ => progress.status.next_stop,
            };

            let mut rerouting = progress.status.rerouting;
            let wants_reroute = !on_route && !rerouting && destination != DestinationStatus::Reached;
            if wants_reroute && progress.reroute_hold > 0 {
                progress.reroute_hold -= 1;
            } else if wants_reroute {
                if let Ok(guard) = self.rerouting.lock() {
                    if let Some(setup) = guard.as_ref() {
                        let parameters = reroute_parameters(
                            &progress.parameters,
                            location,
                            next_stop,
                            setup.strategy,
                        );
                        reroute = Some((Arc::clone(&setup.service), parameters));
                        rerouting = true;
                    }
                }
            }

            let status = TrackingStatus {
                on_route,
                rerouting,
                destination,
                remaining_distance_m: remaining_m,
                next_maneuver,
                next_stop,
            };
            let previous = std::mem::replace(&mut progress.status, status.clone());
            if previous.on_route != status.on_route
                || previous.rerouting != status.rerouting
                || previous.destination != status.destination
                || previous.next_maneuver != status.next_maneuver
                || previous.next_stop != status.next_stop
            {
                events.push(TrackerEvent::TrackingStatusChanged(status));
            }
            if reroute.is_some() {
                events.push(TrackerEvent::RerouteStarted);
            }

            if destination == DestinationStatus::Reached {
                let text = progress
                    .route
                    .maneuvers
                    .last()
                    .filter(|maneuver| maneuver.kind == ManeuverKind::Stop)
                    .map(|maneuver| maneuver.text.clone())
                    .unwrap_or_else(|| ARRIVED_TEXT.to_string());
                events.push(TrackerEvent::NewVoiceGuidance(text));
            } else if on_route {
                let due = progress
                    .route
                    .maneuvers
                    .iter()
                    .zip(progress.maneuver_at_m.iter())
                    .enumerate()
                    .filter(|(index, (maneuver, at))| {
                        progress.announced.map_or(true, |last| *index > last)
                            && maneuver.kind != ManeuverKind::Stop
                            && **at - along_m <= self.config.approach_distance_m
                    })
                    .map(|(index, (maneuver, _))| (index, maneuver.text.clone()))
                    .last();
                if let Some((index, text)) = due {
                    progress.announced = Some(index);
                    events.push(TrackerEvent::NewVoiceGuidance(text));
                }
            }
        }

        for event in events {
            (self.events)(event);
        }
        if let Some((service, parameters)) = reroute {
            self.start_reroute(service, parameters);
        }
    }

    fn enable_rerouting(
        &self,
        service: Arc<dyn RouteService>,
        parameters: RouteParameters,
        strategy: ReroutingStrategy,
    ) {
        {
            let mut progress = lock(&self.progress);
            progress.parameters = parameters;
            progress.stop_at_m = progress.locate_stops();
        }
        if let Ok(mut guard) = self.rerouting.lock() {
            *guard = Some(Rerouting { service, strategy });
        }
    }

    fn guidance_text(&self) -> String {
        let progress = lock(&self.progress);
        let status = &progress.status;
        if status.destination == DestinationStatus::Reached {
            return ARRIVED_TEXT.to_string();
        }
        if status.rerouting {
            return "Rerouting…".to_string();
        }
        if status.is_off_route() {
            return OFF_ROUTE_TEXT.to_string();
        }
        let along_m = progress.total_m() - status.remaining_distance_m;
        match status.next_maneuver.and_then(|index| {
            progress
                .route
                .maneuvers
                .get(index)
                .zip(progress.maneuver_at_m.get(index))
        }) {
            Some((maneuver, _)) if maneuver.kind == ManeuverKind::Stop => format!(
                "{:.0} meters to your destination",
                status.remaining_distance_m
            ),
            Some((maneuver, at)) => {
                format!("In {:.0} meters: {}", (at - along_m).max(0.0), maneuver.text)
            }
            None => format!("{:.0} meters remaining", status.remaining_distance_m),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
