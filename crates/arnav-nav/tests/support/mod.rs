//! Fake collaborators shared by the navigation integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arnav_core::models::{
    Route, RouteParameters, RouteResult, RouteServiceInfo, SpatialReference, Stop, TravelMode,
};
use arnav_core::routing::{maneuvers_for_path, RouteService, RoutingError};
use arnav_core::spatial::path_length_m;
use arnav_core::terrain::{ElevationError, ElevationSource};
use arnav_core::tracking::{
    RouteTracker, TrackerEvent, TrackerEventSink,
};
use arnav_core::{Location, ReroutingStrategy};
use arnav_nav::speech::{SpeechError, SpeechSynthesizer};
use arnav_nav::tracker::RouteTrackerFactory;
use futures::future::BoxFuture;
use tokio::sync::watch;

pub const GROUND_M: f64 = 100.0;

/// A walking route through `points` in Web Mercator.
pub fn route_through(name: &str, points: &[(f64, f64)]) -> Route {
    let spatial_reference = SpatialReference::WebMercator;
    Route {
        name: name.to_string(),
        geometry: points
            .iter()
            .map(|(lat, lon)| spatial_reference.from_lat_lon(*lat, *lon))
            .collect(),
        maneuvers: maneuvers_for_path(points),
        spatial_reference,
        total_length_m: path_length_m(points),
    }
}

pub fn result_for(route: Route) -> RouteResult {
    let points = route.lat_lon_points();
    let (first, last) = (points[0], points[points.len() - 1]);
    RouteResult {
        routes: vec![route],
        parameters: RouteParameters {
            stops: vec![Stop::new(first.0, first.1), Stop::new(last.0, last.1)],
            ..RouteParameters::default()
        },
    }
}

/// Route service that walks straight between consecutive stops.
pub struct StraightLineService {
    pub fail_load: bool,
    pub supports_rerouting: bool,
    pub solved: Mutex<Vec<RouteParameters>>,
}

impl StraightLineService {
    pub fn new() -> Self {
        Self {
            fail_load: false,
            supports_rerouting: true,
            solved: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_load: true,
            ..Self::new()
        }
    }
}

impl RouteService for StraightLineService {
    fn load(&self) -> BoxFuture<'_, Result<RouteServiceInfo, RoutingError>> {
        Box::pin(async move {
            if self.fail_load {
                return Err(RoutingError::LoadFailed("connection refused".to_string()));
            }
            Ok(RouteServiceInfo {
                travel_modes: vec![TravelMode::new("Driving Time"), TravelMode::new("Walking Time")],
                supports_rerouting: self.supports_rerouting,
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
            self.solved.lock().unwrap().push(parameters.clone());
            let points: Vec<(f64, f64)> =
                parameters.stops.iter().map(|stop| (stop.lat, stop.lon)).collect();
            Ok(RouteResult {
                routes: vec![route_through("Walking route", &points)],
                parameters,
            })
        })
    }
}

/// Flat ground at [`GROUND_M`]. The first `failing_loads` loads fail.
/// Queries north of `gate_above_lat` wait for the gate to open.
pub struct FlatGround {
    pub queries: AtomicUsize,
    pub loads: AtomicUsize,
    pub failing_loads: usize,
    gate_above_lat: f64,
    gate: watch::Receiver<bool>,
}

impl FlatGround {
    pub fn open() -> Self {
        let (_, gate) = watch::channel(true);
        Self::with_gate(f64::INFINITY, gate)
    }

    pub fn with_gate(gate_above_lat: f64, gate: watch::Receiver<bool>) -> Self {
        Self {
            queries: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            failing_loads: 0,
            gate_above_lat,
            gate,
        }
    }

    pub fn unloadable() -> Self {
        Self::flaky(usize::MAX)
    }

    pub fn flaky(failing_loads: usize) -> Self {
        Self {
            failing_loads,
            ..Self::open()
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl ElevationSource for FlatGround {
    fn load(&self) -> BoxFuture<'_, Result<(), ElevationError>> {
        Box::pin(async move {
            let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failing_loads {
                return Err(ElevationError::LoadFailed("tiles unavailable".to_string()));
            }
            Ok(())
        })
    }

    fn elevation(&self, lat: f64, _lon: f64) -> BoxFuture<'_, Result<f64, ElevationError>> {
        Box::pin(async move {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if lat > self.gate_above_lat {
                let mut gate = self.gate.clone();
                let _ = gate.wait_for(|open| *open).await;
            }
            Ok(GROUND_M)
        })
    }
}

/// Tracker factory whose trackers do nothing; the test drives events
/// through the captured sink.
#[derive(Default)]
pub struct ManualTrackers {
    pub sink: Mutex<Option<TrackerEventSink>>,
    pub rerouting_enabled: Arc<Mutex<bool>>,
    pub locations: Arc<Mutex<Vec<Location>>>,
}

impl ManualTrackers {
    pub fn started(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    pub fn rerouting_enabled(&self) -> bool {
        *self.rerouting_enabled.lock().unwrap()
    }

    pub fn emit(&self, event: TrackerEvent) {
        let sink = self.sink.lock().unwrap().clone();
        let sink = sink.expect("tracker created");
        sink(event);
    }
}

struct ManualTracker {
    locations: Arc<Mutex<Vec<Location>>>,
    rerouting_enabled: Arc<Mutex<bool>>,
}

impl RouteTracker for ManualTracker {
    fn track_location(&self, location: &Location) {
        self.locations.lock().unwrap().push(location.clone());
    }

    fn enable_rerouting(
        &self,
        _service: Arc<dyn RouteService>,
        _parameters: RouteParameters,
        _strategy: ReroutingStrategy,
    ) {
        *self.rerouting_enabled.lock().unwrap() = true;
    }

    fn guidance_text(&self) -> String {
        "Keep walking".to_string()
    }
}

impl RouteTrackerFactory for ManualTrackers {
    fn create(
        &self,
        _result: &RouteResult,
        events: TrackerEventSink,
    ) -> Result<Arc<dyn RouteTracker>, RoutingError> {
        *self.sink.lock().unwrap() = Some(events);
        Ok(Arc::new(ManualTracker {
            locations: Arc::clone(&self.locations),
            rerouting_enabled: Arc::clone(&self.rerouting_enabled),
        }))
    }
}

/// Records every call in order.
#[derive(Default)]
pub struct RecordingSpeech {
    pub calls: Mutex<Vec<String>>,
}

impl SpeechSynthesizer for RecordingSpeech {
    fn stop(&self) {
        self.calls.lock().unwrap().push("<stop>".to_string());
    }

    fn speak(&self, utterance: &str) -> Result<(), SpeechError> {
        self.calls.lock().unwrap().push(utterance.to_string());
        Ok(())
    }
}

/// Wait on a watch channel with a bound on (possibly paused) time.
pub async fn wait_until<T>(rx: &mut watch::Receiver<T>, predicate: impl FnMut(&T) -> bool) {
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(predicate))
        .await
        .expect("condition reached before timeout")
        .expect("sender alive");
}
