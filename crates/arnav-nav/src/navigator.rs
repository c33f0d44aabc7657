//! AR navigation screen runtime.
//!
//! One task owns the navigation state and consumes a single event queue:
//! location fixes, NMEA sentences, calibration input, tracker events and
//! finished drape passes all arrive in order on it. Drape passes run on
//! their own tasks and report back tagged with the route version they were
//! started for; a result for any older version is dropped.

use std::sync::Arc;

use arnav_core::altitude::{AltitudeAdjuster, AltitudeAdjustmentMode};
use arnav_core::calibration::{CalibrationState, Camera, CameraSink, DeltaControl};
use arnav_core::drape::{drape, DrapeConfig, DrapeError, DrapeSource, DrapedPath};
use arnav_core::models::{Location, Route};
use arnav_core::routing::ReroutingStrategy;
use arnav_core::terrain::TerrainSurface;
use arnav_core::tracking::{RouteTracker, TrackerEvent, TrackerEventSink};
use tokio::sync::{broadcast, mpsc};

use crate::display::{DisplayHandle, DisplayedRoute, RouteDisplay};
use crate::session::{NavigationSession, Permission, Permissions, SessionError};
use crate::speech::GuidanceVoice;
use crate::tracker::RouteTrackerFactory;

pub const CALIBRATE_FIRST_TEXT: &str = "Calibrate your heading before navigating!";
pub const REROUTING_TEXT: &str = "Rerouting…";
const ROUTE_LOADING_TEXT: &str = "Route is still loading";
const LOCATION_DENIED_TEXT: &str = "Location permission is required for turn-by-turn navigation";

#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    pub drape: DrapeConfig,
    pub altitude_mode: AltitudeAdjustmentMode,
    pub reroute_strategy: ReroutingStrategy,
    /// Heading slider range, degrees per tick.
    pub heading_control: DeltaControl,
    /// Altitude slider range, meters per tick.
    pub altitude_control: DeltaControl,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            drape: DrapeConfig::default(),
            altitude_mode: AltitudeAdjustmentMode::NmeaParsedMsl,
            reroute_strategy: ReroutingStrategy::ToNextStop,
            heading_control: DeltaControl::default(),
            altitude_control: DeltaControl::default(),
        }
    }
}

#[derive(Debug)]
pub enum NavEvent {
    Location(Location),
    NmeaSentence(String),
    /// Heading slider tick, degrees.
    HeadingDelta(f64),
    /// Altitude slider tick, meters.
    AltitudeDelta(f64),
    /// Heading slider position in `[-1, 1]`, scaled by the heading control.
    HeadingSlider(f64),
    /// Altitude slider position in `[-1, 1]`, scaled by the altitude control.
    AltitudeSlider(f64),
    ToggleCalibration,
    StartTurnByTurn,
    Tracker(TrackerEvent),
    DrapeFinished {
        version: u64,
        route: Arc<Route>,
        result: Result<DrapedPath, DrapeError>,
    },
}

/// Collaborators the navigator drives.
pub struct NavigatorDeps {
    pub surface: Arc<TerrainSurface>,
    pub camera: Arc<dyn CameraSink>,
    pub trackers: Arc<dyn RouteTrackerFactory>,
    pub voice: GuidanceVoice,
}

/// Input side of a running navigator plus its display.
#[derive(Debug, Clone)]
pub struct NavigatorHandle {
    events: mpsc::UnboundedSender<NavEvent>,
    display: DisplayHandle,
}

impl NavigatorHandle {
    /// Queue an event; false once the navigator has stopped.
    pub fn send(&self, event: NavEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn location(&self, location: Location) -> bool {
        self.send(NavEvent::Location(location))
    }

    pub fn nmea(&self, sentence: impl Into<String>) -> bool {
        self.send(NavEvent::NmeaSentence(sentence.into()))
    }

    pub fn heading_delta(&self, delta_deg: f64) -> bool {
        self.send(NavEvent::HeadingDelta(delta_deg))
    }

    pub fn altitude_delta(&self, delta_m: f64) -> bool {
        self.send(NavEvent::AltitudeDelta(delta_m))
    }

    pub fn heading_slider(&self, displacement: f64) -> bool {
        self.send(NavEvent::HeadingSlider(displacement))
    }

    pub fn altitude_slider(&self, displacement: f64) -> bool {
        self.send(NavEvent::AltitudeSlider(displacement))
    }

    pub fn toggle_calibration(&self) -> bool {
        self.send(NavEvent::ToggleCalibration)
    }

    pub fn start_turn_by_turn(&self) -> bool {
        self.send(NavEvent::StartTurnByTurn)
    }

    pub fn display(&self) -> &DisplayHandle {
        &self.display
    }
}

pub struct Navigator {
    session: NavigationSession,
    config: NavigatorConfig,
    surface: Arc<TerrainSurface>,
    camera: Arc<dyn CameraSink>,
    trackers: Arc<dyn RouteTrackerFactory>,
    voice: GuidanceVoice,
    permissions: Permissions,
    calibration: CalibrationState,
    altitude: AltitudeAdjuster,
    tracker: Option<Arc<dyn RouteTracker>>,
    current_route: Arc<Route>,
    route_version: u64,
    drape_in_flight: bool,
    /// Turn-by-turn was requested before the route could be shown.
    start_pending: bool,
    display: RouteDisplay,
    events_tx: mpsc::UnboundedSender<NavEvent>,
    events_rx: mpsc::UnboundedReceiver<NavEvent>,
}

impl Navigator {
    /// Set up navigation for `session`. The AR view needs the camera; without
    /// location, the route is shown but turn-by-turn stays disabled.
    pub fn new(
        session: NavigationSession,
        deps: NavigatorDeps,
        config: NavigatorConfig,
        permissions: Permissions,
    ) -> Result<(Self, NavigatorHandle), SessionError> {
        permissions.require(Permission::Camera)?;
        if let Err(err) = permissions.require(Permission::Location) {
            tracing::warn!("{}; turn-by-turn navigation disabled", err);
        }

        let calibration = CalibrationState::new();
        let (display, display_handle) = RouteDisplay::new(calibration.view());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = NavigatorHandle {
            events: events_tx.clone(),
            display: display_handle,
        };
        let current_route = Arc::new(session.route().clone());

        let navigator = Self {
            altitude: AltitudeAdjuster::new(config.altitude_mode),
            session,
            config,
            surface: deps.surface,
            camera: deps.camera,
            trackers: deps.trackers,
            voice: deps.voice,
            permissions,
            calibration,
            tracker: None,
            current_route,
            route_version: 0,
            drape_in_flight: false,
            start_pending: false,
            display,
            events_tx,
            events_rx,
        };
        Ok((navigator, handle))
    }

    /// Drape the session route and process events until shutdown.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            "Navigation session {} started on route '{}'",
            self.session.id(),
            self.current_route.name
        );
        if !self.voice.is_available() {
            tracing::info!("No speech engine, guidance will be shown as text only");
        }
        self.display.set_help_text(CALIBRATE_FIRST_TEXT);
        let initial = Arc::clone(&self.current_route);
        self.set_route(initial);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Navigation session {} shutting down", self.session.id());
                    break;
                }
                Some(event) = self.events_rx.recv() => self.handle(event),
            }
        }
    }

    fn handle(&mut self, event: NavEvent) {
        match event {
            NavEvent::Location(location) => self.on_location(location),
            NavEvent::NmeaSentence(sentence) => {
                if self.altitude.on_nmea_sentence(&sentence) {
                    tracing::trace!("GGA fix updated");
                }
            }
            NavEvent::HeadingDelta(delta_deg) => self.rotate_heading(delta_deg),
            NavEvent::AltitudeDelta(delta_m) => self.shift_altitude(delta_m),
            NavEvent::HeadingSlider(displacement) => {
                self.rotate_heading(self.config.heading_control.delta_for(displacement))
            }
            NavEvent::AltitudeSlider(displacement) => {
                self.shift_altitude(self.config.altitude_control.delta_for(displacement))
            }
            NavEvent::ToggleCalibration => {
                let view = self.calibration.toggle_calibrating();
                self.display.set_calibration(view);
            }
            NavEvent::StartTurnByTurn => self.start_turn_by_turn(),
            NavEvent::Tracker(event) => self.on_tracker_event(event),
            NavEvent::DrapeFinished {
                version,
                route,
                result,
            } => self.on_drape_finished(version, route, result),
        }
    }

    fn rotate_heading(&mut self, delta_deg: f64) {
        let camera = self.camera.origin_camera();
        let rotated = self.calibration.apply_heading_delta(&camera, delta_deg);
        self.camera.set_origin_camera(rotated);
    }

    fn shift_altitude(&mut self, delta_m: f64) {
        let offset_m = self.calibration.apply_altitude_delta(delta_m);
        self.altitude.set_manual_offset(offset_m);
    }

    fn on_location(&mut self, location: Location) {
        let adjusted = self.altitude.adjust(&location);
        let camera = self.camera.origin_camera();
        self.camera.set_origin_camera(Camera {
            lat: adjusted.lat,
            lon: adjusted.lon,
            altitude_m: adjusted.altitude_m,
            ..camera
        });
        if let Some(tracker) = &self.tracker {
            tracker.track_location(&adjusted);
        }
        self.display.set_location(adjusted);
    }

    fn start_turn_by_turn(&mut self) {
        if self.tracker.is_some() {
            tracing::debug!("Turn-by-turn already running");
            return;
        }
        if !self.permissions.location {
            self.display.set_help_text(LOCATION_DENIED_TEXT);
            return;
        }
        if self.display.displayed_version().is_none() {
            self.start_pending = true;
            self.display.set_help_text(ROUTE_LOADING_TEXT);
            if !self.drape_in_flight {
                tracing::info!("Route not shown yet, retrying terrain");
                let route = Arc::clone(&self.current_route);
                self.set_route(route);
            }
            return;
        }
        self.start_pending = false;

        let events = self.events_tx.clone();
        let sink: TrackerEventSink = Arc::new(move |event| {
            let _ = events.send(NavEvent::Tracker(event));
        });
        let tracker = match self.trackers.create(self.session.result(), sink) {
            Ok(tracker) => tracker,
            Err(err) => {
                tracing::warn!("Unable to start route tracking: {}", err);
                self.display.set_help_text(err.to_string());
                return;
            }
        };

        if self.session.service_info().supports_rerouting {
            tracker.enable_rerouting(
                self.session.service(),
                self.session.parameters().clone(),
                self.config.reroute_strategy,
            );
        } else {
            tracing::info!("Route service does not support rerouting");
        }
        self.display.set_help_text(tracker.guidance_text());
        self.tracker = Some(tracker);
        tracing::info!("Turn-by-turn navigation started");
    }

    fn on_tracker_event(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::NewVoiceGuidance(text) => {
                self.display.set_help_text(text.as_str());
                self.voice.announce(&text);
            }
            TrackerEvent::TrackingStatusChanged(_) => {
                if let Some(tracker) = &self.tracker {
                    self.display.set_help_text(tracker.guidance_text());
                }
            }
            TrackerEvent::RerouteStarted => self.display.set_help_text(REROUTING_TEXT),
            TrackerEvent::RerouteCompleted(result) => {
                let Some(route) = result.first_route() else {
                    tracing::warn!("Reroute completed without a route");
                    return;
                };
                if *route == *self.current_route {
                    tracing::debug!("Reroute returned the current route, keeping display");
                    return;
                }
                tracing::info!("Rerouted onto '{}'", route.name);
                self.set_route(Arc::new(route.clone()));
            }
            TrackerEvent::RerouteFailed(reason) => {
                tracing::warn!("Reroute failed: {}", reason);
                if let Some(tracker) = &self.tracker {
                    self.display.set_help_text(tracker.guidance_text());
                }
            }
        }
    }

    /// Make `route` current and start draping it. Any pass still running for
    /// an older route is superseded.
    fn set_route(&mut self, route: Arc<Route>) {
        self.route_version += 1;
        self.current_route = Arc::clone(&route);
        self.drape_in_flight = true;

        let version = self.route_version;
        let surface = Arc::clone(&self.surface);
        let config = self.config.drape.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = drape(&route, &surface, &config).await;
            let _ = events.send(NavEvent::DrapeFinished {
                version,
                route,
                result,
            });
        });
    }

    fn on_drape_finished(
        &mut self,
        version: u64,
        route: Arc<Route>,
        result: Result<DrapedPath, DrapeError>,
    ) {
        if version != self.route_version {
            tracing::debug!(
                "Dropping drape for superseded route version {} (current {})",
                version,
                self.route_version
            );
            return;
        }
        self.drape_in_flight = false;
        match result {
            Ok(path) => {
                if path.source == DrapeSource::FlatFallback {
                    tracing::warn!("Showing route '{}' without terrain", route.name);
                }
                self.display.show_route(DisplayedRoute {
                    version,
                    route,
                    path,
                });
                if self.start_pending {
                    self.start_turn_by_turn();
                }
            }
            Err(err) => {
                tracing::warn!("Failed to drape route '{}': {}", route.name, err);
                self.display
                    .set_help_text(format!("Unable to load elevation: {}", err));
            }
        }
    }
}
