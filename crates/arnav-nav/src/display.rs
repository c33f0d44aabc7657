//! What the AR view shows: the draped route, the help label, the
//! calibration controls and the origin camera.

use std::sync::{Arc, Mutex};

use arnav_core::calibration::{CalibrationView, Camera, CameraSink};
use arnav_core::drape::DrapedPath;
use arnav_core::models::{Location, Route};
use tokio::sync::watch;

/// A draped path together with the route it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedRoute {
    pub version: u64,
    pub route: Arc<Route>,
    pub path: DrapedPath,
}

/// Writer side of the display, owned by the navigator.
///
/// Each channel holds exactly one value, so a new path replaces the old one
/// atomically and readers never see both.
pub struct RouteDisplay {
    path: watch::Sender<Option<Arc<DisplayedRoute>>>,
    help_text: watch::Sender<String>,
    calibration: watch::Sender<CalibrationView>,
    location: watch::Sender<Option<Location>>,
}

impl RouteDisplay {
    pub fn new(calibration: CalibrationView) -> (Self, DisplayHandle) {
        let (path, path_rx) = watch::channel(None);
        let (help_text, help_rx) = watch::channel(String::new());
        let (calibration, calibration_rx) = watch::channel(calibration);
        let (location, location_rx) = watch::channel(None);
        (
            Self {
                path,
                help_text,
                calibration,
                location,
            },
            DisplayHandle {
                path: path_rx,
                help_text: help_rx,
                calibration: calibration_rx,
                location: location_rx,
            },
        )
    }

    pub fn show_route(&self, route: DisplayedRoute) {
        self.path.send_replace(Some(Arc::new(route)));
    }

    pub fn displayed_version(&self) -> Option<u64> {
        self.path.borrow().as_ref().map(|shown| shown.version)
    }

    pub fn set_help_text(&self, text: impl Into<String>) {
        self.help_text.send_replace(text.into());
    }

    pub fn set_calibration(&self, view: CalibrationView) {
        self.calibration.send_replace(view);
    }

    pub fn set_location(&self, location: Location) {
        self.location.send_replace(Some(location));
    }
}

/// Read side of the display. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DisplayHandle {
    path: watch::Receiver<Option<Arc<DisplayedRoute>>>,
    help_text: watch::Receiver<String>,
    calibration: watch::Receiver<CalibrationView>,
    location: watch::Receiver<Option<Location>>,
}

impl DisplayHandle {
    pub fn route(&self) -> Option<Arc<DisplayedRoute>> {
        self.path.borrow().clone()
    }

    pub fn help_text(&self) -> String {
        self.help_text.borrow().clone()
    }

    pub fn calibration(&self) -> CalibrationView {
        *self.calibration.borrow()
    }

    pub fn location(&self) -> Option<Location> {
        self.location.borrow().clone()
    }

    pub fn watch_route(&self) -> watch::Receiver<Option<Arc<DisplayedRoute>>> {
        self.path.clone()
    }

    pub fn watch_help_text(&self) -> watch::Receiver<String> {
        self.help_text.clone()
    }
}

/// In-memory origin camera for headless runs.
#[derive(Debug)]
pub struct OriginCamera {
    camera: Mutex<Camera>,
}

impl OriginCamera {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera: Mutex::new(camera),
        }
    }
}

impl CameraSink for OriginCamera {
    fn origin_camera(&self) -> Camera {
        match self.camera.lock() {
            Ok(camera) => *camera,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_origin_camera(&self, camera: Camera) {
        match self.camera.lock() {
            Ok(mut current) => *current = camera,
            Err(poisoned) => *poisoned.into_inner() = camera,
        }
    }
}
