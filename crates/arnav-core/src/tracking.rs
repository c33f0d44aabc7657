//! Route tracking contract: status, events and the tracker interface.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{Location, RouteParameters, RouteResult};
use crate::routing::{ReroutingStrategy, RouteService};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationStatus {
    #[default]
    NotReached,
    Approaching,
    Reached,
}

/// Snapshot of progress along the active route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingStatus {
    pub on_route: bool,
    pub rerouting: bool,
    pub destination: DestinationStatus,
    pub remaining_distance_m: f64,
    /// Index into the route's maneuvers of the next instruction.
    pub next_maneuver: Option<usize>,
    /// Index into the solve stops of the next stop not yet reached.
    pub next_stop: usize,
}

impl TrackingStatus {
    pub fn is_off_route(&self) -> bool {
        !self.on_route
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// Text to show and speak.
    NewVoiceGuidance(String),
    TrackingStatusChanged(TrackingStatus),
    RerouteStarted,
    /// A replacement route; candidate 0 is the one to display.
    RerouteCompleted(RouteResult),
    RerouteFailed(String),
}

/// Where a tracker delivers its events.
pub type TrackerEventSink = Arc<dyn Fn(TrackerEvent) + Send + Sync>;

/// Follows the user's progress along a route.
///
/// `track_location` is fire-and-forget: results arrive later as
/// [`TrackerEvent`]s on the sink the tracker was created with.
pub trait RouteTracker: Send + Sync {
    fn track_location(&self, location: &Location);

    /// Turn on automatic rerouting through `service`.
    ///
    /// Only call when the service reports rerouting support.
    fn enable_rerouting(
        &self,
        service: Arc<dyn RouteService>,
        parameters: RouteParameters,
        strategy: ReroutingStrategy,
    );

    /// Guidance text for the current status.
    fn guidance_text(&self) -> String;
}
