//! Two-tap walking route planner.
//!
//! The planner connects to the route service first; taps are only accepted
//! once that succeeds. The first tap places the start, the second the
//! destination, which triggers a solve.

use std::sync::Arc;

use arnav_core::models::{Route, RouteResult, RouteServiceInfo, Stop};
use arnav_core::routing::{walking_parameters, RouteService, RoutingError};
use serde::Serialize;

use crate::session::{NavigationSession, SessionError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum PlanState {
    Loading,
    LoadFailed(String),
    AwaitingStart,
    AwaitingEnd,
    Solving,
    Ready,
    SolveFailed(String),
}

impl PlanState {
    pub fn help_text(&self) -> &str {
        match self {
            PlanState::Loading => "Connecting to the route service…",
            PlanState::LoadFailed(_) => "Error connecting to route service.",
            PlanState::AwaitingStart => "Tap to place a start point",
            PlanState::AwaitingEnd => "Tap to place an end point",
            PlanState::Solving => "Solving route…",
            PlanState::Ready => "Route ready. Start navigation when you are.",
            PlanState::SolveFailed(_) => "Unable to solve the route. Tap reset to try again.",
        }
    }
}

pub struct RoutePlanner {
    service: Arc<dyn RouteService>,
    info: Option<RouteServiceInfo>,
    state: PlanState,
    start: Option<Stop>,
    end: Option<Stop>,
    result: Option<RouteResult>,
}

impl RoutePlanner {
    pub fn new(service: Arc<dyn RouteService>) -> Self {
        Self {
            service,
            info: None,
            state: PlanState::Loading,
            start: None,
            end: None,
            result: None,
        }
    }

    /// Connect to the route service. Tap input is enabled only on success.
    pub async fn load(&mut self) -> Result<&RouteServiceInfo, RoutingError> {
        match self.service.load().await {
            Ok(info) => {
                tracing::info!(
                    "Route service loaded ({} travel modes, rerouting {})",
                    info.travel_modes.len(),
                    info.supports_rerouting
                );
                self.state = PlanState::AwaitingStart;
                Ok(self.info.insert(info))
            }
            Err(err) => {
                tracing::warn!("Route service failed to load: {}", err);
                self.state = PlanState::LoadFailed(err.to_string());
                Err(err)
            }
        }
    }

    pub fn state(&self) -> &PlanState {
        &self.state
    }

    pub fn help_text(&self) -> &str {
        self.state.help_text()
    }

    pub fn stops(&self) -> Vec<Stop> {
        self.start.iter().chain(self.end.iter()).cloned().collect()
    }

    pub fn route(&self) -> Option<&Route> {
        self.result.as_ref().and_then(RouteResult::first_route)
    }

    pub fn result(&self) -> Option<&RouteResult> {
        self.result.as_ref()
    }

    /// Handle a tap at (lat, lon).
    ///
    /// Taps are ignored while loading, solving or once a route is ready.
    pub async fn place_point(&mut self, lat: f64, lon: f64) -> &PlanState {
        match self.state {
            PlanState::AwaitingStart => {
                self.start = Some(Stop {
                    name: Some("Start".to_string()),
                    ..Stop::new(lat, lon)
                });
                self.state = PlanState::AwaitingEnd;
            }
            PlanState::AwaitingEnd => {
                self.end = Some(Stop {
                    name: Some("End".to_string()),
                    ..Stop::new(lat, lon)
                });
                self.solve().await;
            }
            _ => tracing::debug!("Ignoring tap in state {:?}", self.state),
        }
        &self.state
    }

    /// Clear both points and any solved route.
    pub fn reset(&mut self) {
        if matches!(self.state, PlanState::Loading | PlanState::LoadFailed(_)) {
            return;
        }
        self.start = None;
        self.end = None;
        self.result = None;
        self.state = PlanState::AwaitingStart;
    }

    async fn solve(&mut self) {
        self.state = PlanState::Solving;
        match self.try_solve().await {
            Ok(result) => {
                self.result = Some(result);
                self.state = PlanState::Ready;
            }
            Err(err) => {
                tracing::warn!("Route solve failed: {}", err);
                self.state = PlanState::SolveFailed(err.to_string());
            }
        }
    }

    async fn try_solve(&self) -> Result<RouteResult, RoutingError> {
        let info = self.info.as_ref().ok_or(RoutingError::NotLoaded)?;
        let stops = self.stops();
        if stops.len() < 2 {
            return Err(RoutingError::NotEnoughStops(stops.len()));
        }
        let defaults = self.service.default_parameters().await?;
        let parameters = walking_parameters(defaults, info, stops);
        let result = self.service.solve_route(parameters).await?;
        match result.first_route() {
            Some(route) if !route.is_empty() => Ok(result),
            _ => Err(RoutingError::NoRoute("service returned no routes".to_string())),
        }
    }

    /// Hand the solved route over to navigation.
    pub fn begin_navigation(self) -> Result<NavigationSession, SessionError> {
        let (Some(result), Some(info)) = (self.result, self.info) else {
            return Err(SessionError::NoRoute);
        };
        NavigationSession::new(result, self.service, info)
    }
}
