//! Handoff of a solved route from planning to AR navigation.

use std::fmt;
use std::sync::Arc;

use arnav_core::models::{Route, RouteParameters, RouteResult, RouteServiceInfo};
use arnav_core::routing::RouteService;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Camera,
    Location,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Camera => write!(f, "camera"),
            Permission::Location => write!(f, "location"),
        }
    }
}

/// Runtime permissions granted by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub camera: bool,
    pub location: bool,
}

impl Permissions {
    pub fn granted() -> Self {
        Self {
            camera: true,
            location: true,
        }
    }

    pub fn require(&self, permission: Permission) -> Result<(), SessionError> {
        let granted = match permission {
            Permission::Camera => self.camera,
            Permission::Location => self.location,
        };
        if granted {
            Ok(())
        } else {
            Err(SessionError::PermissionDenied(permission))
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no route to navigate")]
    NoRoute,
    #[error("{0} permission denied")]
    PermissionDenied(Permission),
}

/// Everything navigation needs from planning: the solve result, the
/// parameters it was solved with and the service that can reroute it.
#[derive(Clone)]
pub struct NavigationSession {
    id: Uuid,
    result: RouteResult,
    service: Arc<dyn RouteService>,
    service_info: RouteServiceInfo,
}

impl NavigationSession {
    pub fn new(
        result: RouteResult,
        service: Arc<dyn RouteService>,
        service_info: RouteServiceInfo,
    ) -> Result<Self, SessionError> {
        match result.first_route() {
            Some(route) if !route.is_empty() => {}
            _ => return Err(SessionError::NoRoute),
        }
        Ok(Self {
            id: Uuid::new_v4(),
            result,
            service,
            service_info,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn route(&self) -> &Route {
        &self.result.routes[0]
    }

    pub fn result(&self) -> &RouteResult {
        &self.result
    }

    pub fn parameters(&self) -> &RouteParameters {
        &self.result.parameters
    }

    pub fn service(&self) -> Arc<dyn RouteService> {
        Arc::clone(&self.service)
    }

    pub fn service_info(&self) -> &RouteServiceInfo {
        &self.service_info
    }
}

impl fmt::Debug for NavigationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationSession")
            .field("id", &self.id)
            .field("route", &self.route().name)
            .field("supports_rerouting", &self.service_info.supports_rerouting)
            .finish()
    }
}
