pub mod cache;
pub mod config;
pub mod display;
pub mod navigator;
pub mod planner;
pub mod session;
pub mod speech;
pub mod terrain;
pub mod tracker;

pub use config::Config;
pub use display::{DisplayHandle, DisplayedRoute, OriginCamera, RouteDisplay};
pub use navigator::{NavEvent, Navigator, NavigatorConfig, NavigatorDeps, NavigatorHandle};
pub use planner::{PlanState, RoutePlanner};
pub use session::{NavigationSession, Permission, Permissions, SessionError};
pub use speech::{GuidanceVoice, LogSpeech, SpeechError, SpeechSynthesizer};
pub use terrain::{GridSettings, OpenMeteoTerrain, TerrainFetchError, TerrainGrid};
pub use tracker::{LocalRouteTracker, LocalTrackerFactory, RouteTrackerFactory, TrackerConfig};
