pub mod altitude;
pub mod calibration;
pub mod drape;
pub mod models;
pub mod routing;
pub mod spatial;
pub mod terrain;
pub mod tracking;

pub use altitude::{AltitudeAdjuster, AltitudeAdjustmentMode, GgaFix};
pub use calibration::{CalibrationState, CalibrationView, Camera, CameraSink, DeltaControl};
pub use drape::{
    drape, DrapeConfig, DrapeError, DrapeSource, DrapedPath, DrapedPoint, SurfacePlacement,
};
pub use models::{
    GeoPoint, Location, Maneuver, ManeuverKind, Route, RouteParameters, RouteResult,
    RouteServiceInfo, SpatialReference, Stop, TravelMode,
};
pub use routing::{ReroutingStrategy, RouteService, RoutingError};
pub use spatial::haversine_distance;
pub use terrain::{ElevationError, ElevationSource, TerrainSurface};
pub use tracking::{
    DestinationStatus, RouteTracker, TrackerEvent, TrackerEventSink, TrackingStatus,
};
