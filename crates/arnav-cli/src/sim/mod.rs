//! Simulation helpers for walking navigation.

pub mod paths;
pub mod services;

pub use paths::{gga_sentence, GpsNoise, PolylineWalk, WalkPath};
pub use services::{LShapedRoutes, RollingHills};
