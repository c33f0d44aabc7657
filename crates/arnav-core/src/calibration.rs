//! Live heading and altitude calibration.
//!
//! GPS altitude and compass heading drift; the user corrects both at runtime
//! with two spring-loaded sliders. Each slider reports a bounded delta per
//! tick while displaced. Offsets accumulate without bounds for the lifetime
//! of the navigation screen and are never persisted.

use serde::{Deserialize, Serialize};

/// Basemap opacity while calibrating, so the user can line the route up
/// against imagery.
pub const CALIBRATING_BASEMAP_OPACITY: f32 = 0.5;

/// Origin camera of the AR scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    pub heading_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

impl Camera {
    pub fn new(lat: f64, lon: f64, altitude_m: f64) -> Self {
        Self {
            lat,
            lon,
            altitude_m,
            heading_deg: 0.0,
            pitch_deg: 90.0,
            roll_deg: 0.0,
        }
    }

    /// Same position with a new orientation.
    pub fn rotate_to(&self, heading_deg: f64, pitch_deg: f64, roll_deg: f64) -> Camera {
        Camera {
            heading_deg,
            pitch_deg,
            roll_deg,
            ..*self
        }
    }
}

/// The AR view's origin camera.
pub trait CameraSink: Send + Sync {
    fn origin_camera(&self) -> Camera;
    fn set_origin_camera(&self, camera: Camera);
}

/// What the calibration toggle changes on screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationView {
    pub basemap_opacity: f32,
    pub controls_visible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    heading_offset_deg: f64,
    altitude_offset_m: f64,
    calibrating: bool,
}

impl CalibrationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total heading correction applied so far.
    pub fn heading_offset_deg(&self) -> f64 {
        self.heading_offset_deg
    }

    /// Total altitude correction added to every location sample.
    pub fn altitude_offset_m(&self) -> f64 {
        self.altitude_offset_m
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    /// Rotate `camera` by `delta_deg`, keeping pitch and roll.
    ///
    /// The heading is not wrapped; the camera consumer normalizes it.
    pub fn apply_heading_delta(&mut self, camera: &Camera, delta_deg: f64) -> Camera {
        if !delta_deg.is_finite() {
            tracing::debug!("Ignoring non-finite heading delta {}", delta_deg);
            return *camera;
        }
        self.heading_offset_deg += delta_deg;
        camera.rotate_to(camera.heading_deg + delta_deg, camera.pitch_deg, camera.roll_deg)
    }

    /// Add `delta_m` to the altitude offset and return the new total.
    pub fn apply_altitude_delta(&mut self, delta_m: f64) -> f64 {
        if delta_m.is_finite() {
            self.altitude_offset_m += delta_m;
        } else {
            tracing::debug!("Ignoring non-finite altitude delta {}", delta_m);
        }
        self.altitude_offset_m
    }

    pub fn set_calibrating(&mut self, calibrating: bool) -> CalibrationView {
        self.calibrating = calibrating;
        self.view()
    }

    pub fn toggle_calibrating(&mut self) -> CalibrationView {
        self.set_calibrating(!self.calibrating)
    }

    pub fn view(&self) -> CalibrationView {
        if self.calibrating {
            CalibrationView {
                basemap_opacity: CALIBRATING_BASEMAP_OPACITY,
                controls_visible: true,
            }
        } else {
            CalibrationView {
                basemap_opacity: 0.0,
                controls_visible: false,
            }
        }
    }
}

/// Spring-loaded slider: the farther from center, the larger the delta per
/// tick; zero at rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeltaControl {
    pub min: f64,
    pub max: f64,
}

impl Default for DeltaControl {
    fn default() -> Self {
        Self {
            min: -10.0,
            max: 10.0,
        }
    }
}

impl DeltaControl {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Delta for a displacement in `[-1, 1]`, where 0 is the rest position.
    pub fn delta_for(&self, displacement: f64) -> f64 {
        if !displacement.is_finite() {
            return 0.0;
        }
        let displacement = displacement.clamp(-1.0, 1.0);
        if displacement >= 0.0 {
            displacement * self.max
        } else {
            displacement * -self.min
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_deltas_compose_additively() {
        let camera = Camera {
            heading_deg: 10.0,
            pitch_deg: 85.0,
            roll_deg: -2.0,
            ..Camera::new(34.0, -117.0, 400.0)
        };

        let mut stepwise = CalibrationState::new();
        let mut current = camera;
        for delta in [2.5, -1.25, 4.0] {
            current = stepwise.apply_heading_delta(&current, delta);
        }

        let mut once = CalibrationState::new();
        let combined = once.apply_heading_delta(&camera, 2.5 - 1.25 + 4.0);

        assert_eq!(current, combined);
        assert_eq!(current.heading_deg, 15.25);
        assert_eq!(current.pitch_deg, 85.0);
        assert_eq!(current.roll_deg, -2.0);
        assert_eq!(stepwise.heading_offset_deg(), once.heading_offset_deg());
    }

    #[test]
    fn heading_is_not_wrapped() {
        let mut state = CalibrationState::new();
        let camera = Camera {
            heading_deg: 355.0,
            ..Camera::new(0.0, 0.0, 0.0)
        };
        assert_eq!(state.apply_heading_delta(&camera, 10.0).heading_deg, 365.0);
    }

    #[test]
    fn altitude_offset_is_running_sum() {
        let mut state = CalibrationState::new();
        for delta in [5.0, -2.0, 1.0] {
            state.apply_altitude_delta(delta);
        }
        assert_eq!(state.altitude_offset_m(), 4.0);

        state.apply_altitude_delta(f64::NAN);
        assert_eq!(state.altitude_offset_m(), 4.0);
    }

    #[test]
    fn toggling_calibration_shows_basemap_and_controls() {
        let mut state = CalibrationState::new();
        assert!(!state.view().controls_visible);

        let view = state.toggle_calibrating();
        assert!(view.controls_visible);
        assert_eq!(view.basemap_opacity, CALIBRATING_BASEMAP_OPACITY);

        let view = state.toggle_calibrating();
        assert!(!view.controls_visible);
        assert_eq!(view.basemap_opacity, 0.0);
    }

    #[test]
    fn delta_control_scales_and_clamps() {
        let control = DeltaControl::default();
        assert_eq!(control.delta_for(0.0), 0.0);
        assert_eq!(control.delta_for(0.5), 5.0);
        assert_eq!(control.delta_for(-0.25), -2.5);
        assert_eq!(control.delta_for(3.0), 10.0);
        assert_eq!(control.delta_for(f64::NAN), 0.0);
    }
}
