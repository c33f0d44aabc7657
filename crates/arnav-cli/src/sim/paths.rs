//! Simulated walks and GPS output.

use arnav_core::altitude::nmea_checksum;
use arnav_core::spatial::{
    bearing_deg, destination_point, haversine_distance, lat_span_deg, lon_span_deg,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Trait for simulated walks.
pub trait WalkPath: Send + Sync {
    /// Get (lat, lon) at time t seconds from start.
    fn position(&self, t: f64) -> (f64, f64);

    /// Get approximate heading at time t (degrees, 0 = North).
    fn heading(&self, t: f64) -> f64 {
        let (lat1, lon1) = self.position(t);
        let (lat2, lon2) = self.position(t + 0.5);
        if haversine_distance(lat1, lon1, lat2, lon2) < 1e-3 {
            return 0.0;
        }
        bearing_deg(lat1, lon1, lat2, lon2)
    }

    fn speed_mps(&self) -> f64;

    /// Seconds until the walk reaches its end.
    fn duration(&self) -> f64;
}

#[derive(Debug, Clone, Copy)]
struct Detour {
    start_m: f64,
    end_m: f64,
    offset_m: f64,
}

/// Walk along a (lat, lon) polyline at constant speed, optionally stepping
/// sideways for part of the way.
#[derive(Debug, Clone)]
pub struct PolylineWalk {
    points: Vec<(f64, f64)>,
    cumulative_m: Vec<f64>,
    speed_mps: f64,
    detour: Option<Detour>,
}

impl PolylineWalk {
    pub fn new(points: Vec<(f64, f64)>, speed_mps: f64) -> Self {
        let mut cumulative_m = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (index, point) in points.iter().enumerate() {
            if index > 0 {
                let prev = points[index - 1];
                total += haversine_distance(prev.0, prev.1, point.0, point.1);
            }
            cumulative_m.push(total);
        }
        Self {
            points,
            cumulative_m,
            speed_mps: speed_mps.max(0.1),
            detour: None,
        }
    }

    /// Walk `offset_m` to the right of the path between `start_m` and
    /// `end_m` along it.
    pub fn with_detour(mut self, start_m: f64, end_m: f64, offset_m: f64) -> Self {
        self.detour = Some(Detour {
            start_m,
            end_m,
            offset_m,
        });
        self
    }

    pub fn length_m(&self) -> f64 {
        self.cumulative_m.last().copied().unwrap_or(0.0)
    }

    /// Position and segment bearing at `along_m` meters from the start.
    fn point_at(&self, along_m: f64) -> (f64, f64, f64) {
        let Some(&first) = self.points.first() else {
            return (0.0, 0.0, 0.0);
        };
        let along_m = along_m.clamp(0.0, self.length_m());
        for (index, pair) in self.points.windows(2).enumerate() {
            let (start, end) = (pair[0], pair[1]);
            let (from, to) = (self.cumulative_m[index], self.cumulative_m[index + 1]);
            if along_m <= to || index + 2 == self.points.len() {
                let span = (to - from).max(1e-9);
                let fraction = ((along_m - from) / span).clamp(0.0, 1.0);
                return (
                    start.0 + (end.0 - start.0) * fraction,
                    start.1 + (end.1 - start.1) * fraction,
                    bearing_deg(start.0, start.1, end.0, end.1),
                );
            }
        }
        (first.0, first.1, 0.0)
    }
}

impl WalkPath for PolylineWalk {
    fn position(&self, t: f64) -> (f64, f64) {
        let along_m = t.max(0.0) * self.speed_mps;
        let (lat, lon, bearing) = self.point_at(along_m);
        match self.detour {
            Some(detour) if along_m >= detour.start_m && along_m <= detour.end_m => {
                destination_point(lat, lon, detour.offset_m, bearing + 90.0)
            }
            _ => (lat, lon),
        }
    }

    fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    fn duration(&self) -> f64 {
        self.length_m() / self.speed_mps
    }
}

/// Uniform horizontal GPS jitter.
pub struct GpsNoise {
    rng: StdRng,
    amplitude_m: f64,
}

impl GpsNoise {
    pub fn new(amplitude_m: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            rng,
            amplitude_m: amplitude_m.max(0.0),
        }
    }

    pub fn apply(&mut self, lat: f64, lon: f64) -> (f64, f64) {
        if self.amplitude_m <= 0.0 {
            return (lat, lon);
        }
        let north = self.rng.random_range(-self.amplitude_m..=self.amplitude_m);
        let east = self.rng.random_range(-self.amplitude_m..=self.amplitude_m);
        (lat + lat_span_deg(north, lat), lon + lon_span_deg(east, lat))
    }
}

/// A `$GPGGA` sentence for a fix at (lat, lon).
pub fn gga_sentence(
    utc_seconds: f64,
    lat: f64,
    lon: f64,
    msl_altitude_m: f64,
    geoid_separation_m: f64,
) -> String {
    let seconds = utc_seconds.rem_euclid(86_400.0);
    let hours = (seconds / 3600.0).floor();
    let minutes = ((seconds - hours * 3600.0) / 60.0).floor();
    let secs = seconds - hours * 3600.0 - minutes * 60.0;
    let body = format!(
        "GPGGA,{:02}{:02}{:05.2},{},{},{},{},1,08,0.9,{:.1},M,{:.1},M,,",
        hours as u32,
        minutes as u32,
        secs,
        nmea_degrees(lat.abs(), 2),
        if lat >= 0.0 { "N" } else { "S" },
        nmea_degrees(lon.abs(), 3),
        if lon >= 0.0 { "E" } else { "W" },
        msl_altitude_m,
        geoid_separation_m
    );
    format!("${}*{:02X}", body, nmea_checksum(&body))
}

fn nmea_degrees(value: f64, degree_digits: usize) -> String {
    let degrees = value.floor();
    let minutes = (value - degrees) * 60.0;
    format!("{:0width$}{:07.4}", degrees as u32, minutes, width = degree_digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arnav_core::altitude::parse_gga;

    #[test]
    fn walk_follows_the_corner() {
        let walk = PolylineWalk::new(vec![(34.0, -118.0), (34.001, -118.0), (34.001, -117.999)], 1.4);
        let (lat, lon) = walk.position(0.0);
        assert_eq!((lat, lon), (34.0, -118.0));

        let (lat, lon) = walk.position(walk.duration() + 10.0);
        assert!((lat - 34.001).abs() < 1e-9);
        assert!((lon + 117.999).abs() < 1e-9);
        assert!((walk.heading(1.0) - 0.0).abs() < 1.0);
    }

    #[test]
    fn detour_steps_off_the_path() {
        let walk = PolylineWalk::new(vec![(34.0, -118.0), (34.001, -118.0)], 1.0).with_detour(20.0, 60.0, 40.0);
        let (lat, lon) = walk.position(40.0);
        let (on_lat, on_lon) = PolylineWalk::new(vec![(34.0, -118.0), (34.001, -118.0)], 1.0).position(40.0);
        let offset = haversine_distance(lat, lon, on_lat, on_lon);
        assert!((offset - 40.0).abs() < 0.5);
    }

    #[test]
    fn seeded_noise_stays_within_amplitude() {
        let mut noise = GpsNoise::new(3.0, Some(7));
        for _ in 0..100 {
            let (lat, lon) = noise.apply(34.0, -118.0);
            assert!(haversine_distance(34.0, -118.0, lat, lon) <= 3.0 * 2f64.sqrt() + 0.01);
        }
    }

    #[test]
    fn gga_sentence_round_trips_altitude() {
        let sentence = gga_sentence(45_296.0, 34.0522, -118.2437, 89.3, -33.2);
        assert!(sentence.starts_with("$GPGGA,123456.00,3403.1320,N,11814.6220,W,1,08"));
        let fix = parse_gga(&sentence).unwrap();
        assert_eq!(fix.msl_altitude_m, 89.3);
        assert_eq!(fix.geoid_separation_m, -33.2);
    }
}
