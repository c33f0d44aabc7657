//! Spatial math for route geometry, densification and progress checks.

use crate::models::GeoPoint;

/// Mean Earth radius for great-circle math.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Sphere radius of the Web Mercator projection.
pub const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;

const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_6;

// Length of one degree as a cosine series in latitude: (multiple, meters).
const DEGREE_LAT_SERIES: [(f64, f64); 4] = [
    (0.0, 111_132.954),
    (2.0, -559.822),
    (4.0, 1.175),
    (6.0, -0.0023),
];
const DEGREE_LON_SERIES: [(f64, f64); 3] = [(1.0, 111_412.84), (3.0, -93.5), (5.0, 0.118)];

fn cosine_series(series: &[(f64, f64)], lat_deg: f64) -> f64 {
    let phi = lat_deg.to_radians();
    series
        .iter()
        .map(|(multiple, meters)| meters * (multiple * phi).cos())
        .sum()
}

/// Great-circle distance in meters between two WGS84 positions.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let hav = |angle: f64| (angle / 2.0).sin().powi(2);
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let h = hav(phi2 - phi1) + phi1.cos() * phi2.cos() * hav((lon2 - lon1).to_radians());
    2.0 * EARTH_RADIUS_M * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Initial bearing from the first position to the second, degrees in
/// `[0, 360)` clockwise from north.
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dlon = (lon2 - lon1).to_radians();
    let east = dlon.sin() * phi2.cos();
    let north = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();
    east.atan2(north).to_degrees().rem_euclid(360.0)
}

/// Position reached by walking `distance_m` from (lat, lon) on a great
/// circle with initial bearing `bearing_deg`.
pub fn destination_point(lat: f64, lon: f64, distance_m: f64, bearing_deg: f64) -> (f64, f64) {
    if distance_m == 0.0 {
        return (lat, lon);
    }
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = lat.to_radians();

    let sin_phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).clamp(-1.0, 1.0);
    let phi2 = sin_phi2.asin();
    let dlon = (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * sin_phi2);

    let lon2 = (lon + dlon.to_degrees() + 180.0).rem_euclid(360.0) - 180.0;
    (phi2.to_degrees(), lon2)
}

// ==== Web Mercator ====

/// Project WGS84 degrees to Web Mercator meters. Latitude is clamped to the
/// projection's valid band.
pub fn lat_lon_to_web_mercator(lat: f64, lon: f64) -> (f64, f64) {
    let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
    let x = WEB_MERCATOR_RADIUS_M * lon.to_radians();
    let y = WEB_MERCATOR_RADIUS_M
        * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
            .tan()
            .ln();
    (x, y)
}

/// Inverse of [`lat_lon_to_web_mercator`], returning (lat, lon) degrees.
pub fn web_mercator_to_lat_lon(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WEB_MERCATOR_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / WEB_MERCATOR_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2)
        .to_degrees();
    (lat, lon)
}

// ==== Local distances ====

/// Meters in one degree of latitude at `lat_deg`.
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    cosine_series(&DEGREE_LAT_SERIES, lat_deg)
}

/// Meters in one degree of longitude at `lat_deg`.
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    cosine_series(&DEGREE_LON_SERIES, lat_deg)
}

/// Degrees of latitude spanned by `north_m` meters near `at_lat`.
pub fn lat_span_deg(north_m: f64, at_lat: f64) -> f64 {
    north_m / meters_per_deg_lat(at_lat).max(1e-9)
}

/// Degrees of longitude spanned by `east_m` meters near `at_lat`.
pub fn lon_span_deg(east_m: f64, at_lat: f64) -> f64 {
    east_m / meters_per_deg_lon(at_lat).max(1e-9)
}

/// Flat east/north frame anchored at a position, good for a few kilometers.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin_lat: f64,
    origin_lon: f64,
    lat_m: f64,
    lon_m: f64,
}

impl LocalFrame {
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            origin_lat: lat,
            origin_lon: lon,
            lat_m: meters_per_deg_lat(lat),
            lon_m: meters_per_deg_lon(lat),
        }
    }

    /// (east, north) meters from the origin.
    pub fn to_local(&self, lat: f64, lon: f64) -> (f64, f64) {
        (
            (lon - self.origin_lon) * self.lon_m,
            (lat - self.origin_lat) * self.lat_m,
        )
    }
}

/// Closest approach of a position to a polyline of (lat, lon) vertices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylineProjection {
    /// Index of the segment start vertex.
    pub segment: usize,
    /// Fraction along the segment, 0..=1.
    pub fraction: f64,
    pub distance_m: f64,
}

/// Distance from `point` to the segment `start`..`end` and the fraction
/// along the segment of the closest point.
fn project_onto_segment(point: (f64, f64), start: (f64, f64), end: (f64, f64)) -> (f64, f64) {
    let frame = LocalFrame::at(start.0, start.1);
    let (px, py) = frame.to_local(point.0, point.1);
    let (sx, sy) = frame.to_local(end.0, end.1);

    let length_sq = sx * sx + sy * sy;
    let fraction = if length_sq < 1e-4 {
        0.0
    } else {
        ((px * sx + py * sy) / length_sq).clamp(0.0, 1.0)
    };
    ((px - fraction * sx).hypot(py - fraction * sy), fraction)
}

/// Find the segment of `points` nearest to (lat, lon).
///
/// A single-vertex polyline projects onto that vertex. Returns `None` for an
/// empty polyline.
pub fn project_onto_polyline(lat: f64, lon: f64, points: &[(f64, f64)]) -> Option<PolylineProjection> {
    match points {
        [] => None,
        [(only_lat, only_lon)] => Some(PolylineProjection {
            segment: 0,
            fraction: 0.0,
            distance_m: haversine_distance(lat, lon, *only_lat, *only_lon),
        }),
        _ => points
            .windows(2)
            .enumerate()
            .map(|(segment, pair)| {
                let (distance_m, fraction) = project_onto_segment((lat, lon), pair[0], pair[1]);
                PolylineProjection {
                    segment,
                    fraction,
                    distance_m,
                }
            })
            .min_by(|a, b| a.distance_m.total_cmp(&b.distance_m)),
    }
}

/// Great-circle length of a (lat, lon) polyline in meters.
pub fn path_length_m(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(pair[0].0, pair[0].1, pair[1].0, pair[1].1))
        .sum()
}

// ==== Planar geometry ====

/// Sum of planar segment lengths in the geometry's linear unit.
pub fn planar_length(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].planar_distance(&pair[1]))
        .sum()
}

/// Insert evenly spaced vertices so no two consecutive points are farther
/// apart than `max_spacing`.
///
/// Original vertices are kept in place. A non-positive or non-finite spacing
/// returns the input unchanged.
pub fn densify(points: &[GeoPoint], max_spacing: f64) -> Vec<GeoPoint> {
    if !max_spacing.is_finite() || max_spacing <= 0.0 || points.len() < 2 {
        return points.to_vec();
    }

    let mut out = Vec::with_capacity(points.len());
    for pair in points.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        out.push(start);

        let length = start.planar_distance(&end);
        if !length.is_finite() {
            continue;
        }
        let pieces = (length / max_spacing).ceil() as usize;
        for step in 1..pieces {
            let ratio = step as f64 / pieces as f64;
            out.push(GeoPoint::new(
                start.x + (end.x - start.x) * ratio,
                start.y + (end.y - start.y) * ratio,
            ));
        }
    }
    if let Some(last) = points.last() {
        out.push(*last);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_latitude() {
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_195.0).abs() < 5.0);
        assert!(haversine_distance(34.05, -118.25, 34.05, -118.25) < 1e-6);
    }

    #[test]
    fn destination_point_walks_the_bearing() {
        let (lat, lon) = destination_point(34.0, -118.0, 250.0, 90.0);
        assert!((haversine_distance(34.0, -118.0, lat, lon) - 250.0).abs() < 0.01);
        assert!((bearing_deg(34.0, -118.0, lat, lon) - 90.0).abs() < 0.01);
        assert_eq!(destination_point(34.0, -118.0, 0.0, 45.0), (34.0, -118.0));
    }

    #[test]
    fn span_conversions_invert_frame() {
        let north = lat_span_deg(120.0, 34.0);
        let east = lon_span_deg(-80.0, 34.0);
        let (x, y) = LocalFrame::at(34.0, -118.0).to_local(34.0 + north, -118.0 + east);
        assert!((x + 80.0).abs() < 1e-6);
        assert!((y - 120.0).abs() < 1e-6);
    }

    #[test]
    fn web_mercator_matches_known_extent() {
        let (x, y) = lat_lon_to_web_mercator(0.0, 180.0);
        assert!((x - 20_037_508.342_789).abs() < 0.01);
        assert!(y.abs() < 1e-6);

        let (lat, lon) = web_mercator_to_lat_lon(-13_046_000.0, 4_036_000.0);
        let (x2, y2) = lat_lon_to_web_mercator(lat, lon);
        assert!((x2 + 13_046_000.0).abs() < 1e-3);
        assert!((y2 - 4_036_000.0).abs() < 1e-3);
    }

    #[test]
    fn densify_bounds_spacing_and_keeps_vertices() {
        let points = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(1.0, 0.0),
            GeoPoint::new(1.0, 0.45),
        ];
        let dense = densify(&points, 0.3);

        assert_eq!(dense.first(), points.first());
        assert_eq!(dense.last(), points.last());
        assert!(dense.contains(&points[1]));
        for pair in dense.windows(2) {
            assert!(pair[0].planar_distance(&pair[1]) <= 0.3 + 1e-9);
        }
        // 1.0 / 0.3 -> 4 pieces, 0.45 / 0.3 -> 2 pieces
        assert_eq!(dense.len(), 7);
    }

    #[test]
    fn densify_leaves_short_segments_alone() {
        let points = vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.2, 0.0)];
        assert_eq!(densify(&points, 0.3), points);
        assert_eq!(densify(&points, 0.0), points);
    }

    #[test]
    fn polyline_projection_picks_nearest_segment() {
        let base_lat = 34.0;
        let base_lon = -117.0;
        let east = lon_span_deg(100.0, base_lat);
        let north = lat_span_deg(100.0, base_lat);
        let line = vec![
            (base_lat, base_lon),
            (base_lat, base_lon + east),
            (base_lat + north, base_lon + east),
        ];

        let point_lat = base_lat + north / 2.0;
        let point_lon = base_lon + east + lon_span_deg(10.0, base_lat);
        let projection = project_onto_polyline(point_lat, point_lon, &line).unwrap();

        assert_eq!(projection.segment, 1);
        assert!((projection.distance_m - 10.0).abs() < 0.5);
        assert!((projection.fraction - 0.5).abs() < 0.01);
    }

    #[test]
    fn bearing_points_east() {
        let bearing = bearing_deg(0.0, 0.0, 0.0, 1.0);
        assert!((bearing - 90.0).abs() < 1e-6);
    }
}
