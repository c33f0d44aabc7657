//! Altitude reference handling for location samples.
//!
//! Device GPS reports height above the WGS84 ellipsoid while terrain and
//! route data use mean sea level. The adjuster converts samples to MSL using
//! the geoid separation from the receiver's NMEA GGA sentences, then adds the
//! user's manual calibration offset.

use serde::{Deserialize, Serialize};

use crate::models::Location;

/// How raw location altitudes are interpreted before the manual offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AltitudeAdjustmentMode {
    /// Pass ellipsoidal heights through unchanged.
    Ellipsoid,
    /// Convert to MSL with the geoid separation from the latest GGA fix.
    #[default]
    NmeaParsedMsl,
}

impl AltitudeAdjustmentMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "ellipsoid" | "hae" | "none" => Some(Self::Ellipsoid),
            "nmea" | "msl" | "nmea_parsed_msl" => Some(Self::NmeaParsedMsl),
            _ => None,
        }
    }
}

/// Fields of an NMEA GGA sentence relevant to altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GgaFix {
    pub fix_quality: u8,
    pub satellites: u8,
    /// Antenna altitude above mean sea level.
    pub msl_altitude_m: f64,
    /// Geoid height above the WGS84 ellipsoid.
    pub geoid_separation_m: f64,
}

impl GgaFix {
    /// Height above the ellipsoid converted to height above mean sea level.
    pub fn to_msl(&self, ellipsoid_height_m: f64) -> f64 {
        ellipsoid_height_m - self.geoid_separation_m
    }
}

/// XOR checksum of the characters between `$` and `*`.
pub fn nmea_checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, byte| acc ^ byte)
}

/// Parse a GGA sentence from any talker (`$GPGGA`, `$GNGGA`, ...).
///
/// Returns `None` for other sentence types, bad checksums, missing altitude
/// fields, or fix quality 0 (no fix).
pub fn parse_gga(sentence: &str) -> Option<GgaFix> {
    let sentence = sentence.trim();
    let body = sentence.strip_prefix('$')?;
    let body = match body.split_once('*') {
        Some((body, checksum)) => {
            let expected = u8::from_str_radix(checksum.trim(), 16).ok()?;
            if nmea_checksum(body) != expected {
                return None;
            }
            body
        }
        None => body,
    };

    let fields: Vec<&str> = body.split(',').collect();
    let kind = fields.first()?;
    if kind.len() != 5 || !kind.ends_with("GGA") {
        return None;
    }

    let fix_quality: u8 = fields.get(6)?.parse().ok()?;
    if fix_quality == 0 {
        return None;
    }
    let satellites = fields.get(7).and_then(|value| value.parse().ok()).unwrap_or(0);
    let msl_altitude_m: f64 = fields.get(9)?.parse().ok()?;
    let geoid_separation_m: f64 = fields.get(11)?.parse().ok()?;

    Some(GgaFix {
        fix_quality,
        satellites,
        msl_altitude_m,
        geoid_separation_m,
    })
}

/// Applies the altitude reference conversion and the manual calibration
/// offset to every location sample.
#[derive(Debug, Clone, Default)]
pub struct AltitudeAdjuster {
    mode: AltitudeAdjustmentMode,
    manual_offset_m: f64,
    last_fix: Option<GgaFix>,
}

impl AltitudeAdjuster {
    pub fn new(mode: AltitudeAdjustmentMode) -> Self {
        Self {
            mode,
            manual_offset_m: 0.0,
            last_fix: None,
        }
    }

    pub fn mode(&self) -> AltitudeAdjustmentMode {
        self.mode
    }

    pub fn manual_offset_m(&self) -> f64 {
        self.manual_offset_m
    }

    pub fn set_manual_offset(&mut self, offset_m: f64) {
        self.manual_offset_m = offset_m;
    }

    pub fn last_fix(&self) -> Option<&GgaFix> {
        self.last_fix.as_ref()
    }

    /// Feed a raw NMEA sentence; returns true when it updated the GGA fix.
    pub fn on_nmea_sentence(&mut self, sentence: &str) -> bool {
        match parse_gga(sentence) {
            Some(fix) => {
                self.last_fix = Some(fix);
                true
            }
            None => false,
        }
    }

    /// Corrected copy of a raw location sample.
    pub fn adjust(&self, location: &Location) -> Location {
        let base = match (self.mode, self.last_fix) {
            (AltitudeAdjustmentMode::NmeaParsedMsl, Some(fix)) => fix.to_msl(location.altitude_m),
            _ => location.altitude_m,
        };
        location.with_altitude(base + self.manual_offset_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(body: &str) -> String {
        format!("${}*{:02X}", body, nmea_checksum(body))
    }

    #[test]
    fn parses_gga_altitude_fields() {
        let gga = sentence("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        let fix = parse_gga(&gga).unwrap();
        assert_eq!(fix.fix_quality, 1);
        assert_eq!(fix.satellites, 8);
        assert_eq!(fix.msl_altitude_m, 545.4);
        assert_eq!(fix.geoid_separation_m, 46.9);
    }

    #[test]
    fn rejects_bad_checksum_and_other_sentences() {
        assert!(parse_gga("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*00").is_none());
        assert!(parse_gga(&sentence("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W")).is_none());
        assert!(parse_gga(&sentence("GNGGA,123519,,,,,0,00,,,M,,M,,")).is_none());
    }

    #[test]
    fn adjuster_converts_to_msl_then_adds_offset() {
        let mut adjuster = AltitudeAdjuster::new(AltitudeAdjustmentMode::NmeaParsedMsl);
        let raw = Location::new(48.1, 11.5, 592.3);

        assert_eq!(adjuster.adjust(&raw).altitude_m, 592.3);

        assert!(adjuster.on_nmea_sentence(&sentence(
            "GNGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,"
        )));
        adjuster.set_manual_offset(4.0);

        let adjusted = adjuster.adjust(&raw);
        assert!((adjusted.altitude_m - (592.3 - 46.9 + 4.0)).abs() < 1e-9);
        assert_eq!(adjusted.lat, raw.lat);
    }

    #[test]
    fn ellipsoid_mode_only_applies_offset() {
        let mut adjuster = AltitudeAdjuster::new(AltitudeAdjustmentMode::Ellipsoid);
        adjuster.on_nmea_sentence(&sentence(
            "GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
        ));
        adjuster.set_manual_offset(-2.5);
        assert_eq!(adjuster.adjust(&Location::new(0.0, 0.0, 100.0)).altitude_m, 97.5);
    }
}
