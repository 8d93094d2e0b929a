// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! SGP4-backed orbit propagation: TLE → az/el/subpoint/Doppler for one
//! ground station (spec C9, GLOSSARY "AOS/LOS", "Doppler shift",
//! "Subpoint"). The `sgp4` crate does the actual orbital mechanics; this
//! module only adds the ground-station-relative geometry the crate
//! doesn't: ECI→ECEF rotation, topocentric az/el, and WGS84 geodetic
//! subpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gs_core::GsError;

const EARTH_RADIUS_EQUATORIAL_KM: f64 = 6378.137;
const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;
const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Ground station position, WGS84 geodetic coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StationLocation {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

/// One instant's worth of tracking geometry for a satellite pass.
#[derive(Debug, Clone, Copy)]
pub struct TrackPoint {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub subpoint_latitude_deg: f64,
    pub subpoint_longitude_deg: f64,
    pub subpoint_altitude_km: f64,
    /// Line-of-sight range rate, km/s. Positive means the satellite is
    /// receding (range increasing).
    pub range_rate_km_s: f64,
}

impl TrackPoint {
    /// Doppler-shifted frequency a ground station would observe for a
    /// signal nominally transmitted at `tx_freq_hz` (GLOSSARY "Doppler
    /// shift"). Receding satellites shift the observed frequency down.
    pub fn doppler_shifted_freq_hz(&self, tx_freq_hz: f64) -> f64 {
        let range_rate_m_s = self.range_rate_km_s * 1000.0;
        tx_freq_hz * (1.0 - range_rate_m_s / SPEED_OF_LIGHT_M_S)
    }

    pub fn is_above_horizon(&self) -> bool {
        self.elevation_deg > 0.0
    }
}

/// Wraps one satellite's cached SGP4 propagation constants, grounded on
/// the `sgp4` crate's `Elements`/`Constants` split: elements parse the
/// TLE, constants cache the derived propagation coefficients so repeated
/// calls don't redo that setup.
pub struct SatellitePropagator {
    elements: sgp4::Elements,
    constants: sgp4::Constants,
}

impl SatellitePropagator {
    pub fn from_tle(object_name: Option<String>, line1: &str, line2: &str) -> Result<Self, GsError> {
        let elements = sgp4::Elements::from_tle(object_name, line1.as_bytes(), line2.as_bytes())
            .map_err(|e| GsError::configuration(format!("parsing TLE: {e}")))?;
        let constants =
            sgp4::Constants::from_elements(&elements).map_err(|e| GsError::configuration(format!("building SGP4 constants: {e}")))?;
        Ok(Self { elements, constants })
    }

    pub fn norad_id(&self) -> u64 {
        self.elements.norad_id
    }

    fn minutes_since_epoch(&self, at: DateTime<Utc>) -> f64 {
        let delta = at.naive_utc() - self.elements.datetime;
        delta.num_milliseconds() as f64 / 60_000.0
    }

    fn position_velocity_teme_km(&self, at: DateTime<Utc>) -> Result<([f64; 3], [f64; 3]), GsError> {
        let prediction = self
            .constants
            .propagate(sgp4::MinutesSinceEpoch(self.minutes_since_epoch(at)))
            .map_err(|e| GsError::transient(format!("SGP4 propagation failed: {e}")))?;
        Ok((prediction.position, prediction.velocity))
    }

    /// Compute az/el/range/subpoint/range-rate for `station` at instant `at`.
    pub fn track(&self, station: StationLocation, at: DateTime<Utc>) -> Result<TrackPoint, GsError> {
        let (position_teme_km, _velocity_teme_km_s) = self.position_velocity_teme_km(at)?;
        let gmst_rad = greenwich_mean_sidereal_time_rad(at);
        let position_ecef_km = rotate_z(position_teme_km, -gmst_rad);

        let station_ecef_km = geodetic_to_ecef_km(station);
        let (azimuth_deg, elevation_deg, range_km) = ecef_to_topocentric(position_ecef_km, station_ecef_km, station);
        let (subpoint_latitude_deg, subpoint_longitude_deg, subpoint_altitude_km) = ecef_to_geodetic(position_ecef_km);

        // Range rate via finite difference rather than rotating-frame
        // velocity transform: one extra propagation call, much simpler to
        // get right, and the spec only needs a credible Doppler figure,
        // not sub-Hz precision.
        let dt = chrono::Duration::milliseconds(1000);
        let (position_teme_km_later, _) = self.position_velocity_teme_km(at + dt)?;
        let gmst_rad_later = greenwich_mean_sidereal_time_rad(at + dt);
        let position_ecef_km_later = rotate_z(position_teme_km_later, -gmst_rad_later);
        let (_, _, range_km_later) = ecef_to_topocentric(position_ecef_km_later, station_ecef_km, station);
        let range_rate_km_s = range_km_later - range_km;

        Ok(TrackPoint {
            azimuth_deg,
            elevation_deg,
            range_km,
            subpoint_latitude_deg,
            subpoint_longitude_deg,
            subpoint_altitude_km,
            range_rate_km_s,
        })
    }
}

fn rotate_z(v: [f64; 3], angle_rad: f64) -> [f64; 3] {
    let (s, c) = angle_rad.sin_cos();
    [c * v[0] - s * v[1], s * v[0] + c * v[1], v[2]]
}

/// Greenwich Mean Sidereal Time, in radians, via the standard IAU 1982
/// polynomial in Julian centuries since J2000.0.
fn greenwich_mean_sidereal_time_rad(at: DateTime<Utc>) -> f64 {
    let jd = julian_date(at);
    let t = (jd - 2_451_545.0) / 36_525.0;
    let gmst_sec = 67_310.548_41
        + (876_600.0 * 3600.0 + 8_640_184.812_866) * t
        + 0.093_104 * t * t
        - 6.2e-6 * t * t * t;
    let gmst_deg = (gmst_sec % 86_400.0) / 240.0;
    let gmst_deg = gmst_deg.rem_euclid(360.0);
    gmst_deg.to_radians()
}

fn julian_date(at: DateTime<Utc>) -> f64 {
    const UNIX_EPOCH_JD: f64 = 2_440_587.5;
    UNIX_EPOCH_JD + at.timestamp() as f64 / 86_400.0 + at.timestamp_subsec_nanos() as f64 / 86_400.0e9
}

fn geodetic_to_ecef_km(station: StationLocation) -> [f64; 3] {
    let lat = station.latitude_deg.to_radians();
    let lon = station.longitude_deg.to_radians();
    let alt_km = station.altitude_m / 1000.0;

    let e2 = EARTH_FLATTENING * (2.0 - EARTH_FLATTENING);
    let n = EARTH_RADIUS_EQUATORIAL_KM / (1.0 - e2 * lat.sin() * lat.sin()).sqrt();

    let x = (n + alt_km) * lat.cos() * lon.cos();
    let y = (n + alt_km) * lat.cos() * lon.sin();
    let z = (n * (1.0 - e2) + alt_km) * lat.sin();
    [x, y, z]
}

/// Iterative ECEF → WGS84 geodetic conversion (Bowring's method).
fn ecef_to_geodetic(ecef_km: [f64; 3]) -> (f64, f64, f64) {
    let [x, y, z] = ecef_km;
    let e2 = EARTH_FLATTENING * (2.0 - EARTH_FLATTENING);
    let p = (x * x + y * y).sqrt();
    let lon = y.atan2(x);

    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..8 {
        let n = EARTH_RADIUS_EQUATORIAL_KM / (1.0 - e2 * lat.sin() * lat.sin()).sqrt();
        let alt = p / lat.cos() - n;
        lat = z.atan2(p * (1.0 - e2 * n / (n + alt)));
    }
    let n = EARTH_RADIUS_EQUATORIAL_KM / (1.0 - e2 * lat.sin() * lat.sin()).sqrt();
    let alt_km = p / lat.cos() - n;

    (lat.to_degrees(), lon.to_degrees(), alt_km)
}

fn ecef_to_topocentric(sat_ecef_km: [f64; 3], station_ecef_km: [f64; 3], station: StationLocation) -> (f64, f64, f64) {
    let d = [
        sat_ecef_km[0] - station_ecef_km[0],
        sat_ecef_km[1] - station_ecef_km[1],
        sat_ecef_km[2] - station_ecef_km[2],
    ];
    let range_km = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();

    let lat = station.latitude_deg.to_radians();
    let lon = station.longitude_deg.to_radians();

    // ENU (east, north, up) basis at the station.
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    let east = -sin_lon * d[0] + cos_lon * d[1];
    let north = -sin_lat * cos_lon * d[0] - sin_lat * sin_lon * d[1] + cos_lat * d[2];
    let up = cos_lat * cos_lon * d[0] + cos_lat * sin_lon * d[1] + sin_lat * d[2];

    let azimuth_deg = east.atan2(north).to_degrees().rem_euclid(360.0);
    let elevation_deg = (up / range_km).asin().to_degrees();

    (azimuth_deg, elevation_deg, range_km)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ISS (ZARYA) TLE, a stable real-world fixture for sanity bounds.
    const LINE1: &str = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9994";
    const LINE2: &str = "2 25544  51.6400 208.9163 0006317  69.9862  25.2906 15.49560118427000";

    fn greenwich_station() -> StationLocation {
        StationLocation { latitude_deg: 51.4769, longitude_deg: 0.0, altitude_m: 0.0 }
    }

    #[test]
    fn tle_parses_and_exposes_norad_id() {
        let propagator = SatellitePropagator::from_tle(Some("ISS (ZARYA)".to_string()), LINE1, LINE2).unwrap();
        assert_eq!(propagator.norad_id(), 25544);
    }

    #[test]
    fn track_point_has_plausible_geometry() {
        let propagator = SatellitePropagator::from_tle(None, LINE1, LINE2).unwrap();
        let at: DateTime<Utc> = "2024-01-01T12:00:00Z".parse().unwrap();
        let point = propagator.track(greenwich_station(), at).unwrap();

        assert!((0.0..360.0).contains(&point.azimuth_deg));
        assert!((-90.0..=90.0).contains(&point.elevation_deg));
        assert!(point.range_km > 300.0 && point.range_km < 3000.0);
        assert!(point.subpoint_latitude_deg.abs() <= 90.0);
        assert!(point.range_rate_km_s.abs() < 10.0);
    }

    #[test]
    fn doppler_shift_is_symmetric_around_transmit_frequency() {
        let propagator = SatellitePropagator::from_tle(None, LINE1, LINE2).unwrap();
        let at: DateTime<Utc> = "2024-01-01T12:00:00Z".parse().unwrap();
        let point = propagator.track(greenwich_station(), at).unwrap();

        let observed = point.doppler_shifted_freq_hz(145_800_000.0);
        // With a sub-10 km/s range rate the shift on a 145.8 MHz carrier
        // stays within a few kHz.
        assert!((observed - 145_800_000.0).abs() < 10_000.0);
    }

    #[test]
    fn geodetic_round_trips_through_ecef() {
        let station = StationLocation { latitude_deg: 40.0, longitude_deg: -75.0, altitude_m: 100.0 };
        let ecef = geodetic_to_ecef_km(station);
        let (lat, lon, alt_km) = ecef_to_geodetic(ecef);
        assert!((lat - 40.0).abs() < 0.01);
        assert!((lon - (-75.0)).abs() < 0.01);
        assert!((alt_km - 0.1).abs() < 0.01);
    }
}
