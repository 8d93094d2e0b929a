// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Pass-window generation (spec §4.7 "Generator"): scan a lookahead
//! window for AOS/LOS crossings of a minimum elevation, build a
//! [`PassCandidate`] per pass, and turn it into a [`ScheduledObservation`]
//! once conflict resolution accepts it. Grounded on
//! `original_source/backend/observations/constants.py` for the default
//! regeneration cadence and
//! `original_source/backend/observations/conflicts.py`/[`crate::conflicts`]
//! for the overlap/priority logic this module drives.

use chrono::{DateTime, Duration, Utc};

use gs_core::{ConflictStrategy, GsError, ScheduledObservation, SessionPlan};
use gs_tracker::{SatellitePropagator, StationLocation};

use crate::conflicts::{find_overlapping_observation, resolve, PassCandidate, Resolution};

/// `DEFAULT_AUTO_GENERATE_INTERVAL_HOURS` in the original constants module.
pub const DEFAULT_REGENERATION_INTERVAL: std::time::Duration = std::time::Duration::from_secs(12 * 3600);

/// Step size when scanning for elevation crossings. Coarse enough to be
/// cheap over a multi-day lookahead, fine enough not to miss a pass from a
/// fast low-orbit satellite.
const SCAN_STEP: Duration = Duration::seconds(15);

/// Minutes of setup time budgeted before AOS and teardown time budgeted
/// after LOS, giving `task_start_utc`/`task_end_utc` margin around the
/// actual `event_start_utc`/`event_end_utc` pass window.
const TASK_MARGIN_MINUTES: i64 = 1;

/// One geometric pass over the station, before session plans are attached.
#[derive(Debug, Clone)]
pub struct PassWindow {
    pub norad_id: u32,
    pub event_start_utc: DateTime<Utc>,
    pub event_end_utc: DateTime<Utc>,
    pub peak_elevation_deg: f64,
}

/// Scan `[from, from + lookahead)` for every pass of `propagator` over
/// `station` that crosses above `min_elevation_deg`.
pub fn find_passes(
    propagator: &SatellitePropagator,
    station: StationLocation,
    from: DateTime<Utc>,
    lookahead: Duration,
    min_elevation_deg: f64,
) -> Result<Vec<PassWindow>, GsError> {
    let mut passes = Vec::new();
    let mut t = from;
    let end = from + lookahead;

    let mut in_pass = false;
    let mut pass_start = t;
    let mut peak_elevation_deg = f64::MIN;

    while t < end {
        let point = propagator.track(station, t)?;
        let above = point.elevation_deg >= min_elevation_deg;

        if above && !in_pass {
            in_pass = true;
            pass_start = t;
            peak_elevation_deg = point.elevation_deg;
        } else if above && in_pass {
            peak_elevation_deg = peak_elevation_deg.max(point.elevation_deg);
        } else if !above && in_pass {
            in_pass = false;
            passes.push(PassWindow {
                norad_id: propagator.norad_id() as u32,
                event_start_utc: pass_start,
                event_end_utc: t,
                peak_elevation_deg,
            });
        }

        t += SCAN_STEP;
    }

    if in_pass {
        passes.push(PassWindow { norad_id: propagator.norad_id() as u32, event_start_utc: pass_start, event_end_utc: t, peak_elevation_deg });
    }

    Ok(passes)
}

/// Turn accepted passes into [`ScheduledObservation`]s against `existing`,
/// applying `strategy` to every conflict [`find_overlapping_observation`]
/// reports. Rejected (`Skip`) passes are simply omitted; `Replace`d
/// observations are reported separately so the caller can delete them.
pub fn generate_observations(
    passes: &[PassWindow],
    monitored_satellite_id: Option<&str>,
    sessions_template: &[SessionPlan],
    existing: &[ScheduledObservation],
    strategy: ConflictStrategy,
    generated_at: DateTime<Utc>,
    id_for_pass: impl Fn(&PassWindow) -> String,
) -> (Vec<ScheduledObservation>, Vec<String>) {
    let mut accepted: Vec<ScheduledObservation> = Vec::new();
    let mut superseded_ids = Vec::new();
    let margin = Duration::minutes(TASK_MARGIN_MINUTES);

    for pass in passes {
        let candidate = PassCandidate {
            norad_id: pass.norad_id,
            monitored_satellite_id: monitored_satellite_id.map(str::to_string),
            event_start_utc: pass.event_start_utc,
            event_end_utc: pass.event_end_utc,
            peak_elevation_deg: pass.peak_elevation_deg,
        };

        // Check both the caller's stored observations and whatever this
        // same batch has already accepted, so two conflicting passes
        // generated in one call (spec §4.7 scenario 5) can't both win.
        let overlapping_stored = find_overlapping_observation(existing, &candidate);
        let overlapping_batch = find_overlapping_observation(&accepted, &candidate);
        let overlapping = overlapping_batch.or(overlapping_stored);

        match resolve(strategy, &candidate, overlapping) {
            Resolution::Skip => continue,
            Resolution::Schedule => {}
            Resolution::Replace => {
                if let Some(existing_obs) = overlapping_stored {
                    superseded_ids.push(existing_obs.id.clone());
                }
                if let Some(batch_obs) = overlapping_batch {
                    let batch_id = batch_obs.id.clone();
                    accepted.retain(|obs| obs.id != batch_id);
                }
            }
        }

        accepted.push(ScheduledObservation {
            id: id_for_pass(pass),
            norad_id: pass.norad_id,
            monitored_satellite_id: monitored_satellite_id.map(str::to_string),
            event_start_utc: pass.event_start_utc,
            event_end_utc: pass.event_end_utc,
            task_start_utc: pass.event_start_utc - margin,
            task_end_utc: pass.event_end_utc + margin,
            peak_elevation_deg: pass.peak_elevation_deg,
            status: gs_core::ObservationStatus::Scheduled,
            error_message: None,
            error_count: 0,
            actual_start_utc: None,
            actual_end_utc: None,
            sessions: sessions_template.to_vec(),
            generated_at,
        });
    }

    (accepted, superseded_ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE1: &str = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9994";
    const LINE2: &str = "2 25544  51.6400 208.9163 0006317  69.9862  25.2906 15.49560118427000";

    fn greenwich_station() -> StationLocation {
        StationLocation { latitude_deg: 51.4769, longitude_deg: 0.0, altitude_m: 0.0 }
    }

    #[test]
    fn finds_at_least_one_pass_over_a_day() {
        let propagator = SatellitePropagator::from_tle(None, LINE1, LINE2).unwrap();
        let from: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
        let passes = find_passes(&propagator, greenwich_station(), from, Duration::hours(24), 10.0).unwrap();

        assert!(!passes.is_empty());
        for pass in &passes {
            assert!(pass.event_end_utc > pass.event_start_utc);
            assert!(pass.peak_elevation_deg >= 10.0);
        }
    }

    #[test]
    fn raising_min_elevation_shrinks_the_candidate_set() {
        let propagator = SatellitePropagator::from_tle(None, LINE1, LINE2).unwrap();
        let from: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
        let lenient = find_passes(&propagator, greenwich_station(), from, Duration::hours(24), 0.0).unwrap();
        let strict = find_passes(&propagator, greenwich_station(), from, Duration::hours(24), 60.0).unwrap();

        assert!(strict.len() <= lenient.len());
    }

    #[test]
    fn generate_observations_skips_what_conflicts_resolves_to_skip() {
        let pass = PassWindow {
            norad_id: 25544,
            event_start_utc: "2024-01-01T10:00:00Z".parse().unwrap(),
            event_end_utc: "2024-01-01T10:10:00Z".parse().unwrap(),
            peak_elevation_deg: 40.0,
        };
        let existing = vec![ScheduledObservation {
            id: "obs-1".to_string(),
            norad_id: 25544,
            monitored_satellite_id: Some("sat-1".to_string()),
            event_start_utc: pass.event_start_utc,
            event_end_utc: pass.event_end_utc,
            task_start_utc: pass.event_start_utc,
            task_end_utc: pass.event_end_utc,
            peak_elevation_deg: 60.0,
            status: gs_core::ObservationStatus::Scheduled,
            error_message: None,
            error_count: 0,
            actual_start_utc: None,
            actual_end_utc: None,
            sessions: Vec::new(),
            generated_at: pass.event_start_utc,
        }];

        let (accepted, superseded) = generate_observations(
            &[pass],
            Some("sat-1"),
            &[],
            &existing,
            ConflictStrategy::Priority,
            "2024-01-01T00:00:00Z".parse().unwrap(),
            |p| format!("{}-{}", p.norad_id, p.event_start_utc.timestamp()),
        );

        assert!(accepted.is_empty());
        assert!(superseded.is_empty());
    }

    #[test]
    fn generate_observations_schedules_when_nothing_conflicts() {
        let pass = PassWindow {
            norad_id: 25544,
            event_start_utc: "2024-01-01T10:00:00Z".parse().unwrap(),
            event_end_utc: "2024-01-01T10:10:00Z".parse().unwrap(),
            peak_elevation_deg: 40.0,
        };

        let (accepted, superseded) = generate_observations(
            &[pass],
            Some("sat-1"),
            &[],
            &[],
            ConflictStrategy::Priority,
            "2024-01-01T00:00:00Z".parse().unwrap(),
            |p| format!("{}-{}", p.norad_id, p.event_start_utc.timestamp()),
        );

        assert_eq!(accepted.len(), 1);
        assert!(superseded.is_empty());
        assert_eq!(accepted[0].task_start_utc, pass.event_start_utc - Duration::minutes(TASK_MARGIN_MINUTES));
    }

    #[test]
    fn overlapping_passes_in_the_same_batch_keep_only_the_higher_elevation_one() {
        // Two candidate passes of the same satellite generated in one
        // lookahead scan (a slightly wrong TLE epoch double-counting a
        // pass, or a re-run covering an already-scanned window) must not
        // both survive: the later, lower-elevation one should be skipped
        // against the one this same call already accepted.
        let low = PassWindow {
            norad_id: 25544,
            event_start_utc: "2024-01-01T10:00:00Z".parse().unwrap(),
            event_end_utc: "2024-01-01T10:10:00Z".parse().unwrap(),
            peak_elevation_deg: 30.0,
        };
        let high = PassWindow {
            norad_id: 25544,
            event_start_utc: low.event_start_utc + Duration::minutes(3),
            event_end_utc: low.event_end_utc + Duration::minutes(3),
            peak_elevation_deg: 60.0,
        };

        let (accepted, _) = generate_observations(
            &[low, high],
            None,
            &[],
            &[],
            ConflictStrategy::Priority,
            "2024-01-01T00:00:00Z".parse().unwrap(),
            |p| format!("{}-{}", p.norad_id, p.event_start_utc.timestamp()),
        );

        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].event_start_utc, high.event_start_utc);
    }
}
