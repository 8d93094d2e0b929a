// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Pass-overlap detection and conflict resolution (spec §4.7 "Generator").
//! Grounded on
//! `original_source/backend/observations/conflicts.py::find_overlapping_observation`/
//! `should_update_observation` and
//! `original_source/backend/observations/constants.py` for the tolerance
//! and default-strategy constants.

use chrono::{DateTime, Utc};

use gs_core::{ConflictStrategy, ObservationStatus, ScheduledObservation};

/// `±PASS_OVERLAP_TOLERANCE_MINUTES` in the original constants module.
pub const PASS_OVERLAP_TOLERANCE_MINUTES: i64 = 5;

pub const DEFAULT_CONFLICT_STRATEGY: ConflictStrategy = ConflictStrategy::Priority;

/// A candidate pass about to become a [`ScheduledObservation`]; holds just
/// enough to run overlap/priority comparisons before the full observation
/// (with its session plans) is built.
#[derive(Debug, Clone)]
pub struct PassCandidate {
    pub norad_id: u32,
    pub monitored_satellite_id: Option<String>,
    pub event_start_utc: DateTime<Utc>,
    pub event_end_utc: DateTime<Utc>,
    pub peak_elevation_deg: f64,
}

/// Find an existing observation for the same satellite/monitor whose
/// window overlaps `candidate`'s within the tolerance band, mirroring the
/// original SQL `event_start <= search_end AND event_end >= search_start`
/// query as an in-memory scan.
pub fn find_overlapping_observation<'a>(
    existing: &'a [ScheduledObservation],
    candidate: &PassCandidate,
) -> Option<&'a ScheduledObservation> {
    let tolerance = chrono::Duration::minutes(PASS_OVERLAP_TOLERANCE_MINUTES);
    let search_start = candidate.event_start_utc - tolerance;
    let search_end = candidate.event_end_utc + tolerance;

    existing.iter().find(|obs| {
        matches!(obs.status, ObservationStatus::Scheduled | ObservationStatus::Running | ObservationStatus::Completed)
            && obs.norad_id == candidate.norad_id
            && obs.monitored_satellite_id == candidate.monitored_satellite_id
            && obs.event_start_utc <= search_end
            && obs.event_end_utc >= search_start
    })
}

/// Whether a conflicting existing observation should be replaced by the
/// new candidate. Only `cancelled`/`failed` observations are eligible;
/// anything live or already concluded is left alone.
pub fn should_update_observation(existing: &ScheduledObservation) -> bool {
    matches!(existing.status, ObservationStatus::Cancelled | ObservationStatus::Failed)
}

/// Outcome of resolving one candidate pass against an existing conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No conflicting observation exists (or `force` ignores it): schedule.
    Schedule,
    /// A conflict exists and the candidate loses (or strategy says skip).
    Skip,
    /// A conflict exists, is eligible for replacement, and the candidate
    /// wins on elevation: replace it.
    Replace,
}

/// Apply `strategy` to a pass candidate given whatever overlapping
/// observation (if any) [`find_overlapping_observation`] returned.
pub fn resolve(
    strategy: ConflictStrategy,
    candidate: &PassCandidate,
    overlapping: Option<&ScheduledObservation>,
) -> Resolution {
    let Some(existing) = overlapping else {
        return Resolution::Schedule;
    };

    match strategy {
        ConflictStrategy::Force => Resolution::Schedule,
        ConflictStrategy::Skip => Resolution::Skip,
        ConflictStrategy::Priority => {
            if should_update_observation(existing) {
                // Nothing live to protect: a cancelled/failed slot is free
                // to take regardless of elevation.
                return Resolution::Replace;
            }
            // existing is live (scheduled/running/completed): only bump it
            // when the candidate actually climbs higher (spec §4.7
            // scenario 5, "keep higher peak elevation").
            if candidate.peak_elevation_deg > existing.peak_elevation_deg {
                Resolution::Replace
            } else {
                Resolution::Skip
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::SessionPlan;

    fn observation(status: ObservationStatus, start: DateTime<Utc>, end: DateTime<Utc>, peak_elevation_deg: f64) -> ScheduledObservation {
        ScheduledObservation {
            id: "obs-1".to_string(),
            norad_id: 25544,
            monitored_satellite_id: Some("sat-1".to_string()),
            event_start_utc: start,
            event_end_utc: end,
            task_start_utc: start,
            task_end_utc: end,
            peak_elevation_deg,
            status,
            error_message: None,
            error_count: 0,
            actual_start_utc: None,
            actual_end_utc: None,
            sessions: Vec::<SessionPlan>::new(),
            generated_at: start,
        }
    }

    fn candidate_at(start: DateTime<Utc>, end: DateTime<Utc>, peak_elevation_deg: f64) -> PassCandidate {
        PassCandidate {
            norad_id: 25544,
            monitored_satellite_id: Some("sat-1".to_string()),
            event_start_utc: start,
            event_end_utc: end,
            peak_elevation_deg,
        }
    }

    #[test]
    fn no_overlap_when_windows_are_far_apart() {
        let start: DateTime<Utc> = "2026-07-27T10:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2026-07-27T10:10:00Z".parse().unwrap();
        let existing = vec![observation(ObservationStatus::Scheduled, start, end, 45.0)];

        let far_candidate = candidate_at(start + chrono::Duration::hours(2), end + chrono::Duration::hours(2), 45.0);
        assert!(find_overlapping_observation(&existing, &far_candidate).is_none());
    }

    #[test]
    fn overlap_within_tolerance_band_is_detected() {
        let start: DateTime<Utc> = "2026-07-27T10:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2026-07-27T10:10:00Z".parse().unwrap();
        let existing = vec![observation(ObservationStatus::Scheduled, start, end, 45.0)];

        // Starts 3 minutes after the existing pass ends, well inside ±5 min.
        let nearby = candidate_at(end + chrono::Duration::minutes(3), end + chrono::Duration::minutes(13), 45.0);
        assert!(find_overlapping_observation(&existing, &nearby).is_some());
    }

    #[test]
    fn cancelled_row_outside_status_filter_is_not_an_overlap() {
        let start: DateTime<Utc> = "2026-07-27T10:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2026-07-27T10:10:00Z".parse().unwrap();
        let existing = vec![observation(ObservationStatus::Cancelled, start, end, 45.0)];

        let candidate = candidate_at(start, end, 45.0);
        assert!(find_overlapping_observation(&existing, &candidate).is_none());
    }

    #[test]
    fn higher_elevation_existing_conflict_is_not_replaced_under_priority() {
        let start: DateTime<Utc> = "2026-07-27T10:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2026-07-27T10:10:00Z".parse().unwrap();
        let existing = observation(ObservationStatus::Scheduled, start, end, 60.0);
        let candidate = candidate_at(start, end, 30.0);

        assert_eq!(resolve(ConflictStrategy::Priority, &candidate, Some(&existing)), Resolution::Skip);
    }

    #[test]
    fn lower_elevation_existing_conflict_is_replaced_under_priority() {
        let start: DateTime<Utc> = "2026-07-27T10:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2026-07-27T10:10:00Z".parse().unwrap();
        let existing = observation(ObservationStatus::Scheduled, start, end, 30.0);
        let candidate = candidate_at(start, end, 60.0);

        assert_eq!(resolve(ConflictStrategy::Priority, &candidate, Some(&existing)), Resolution::Replace);
    }

    #[test]
    fn failed_conflict_is_replaced_under_priority() {
        let start: DateTime<Utc> = "2026-07-27T10:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2026-07-27T10:10:00Z".parse().unwrap();
        let existing = observation(ObservationStatus::Failed, start, end, 60.0);
        let candidate = candidate_at(start, end, 30.0);

        assert_eq!(resolve(ConflictStrategy::Priority, &candidate, Some(&existing)), Resolution::Replace);
    }

    #[test]
    fn force_strategy_always_schedules() {
        let start: DateTime<Utc> = "2026-07-27T10:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2026-07-27T10:10:00Z".parse().unwrap();
        let existing = observation(ObservationStatus::Running, start, end, 45.0);
        let candidate = candidate_at(start, end, 45.0);

        assert_eq!(resolve(ConflictStrategy::Force, &candidate, Some(&existing)), Resolution::Schedule);
    }

    #[test]
    fn skip_strategy_always_skips_a_conflict() {
        let start: DateTime<Utc> = "2026-07-27T10:00:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2026-07-27T10:10:00Z".parse().unwrap();
        let existing = observation(ObservationStatus::Scheduled, start, end, 45.0);
        let candidate = candidate_at(start, end, 45.0);

        assert_eq!(resolve(ConflictStrategy::Skip, &candidate, Some(&existing)), Resolution::Skip);
    }
}
