// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Polls each satellite's [`TrackingState`] and reacts when it changes
//! (spec §3 "the tracker polls it and reacts on change"). Grounded on
//! `original_source/backend/statetracker.py::StateTracker`: a value plus
//! a list of on-change callbacks, generalized from Python's "any value"
//! to the concrete `TrackingState` this tracker owns.

use std::collections::HashMap;

use gs_core::{RigTrackState, RotatorState, TrackingState};

/// Tracks one [`TrackingState`] row and notifies observers only when a
/// call to [`Self::update`] actually changes it, mirroring
/// `StateTracker.update_state`'s change-gated callback firing.
pub struct TrackedSlot {
    state: TrackingState,
}

impl TrackedSlot {
    pub fn new(state: TrackingState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// Replace the state; returns the previous state iff something
    /// actually changed (by `PartialEq` on the relevant fields).
    pub fn update(&mut self, new_state: TrackingState) -> Option<TrackingState> {
        if states_equal(&self.state, &new_state) {
            return None;
        }
        Some(std::mem::replace(&mut self.state, new_state))
    }
}

fn states_equal(a: &TrackingState, b: &TrackingState) -> bool {
    a.norad_id == b.norad_id
        && a.group_id == b.group_id
        && a.rotator_state == b.rotator_state
        && a.rig_state == b.rig_state
        && a.rotator_id == b.rotator_id
        && a.rig_id == b.rig_id
        && a.transmitter_id == b.transmitter_id
        && a.rig_vfo == b.rig_vfo
        && a.vfo1 == b.vfo1
        && a.vfo2 == b.vfo2
}

/// A batch of `TrackingState` rows keyed by NORAD ID, one per satellite
/// under active tracking.
#[derive(Default)]
pub struct TrackingRegistry {
    slots: HashMap<u32, TrackedSlot>,
}

impl TrackingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, norad_id: u32, new_state: TrackingState) -> Option<TrackingState> {
        match self.slots.get_mut(&norad_id) {
            Some(slot) => slot.update(new_state),
            None => {
                self.slots.insert(norad_id, TrackedSlot::new(new_state));
                None
            }
        }
    }

    pub fn get(&self, norad_id: u32) -> Option<&TrackingState> {
        self.slots.get(&norad_id).map(|slot| slot.state())
    }

    pub fn remove(&mut self, norad_id: u32) -> Option<TrackingState> {
        self.slots.remove(&norad_id).map(|slot| slot.state)
    }

    /// A snapshot of every tracked row, for the `ui-tracker-state` event.
    pub fn all(&self) -> Vec<TrackingState> {
        self.slots.values().map(|slot| slot.state().clone()).collect()
    }

    /// NORAD IDs whose `rig_state` is currently `tracking`, i.e. ones the
    /// poller should keep pushing Doppler updates for.
    pub fn actively_tracking(&self) -> Vec<u32> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.state.rig_state == RigTrackState::Tracking)
            .map(|(norad_id, _)| *norad_id)
            .collect()
    }

    pub fn rotators_parked(&self) -> usize {
        self.slots.values().filter(|slot| slot.state.rotator_state == RotatorState::Parked).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_upsert_returns_no_previous_state() {
        let mut registry = TrackingRegistry::new();
        assert!(registry.upsert(25544, TrackingState::new(25544)).is_none());
    }

    #[test]
    fn identical_update_reports_no_change() {
        let mut registry = TrackingRegistry::new();
        registry.upsert(25544, TrackingState::new(25544));
        let previous = registry.upsert(25544, TrackingState::new(25544));
        assert!(previous.is_none());
    }

    #[test]
    fn state_transition_is_reported_and_applied() {
        let mut registry = TrackingRegistry::new();
        registry.upsert(25544, TrackingState::new(25544));

        let mut tracking = TrackingState::new(25544);
        tracking.rig_state = RigTrackState::Tracking;
        let previous = registry.upsert(25544, tracking);

        assert!(previous.is_some());
        assert_eq!(registry.get(25544).unwrap().rig_state, RigTrackState::Tracking);
        assert_eq!(registry.actively_tracking(), vec![25544]);
    }

    #[test]
    fn remove_drops_the_slot() {
        let mut registry = TrackingRegistry::new();
        registry.upsert(25544, TrackingState::new(25544));
        assert!(registry.remove(25544).is_some());
        assert!(registry.get(25544).is_none());
    }
}
