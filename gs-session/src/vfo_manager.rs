// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! VFO / Session Manager (spec §4.6). Grounded on
//! `original_source/backend/sdr/demodulatormanager.py`'s per-(session,vfo)
//! table shape, reworked from a thread-registry into a pure state table
//! plus an audio-message transform, since ownership of the demodulator
//! threads themselves belongs to [`crate::process_manager`].

use std::collections::HashMap;

use gs_core::{AudioMessage, Modulation, SessionId, VfoNumber, VfoState};

/// Payload emitted to a session's private room in the event router (spec
/// §4.6 step (v)).
#[derive(Debug, Clone)]
pub struct AudioRoomPayload {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
    pub channels: u8,
    pub vfo_snapshot: VfoState,
    pub session_id: SessionId,
}

/// Volume scaling factor applied to active VFOs (spec §4.6 step iii).
const ACTIVE_GAIN: f32 = 1.5;

/// Keeps the per-(session, vfo) state table and turns raw `AudioMessage`s
/// from demodulators into room-ready payloads (or drops/mutes them).
#[derive(Default)]
pub struct VfoManager {
    vfos: HashMap<(SessionId, VfoNumber), VfoState>,
}

impl VfoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session: &SessionId, vfo: VfoNumber) -> Option<&VfoState> {
        self.vfos.get(&(session.clone(), vfo))
    }

    /// Insert or replace the given fields on a VFO, creating it with
    /// defaults for `modulation` if it does not exist yet (spec §4.6 `set`).
    pub fn set(&mut self, session: SessionId, vfo: VfoNumber, update: impl FnOnce(&mut VfoState), default_modulation: Modulation) {
        let state = self
            .vfos
            .entry((session, vfo))
            .or_insert_with(|| VfoState::new(vfo, 0, default_modulation));
        update(state);
    }

    pub fn get_selected(&self, session: &SessionId) -> Option<&VfoState> {
        self.vfos
            .iter()
            .filter(|((s, _), _)| s == session)
            .map(|(_, state)| state)
            .find(|state| state.selected)
    }

    /// Drop a VFO's state, e.g. on session teardown.
    pub fn remove(&mut self, session: &SessionId, vfo: VfoNumber) {
        self.vfos.remove(&(session.clone(), vfo));
    }

    pub fn remove_session(&mut self, session: &SessionId) {
        self.vfos.retain(|(s, _), _| s != session);
    }

    /// Transform a demodulator's `AudioMessage` per spec §4.6 steps (i)-(v).
    /// Returns `None` when the chunk should be dropped entirely (neither
    /// active nor selected).
    pub fn handle_audio_message(&self, msg: &AudioMessage) -> Option<AudioRoomPayload> {
        let key = (msg.session_id.clone(), msg.vfo_snapshot.vfo_number);
        let state = self.vfos.get(&key)?;

        if !state.active && !state.selected {
            return None;
        }

        let samples = if state.active {
            let gain = (state.volume as f32 / 100.0) * ACTIVE_GAIN;
            msg.samples.iter().map(|s| s * gain).collect()
        } else {
            // Selected but not active: substitute zeros of the same length
            // (spec §4.6 step iv).
            vec![0.0; msg.samples.len()]
        };

        Some(AudioRoomPayload {
            samples,
            sample_rate_hz: msg.sample_rate_hz,
            channels: msg.channels,
            vfo_snapshot: state.clone(),
            session_id: msg.session_id.clone(),
        })
    }

    /// Apply a Doppler-corrected frequency/mode update from the tracker
    /// (spec §4.6 `apply_tracking_update`). `entering_tracking` distinguishes
    /// a transition into `rig_state=tracking` (which also activates the
    /// VFO) from an in-flight frequency update (frequency/mode only).
    pub fn apply_tracking_update(
        &mut self,
        session: SessionId,
        vfo: VfoNumber,
        rig_freq_hz: i64,
        mode: Modulation,
        bandwidth_hz: u32,
        entering_tracking: bool,
    ) {
        let offset = mode_offset_hz(mode, bandwidth_hz);
        self.set(session, vfo, |state| {
            state.center_freq_hz = rig_freq_hz + offset;
            state.modulation = mode;
            state.bandwidth_hz = bandwidth_hz;
            if entering_tracking {
                state.active = true;
            }
        }, mode);
    }
}

/// Mode-specific center offset table (spec §4.6: USB/CW → `+bandwidth/2`,
/// LSB → `-bandwidth/2`, others → `0`).
fn mode_offset_hz(mode: Modulation, bandwidth_hz: u32) -> i64 {
    match mode {
        Modulation::Usb | Modulation::Cw => bandwidth_hz as i64 / 2,
        Modulation::Lsb => -(bandwidth_hz as i64) / 2,
        Modulation::Fm | Modulation::Wfm | Modulation::Am => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> SessionId {
        SessionId(id.to_string())
    }

    #[test]
    fn audio_for_unknown_vfo_is_dropped() {
        let manager = VfoManager::new();
        let msg = AudioMessage {
            samples: std::sync::Arc::from(vec![1.0_f32, 2.0].into_boxed_slice()),
            sample_rate_hz: 44_100,
            channels: 1,
            vfo_snapshot: VfoState::new(1, 145_800_000, Modulation::Fm),
            session_id: session("s1"),
            timestamp_ns: 0,
        };
        assert!(manager.handle_audio_message(&msg).is_none());
    }

    #[test]
    fn inactive_unselected_vfo_drops_audio() {
        let mut manager = VfoManager::new();
        manager.set(session("s1"), 1, |_| {}, Modulation::Fm);
        let msg = AudioMessage {
            samples: std::sync::Arc::from(vec![1.0_f32; 4].into_boxed_slice()),
            sample_rate_hz: 44_100,
            channels: 1,
            vfo_snapshot: VfoState::new(1, 145_800_000, Modulation::Fm),
            session_id: session("s1"),
            timestamp_ns: 0,
        };
        assert!(manager.handle_audio_message(&msg).is_none());
    }

    #[test]
    fn active_vfo_scales_volume() {
        let mut manager = VfoManager::new();
        manager.set(
            session("s1"),
            1,
            |state| {
                state.active = true;
                state.volume = 100;
            },
            Modulation::Fm,
        );
        let msg = AudioMessage {
            samples: std::sync::Arc::from(vec![1.0_f32; 4].into_boxed_slice()),
            sample_rate_hz: 44_100,
            channels: 1,
            vfo_snapshot: VfoState::new(1, 145_800_000, Modulation::Fm),
            session_id: session("s1"),
            timestamp_ns: 0,
        };
        let payload = manager.handle_audio_message(&msg).unwrap();
        assert!((payload.samples[0] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn selected_but_not_active_substitutes_zeros() {
        let mut manager = VfoManager::new();
        manager.set(session("s1"), 1, |state| state.selected = true, Modulation::Fm);
        let msg = AudioMessage {
            samples: std::sync::Arc::from(vec![5.0_f32; 4].into_boxed_slice()),
            sample_rate_hz: 44_100,
            channels: 1,
            vfo_snapshot: VfoState::new(1, 145_800_000, Modulation::Fm),
            session_id: session("s1"),
            timestamp_ns: 0,
        };
        let payload = manager.handle_audio_message(&msg).unwrap();
        assert!(payload.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn usb_offset_is_positive_half_bandwidth() {
        let mut manager = VfoManager::new();
        manager.apply_tracking_update(session("s1"), 1, 145_800_000, Modulation::Usb, 3_000, true);
        let state = manager.get(&session("s1"), 1).unwrap();
        assert_eq!(state.center_freq_hz, 145_800_000 + 1_500);
        assert!(state.active);
    }

    #[test]
    fn lsb_offset_is_negative_half_bandwidth() {
        let mut manager = VfoManager::new();
        manager.apply_tracking_update(session("s1"), 1, 145_800_000, Modulation::Lsb, 3_000, false);
        let state = manager.get(&session("s1"), 1).unwrap();
        assert_eq!(state.center_freq_hz, 145_800_000 - 1_500);
        assert!(!state.active);
    }

    #[test]
    fn get_selected_finds_the_selected_vfo() {
        let mut manager = VfoManager::new();
        manager.set(session("s1"), 1, |_| {}, Modulation::Fm);
        manager.set(session("s1"), 2, |state| state.selected = true, Modulation::Fm);
        let selected = manager.get_selected(&session("s1")).unwrap();
        assert_eq!(selected.vfo_number, 2);
    }
}
