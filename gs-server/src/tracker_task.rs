// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Periodic tracker → VFO Doppler pipeline (spec §4.6 "called when the
//! tracker publishes Doppler-corrected frequency", spec §2 "tracker
//! updates (Doppler) into concrete component lifecycle transitions").
//! On every tick, recomputes each registered satellite's [`TrackPoint`],
//! writes the resulting [`TrackingState`] into the shared
//! [`gs_tracker::TrackingRegistry`], and for any satellite with a
//! [`RigTrackingLink`] above the horizon, pushes the Doppler-shifted
//! downlink frequency into [`VfoManager::apply_tracking_update`].
//! Grounded on `gs-server/src/scheduler_task.rs`'s
//! `tokio::time::interval` + per-tick-scan loop shape.

use std::time::Duration;

use tracing::warn;

use gs_core::{RigTrackState, RotatorState, TrackingState};
use gs_router::SharedState;

pub async fn run_tracker_loop(state: SharedState, poll_interval: Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        let now = chrono::Utc::now();
        let satellites = state.tracked_satellites.lock().await;

        for (norad_id, registered) in satellites.iter() {
            let point = match registered.propagator.track(registered.station, now) {
                Ok(point) => point,
                Err(err) => {
                    warn!(norad_id, error = %err, "tracker propagation failed");
                    continue;
                }
            };
            let above_horizon = point.is_above_horizon();

            let mut new_state = TrackingState::new(*norad_id);
            if let Some(link) = &registered.rig_link {
                new_state.rig_vfo = Some(link.vfo);
                new_state.vfo1 = Some(link.downlink_freq_hz.round() as i64);
                new_state.rig_state = if above_horizon { RigTrackState::Tracking } else { RigTrackState::Connected };
                new_state.rotator_state = if above_horizon { RotatorState::Tracking } else { RotatorState::Parked };
            }

            let previous = state.tracking_registry.lock().await.upsert(*norad_id, new_state.clone());
            state.tracking_state_store.put(new_state.clone()).await;

            if !above_horizon {
                continue;
            }
            let Some(link) = &registered.rig_link else { continue };

            let entering_tracking = previous.map(|p| p.rig_state != RigTrackState::Tracking).unwrap_or(true);
            let rig_freq_hz = point.doppler_shifted_freq_hz(link.downlink_freq_hz).round() as i64;

            state
                .vfo_manager
                .lock()
                .await
                .apply_tracking_update(link.session.clone(), link.vfo, rig_freq_hz, link.modulation, link.bandwidth_hz, entering_tracking);
        }
    }
}
