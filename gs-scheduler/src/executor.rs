// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Observation execution (spec §4.7 "Executor"): bring up an internal
//! session's SDR/demodulator/recorder/decoder stack at `task_start_utc`,
//! tear it all down at `task_end_utc` regardless of how the run went, and
//! drive `ObservationStatus` through
//! `scheduled → running → {completed, failed, cancelled, missed}`.
//! Grounded on `original_source/backend/observations/helpers.py`'s
//! `update_observation_status`/`remove_scheduled_stop_job` pair: a status
//! update plus a guaranteed, separately-tracked teardown job.

use gs_core::store::TrackingStateStore;
use gs_core::{GsError, Modulation, ObservationStatus, RigTrackState, RotatorState, ScheduledObservation, SessionId, Task, TrackingState};
use gs_session::{ProcessManager, VfoManager};
use gs_tracker::TrackingRegistry;
use tokio::sync::Mutex;
use tracing::warn;

/// How far past `task_end_utc` an observation can run before the sweeper
/// considers a still-`running` row abandoned and marks it `missed` instead
/// of `failed` (no teardown signal ever arrived).
pub const MISSED_GRACE_SECONDS: i64 = 120;

/// Default squelch and bandwidth applied to demodulators this executor
/// starts on a decoder/audio-recorder task's behalf, when no override says
/// otherwise. Matches `gs_dsp::Channel`'s own defaults for FM-family modes.
const DEFAULT_SQUELCH: i16 = -100;

fn decoder_type_modulation(decoder_type: &str) -> Modulation {
    match decoder_type {
        "cw" => Modulation::Cw,
        "afsk1200" | "ax25" => Modulation::Fm,
        _ => Modulation::Fm,
    }
}

/// Bring up every session/task in `observation` through `process_manager`,
/// associating everything with `session_id`. Best-effort: a failing task
/// is logged and skipped rather than aborting the whole observation,
/// matching the "continue into the other sessions" shape of the demod
/// manager's idempotent start calls.
pub async fn start_observation(
    process_manager: &ProcessManager,
    vfo_manager: &mut VfoManager,
    tracking_registry: &Mutex<TrackingRegistry>,
    tracking_state_store: &dyn TrackingStateStore,
    observation: &ScheduledObservation,
    session_id: SessionId,
) -> Result<(), GsError> {
    if let Some(monitored_satellite_id) = &observation.monitored_satellite_id {
        let mut state = TrackingState::new(observation.norad_id);
        state.group_id = Some(monitored_satellite_id.clone());
        state.rotator_state = RotatorState::Tracking;
        state.rig_state = RigTrackState::Tracking;
        tracking_registry.lock().await.upsert(observation.norad_id, state.clone());
        tracking_state_store.put(state).await;
    }

    for (session_index, session) in observation.sessions.iter().enumerate() {
        process_manager.start_sdr(session.sdr.clone(), session_id.clone()).await?;

        for task in &session.tasks {
            match task {
                Task::Recorder { .. } => {
                    let recording_path = recording_path_for(observation, session_index, "iq");
                    process_manager
                        .start_recorder(
                            &session.sdr.sdr_id,
                            session_id.clone(),
                            recording_path,
                            Some(observation.norad_id),
                            observation.monitored_satellite_id.clone(),
                        )
                        .await?;
                }
                Task::AudioRecorder { vfo } => {
                    let modulation = vfo_manager
                        .get(&session_id, *vfo)
                        .map(|s| s.modulation)
                        .unwrap_or(Modulation::Fm);
                    ensure_demodulator(process_manager, &session.sdr.sdr_id, session_id.clone(), *vfo, modulation).await;

                    let meta = gs_recorder::AudioRecorderMetadata {
                        vfo_number: *vfo,
                        demodulator_type: modulation,
                        center_frequency_hz: session.sdr.center_freq_hz,
                        vfo_frequency_hz: session.sdr.center_freq_hz,
                        session_id: session_id.clone(),
                        target_satellite_norad_id: Some(observation.norad_id),
                        target_satellite_name: observation.monitored_satellite_id.clone(),
                    };
                    let recording_path = recording_path_for(observation, session_index, &format!("vfo{vfo}"));
                    process_manager
                        .start_audio_recorder(&session.sdr.sdr_id, session_id.clone(), *vfo, recording_path, meta)
                        .await?;
                }
                Task::Decoder { decoder_type, vfo, .. } => {
                    let modulation = decoder_type_modulation(decoder_type);
                    ensure_demodulator(process_manager, &session.sdr.sdr_id, session_id.clone(), *vfo, modulation).await;

                    let decoder: Box<dyn gs_decode::Decoder> = match decoder_type.as_str() {
                        "cw" => Box::new(gs_decode::CwToneDecoder::new(gs_dsp::OUTPUT_SAMPLE_RATE_HZ)),
                        _ => Box::new(gs_decode::AfskAx25Decoder::new(gs_dsp::OUTPUT_SAMPLE_RATE_HZ)),
                    };
                    process_manager.start_decoder(&session.sdr.sdr_id, session_id.clone(), *vfo, decoder).await;
                }
            }
        }
    }
    Ok(())
}

async fn ensure_demodulator(
    process_manager: &ProcessManager,
    sdr_id: &str,
    session_id: SessionId,
    vfo: gs_core::VfoNumber,
    modulation: Modulation,
) {
    let bandwidth_hz = modulation.default_bandwidth_hz();
    if let Err(err) = process_manager
        .start_demodulator(sdr_id, session_id, vfo, 0.0, modulation, bandwidth_hz, DEFAULT_SQUELCH)
        .await
    {
        warn!(sdr_id, vfo, error = %err, "demodulator failed to start for scheduled task");
    }
}

fn recording_path_for(observation: &ScheduledObservation, session_index: usize, suffix: &str) -> String {
    format!("{}_{}_{}", observation.id, session_index, suffix)
}

/// Tear down every session this observation started, regardless of how the
/// run went. Always runs to completion: each `stop_*` call is a no-op on
/// anything already gone.
pub async fn stop_observation(
    process_manager: &ProcessManager,
    tracking_registry: &Mutex<TrackingRegistry>,
    tracking_state_store: &dyn TrackingStateStore,
    observation: &ScheduledObservation,
    session_id: &SessionId,
) {
    if observation.monitored_satellite_id.is_some() {
        let mut state = TrackingState::new(observation.norad_id);
        state.group_id = observation.monitored_satellite_id.clone();
        state.rotator_state = RotatorState::Stopped;
        state.rig_state = RigTrackState::Connected;
        tracking_registry.lock().await.upsert(observation.norad_id, state.clone());
        tracking_state_store.put(state).await;
    }

    for session in &observation.sessions {
        for task in &session.tasks {
            match task {
                Task::Recorder { .. } => {
                    process_manager.stop_recorder(&session.sdr.sdr_id, session_id).await;
                }
                Task::AudioRecorder { vfo } => {
                    process_manager.stop_audio_recorder(&session.sdr.sdr_id, session_id, *vfo).await;
                }
                Task::Decoder { vfo, .. } => {
                    process_manager.stop_decoder(&session.sdr.sdr_id, session_id, *vfo).await;
                }
            }
        }
        process_manager.stop_sdr(&session.sdr.sdr_id, session_id).await;
    }
}

/// Next status for a `running` observation whose `task_end_utc` has
/// already passed without an explicit completion/failure signal: `missed`
/// once the grace period elapses, otherwise left `running` a while longer.
pub fn sweep_overdue(observation: &ScheduledObservation, now: chrono::DateTime<chrono::Utc>) -> Option<ObservationStatus> {
    if observation.status != ObservationStatus::Running {
        return None;
    }
    let overdue_by = now - observation.task_end_utc;
    if overdue_by > chrono::Duration::seconds(MISSED_GRACE_SECONDS) {
        Some(ObservationStatus::Missed)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::{GainSetting, SdrConfig, SdrDriverKind, SessionPlan};

    fn observation(status: ObservationStatus, task_end_utc: chrono::DateTime<chrono::Utc>) -> ScheduledObservation {
        ScheduledObservation {
            id: "obs-1".to_string(),
            norad_id: 25544,
            monitored_satellite_id: None,
            event_start_utc: task_end_utc,
            event_end_utc: task_end_utc,
            task_start_utc: task_end_utc,
            task_end_utc,
            peak_elevation_deg: 45.0,
            status,
            error_message: None,
            error_count: 0,
            actual_start_utc: None,
            actual_end_utc: None,
            sessions: Vec::<SessionPlan>::new(),
            generated_at: task_end_utc,
        }
    }

    #[test]
    fn sweep_leaves_fresh_running_observation_alone() {
        let end: chrono::DateTime<chrono::Utc> = "2024-01-01T10:00:00Z".parse().unwrap();
        let obs = observation(ObservationStatus::Running, end);
        assert!(sweep_overdue(&obs, end + chrono::Duration::seconds(10)).is_none());
    }

    #[test]
    fn sweep_marks_long_overdue_running_observation_missed() {
        let end: chrono::DateTime<chrono::Utc> = "2024-01-01T10:00:00Z".parse().unwrap();
        let obs = observation(ObservationStatus::Running, end);
        let verdict = sweep_overdue(&obs, end + chrono::Duration::seconds(MISSED_GRACE_SECONDS + 1));
        assert_eq!(verdict, Some(ObservationStatus::Missed));
    }

    #[test]
    fn sweep_ignores_non_running_observations() {
        let end: chrono::DateTime<chrono::Utc> = "2024-01-01T10:00:00Z".parse().unwrap();
        let obs = observation(ObservationStatus::Completed, end);
        assert!(sweep_overdue(&obs, end + chrono::Duration::hours(1)).is_none());
    }

    #[test]
    fn start_sdr_config_is_reused_per_session() {
        let sdr = SdrConfig {
            sdr_id: "sdr0".to_string(),
            driver: SdrDriverKind::SigmfPlayback,
            host: None,
            port: None,
            serial: None,
            antenna: None,
            center_freq_hz: 145_800_000.0,
            sample_rate_hz: 48_000.0,
            gain: GainSetting::Agc,
            bias_t: false,
            ppm_error: None,
            fft_hint_size: 1024,
            recording_path: None,
            loop_playback: true,
            offset_freq: None,
        };
        let plan = SessionPlan { sdr: sdr.clone(), tasks: vec![Task::Recorder { vfo: None }] };
        assert_eq!(plan.sdr.sdr_id, sdr.sdr_id);
    }
}
