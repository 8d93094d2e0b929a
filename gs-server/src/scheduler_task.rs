// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The scheduler/executor background loops (spec §4.7). Grounded on
//! `trx-server/src/main.rs`'s `tokio::select! { work => {}, _ =
//! wait_for_shutdown(rx) => {} }` task-spawning idiom, applied to two
//! periodic loops instead of one long-lived connection task.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use gs_core::{ConflictStrategy, ObservationStatus, SessionId};
use gs_router::SharedState;
use gs_scheduler::{find_passes, generate_observations, sweep_overdue, MISSED_GRACE_SECONDS};

const EXECUTOR_TICK: Duration = Duration::from_secs(5);
const GENERATOR_LOOKAHEAD_HOURS: i64 = 24;
const MIN_ELEVATION_DEG: f64 = 10.0;

pub async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    if *shutdown_rx.borrow() {
        return;
    }
    while shutdown_rx.changed().await.is_ok() {
        if *shutdown_rx.borrow() {
            break;
        }
    }
}

/// Regenerates pass windows for every registered satellite into
/// `ScheduledObservation`s, on `regenerate_interval`. No per-satellite
/// session template is modeled yet (TLE/satellite source management is an
/// external collaborator per spec §1), so generated observations carry an
/// empty `sessions` list until a client schedules one with tasks attached
/// via the `schedule_observation` command.
pub async fn run_generator_loop(state: SharedState, regenerate_interval: Duration, conflict_strategy: ConflictStrategy) {
    let mut ticker = tokio::time::interval(regenerate_interval);
    loop {
        ticker.tick().await;
        let now = Utc::now();
        let satellites = state.tracked_satellites.lock().await;
        let existing = state.observation_store.all().await;

        for (norad_id, registered) in satellites.iter() {
            let passes = match find_passes(&registered.propagator, registered.station, now, chrono::Duration::hours(GENERATOR_LOOKAHEAD_HOURS), MIN_ELEVATION_DEG) {
                Ok(passes) => passes,
                Err(err) => {
                    warn!(norad_id, error = %err, "pass generation failed");
                    continue;
                }
            };

            let (accepted, superseded) = generate_observations(&passes, None, &[], &existing, conflict_strategy, now, |pass| {
                format!("{}-{}", pass.norad_id, pass.event_start_utc.timestamp())
            });

            for id in superseded {
                state.observation_store.delete(&id).await;
            }
            for obs in accepted {
                info!(norad_id, id = %obs.id, "scheduled observation generated");
                state.observation_store.put(obs).await;
            }
        }
    }
}

/// Starts due observations and tears down/finalizes finished ones (spec
/// §4.7 "Executor", §8 invariant 5 the sweeper). Runs every
/// [`EXECUTOR_TICK`].
pub async fn run_executor_loop(state: SharedState, start_lead: Duration) {
    let mut ticker = tokio::time::interval(EXECUTOR_TICK);
    loop {
        ticker.tick().await;
        let now = Utc::now();
        let observations = state.observation_store.all().await;

        for obs in observations {
            match obs.status {
                ObservationStatus::Scheduled if due_to_start(&obs.task_start_utc, now, start_lead) => {
                    start_due_observation(&state, obs).await;
                }
                ObservationStatus::Running if obs.task_end_utc <= now => {
                    finish_running_observation(&state, obs).await;
                }
                ObservationStatus::Running => {
                    if let Some(status) = sweep_overdue(&obs, now) {
                        warn!(id = %obs.id, grace_secs = MISSED_GRACE_SECONDS, "observation abandoned past grace period");
                        let mut obs = obs;
                        obs.status = status;
                        state.observation_store.put(obs).await;
                    }
                }
                _ => {}
            }
        }
    }
}

fn due_to_start(task_start_utc: &DateTime<Utc>, now: DateTime<Utc>, lead: Duration) -> bool {
    *task_start_utc - chrono::Duration::from_std(lead).unwrap_or_default() <= now
}

async fn start_due_observation(state: &SharedState, mut obs: gs_core::ScheduledObservation) {
    if let Err(invalid) = gs_scheduler::validate_transmitter_frequencies(&obs.sessions) {
        warn!(id = %obs.id, count = invalid.len(), "observation transmitter frequencies out of range, failing");
        obs.status = ObservationStatus::Failed;
        obs.error_message = Some(format!("{} transmitter frequencies out of range", invalid.len()));
        obs.error_count += 1;
        state.observation_store.put(obs).await;
        return;
    }

    let session_id = SessionId::internal(&obs.id);
    let mut vfo_manager = state.vfo_manager.lock().await;
    match gs_scheduler::executor::start_observation(
        &state.process_manager,
        &mut vfo_manager,
        &state.tracking_registry,
        state.tracking_state_store.as_ref(),
        &obs,
        session_id.clone(),
    )
    .await
    {
        Ok(()) => {
            info!(id = %obs.id, "observation started");
            obs.status = ObservationStatus::Running;
            obs.actual_start_utc = Some(Utc::now());
        }
        Err(err) => {
            error!(id = %obs.id, error = %err, "observation failed to start");
            obs.status = ObservationStatus::Failed;
            obs.error_message = Some(err.to_string());
            obs.error_count += 1;
        }
    }
    state.observation_store.put(obs).await;
}

async fn finish_running_observation(state: &SharedState, mut obs: gs_core::ScheduledObservation) {
    let session_id = SessionId::internal(&obs.id);
    gs_scheduler::executor::stop_observation(
        &state.process_manager,
        &state.tracking_registry,
        state.tracking_state_store.as_ref(),
        &obs,
        &session_id,
    )
    .await;
    info!(id = %obs.id, "observation completed");
    obs.status = ObservationStatus::Completed;
    obs.actual_end_utc = Some(Utc::now());
    state.observation_store.put(obs).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_to_start_true_once_lead_window_is_reached() {
        let task_start: DateTime<Utc> = "2024-01-01T10:00:00Z".parse().unwrap();
        let lead = Duration::from_secs(10);
        assert!(!due_to_start(&task_start, task_start - chrono::Duration::seconds(20), lead));
        assert!(due_to_start(&task_start, task_start - chrono::Duration::seconds(5), lead));
        assert!(due_to_start(&task_start, task_start, lead));
    }
}
