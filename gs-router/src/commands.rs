// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dispatch for the two command buses named in spec §6: `data_request`
//! (reads) and `data_submission` (writes), each `(cmd, data) ->
//! {success, data|error}`. Grounded on
//! `trx-client/trx-frontend/trx-frontend-http/src/api.rs`'s command
//! handlers (`toggle_power`, `set_freq`, ...), generalized from one HTTP
//! route per command to one `cmd` string per command over the same WS
//! connection, since the event router multiplexes everything onto a
//! single session instead of separate REST endpoints.

use std::fs;

use serde::Deserialize;
use serde_json::{json, Value};

use gs_core::{GsError, Modulation, ObservationStatus, ScheduledObservation, SdrConfig, SessionId, VfoNumber};
use gs_tracker::{SatellitePropagator, StationLocation};

use crate::events::{FileBrowserStatePayload, FileEntry, SystemInfoPayload, UiTrackerStatePayload};
use crate::state::{RegisteredSatellite, RigTrackingLink, SharedState};

fn bad_request(msg: impl Into<String>) -> String {
    msg.into()
}

/// `data_request` (reads): never mutates process/session/observation state.
pub async fn handle_data_request(state: &SharedState, cmd: &str, data: &Value) -> Result<Value, String> {
    match cmd {
        "system_info" => {
            let payload = SystemInfoPayload {
                server_version: state.server_version.clone(),
                uptime_seconds: state.uptime_seconds(),
                sdr_count: state.process_manager.snapshot().await.sdrs.len(),
            };
            Ok(serde_json::to_value(payload).expect("SystemInfoPayload always serializes"))
        }
        "session_runtime_snapshot" => {
            let snapshot = state.process_manager.snapshot().await;
            Ok(serde_json::to_value(snapshot).expect("RuntimeSnapshot always serializes"))
        }
        "scheduled_observations" => {
            let observations = state.observation_store.all().await;
            Ok(json!({ "observations": observations }))
        }
        "tracking_state" => {
            let satellites = state.tracking_registry.lock().await.all();
            let payload = UiTrackerStatePayload { satellites };
            Ok(serde_json::to_value(payload).expect("UiTrackerStatePayload always serializes"))
        }
        "file_browser" => {
            #[derive(Deserialize, Default)]
            struct Req {
                #[serde(default)]
                path: String,
            }
            let req: Req = serde_json::from_value(data.clone()).map_err(|e| bad_request(e.to_string()))?;
            list_recordings(state, &req.path)
        }
        other => Err(bad_request(format!("unknown data_request cmd: {other}"))),
    }
}

fn list_recordings(state: &SharedState, relative_path: &str) -> Result<Value, String> {
    let mut dir = state.recordings_dir.clone();
    if !relative_path.is_empty() {
        dir.push(relative_path);
    }
    let canonical_root = state.recordings_dir.canonicalize().map_err(|e| e.to_string())?;
    let canonical_dir = dir.canonicalize().map_err(|e| e.to_string())?;
    if !canonical_dir.starts_with(&canonical_root) {
        return Err(bad_request("path escapes the recordings directory"));
    }

    let mut entries = Vec::new();
    let read_dir = fs::read_dir(&canonical_dir).map_err(|e| e.to_string())?;
    for entry in read_dir {
        let entry = entry.map_err(|e| e.to_string())?;
        let metadata = entry.metadata().map_err(|e| e.to_string())?;
        entries.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            size_bytes: metadata.len(),
        });
    }
    let payload = FileBrowserStatePayload { path: relative_path.to_string(), entries };
    Ok(serde_json::to_value(payload).expect("FileBrowserStatePayload always serializes"))
}

/// `data_submission` (writes): mutates process/session/observation state.
pub async fn handle_data_submission(state: &SharedState, session: &SessionId, cmd: &str, data: &Value) -> Result<Value, String> {
    match cmd {
        "start_sdr" => {
            #[derive(Deserialize)]
            struct Req {
                config: SdrConfig,
            }
            let req: Req = serde_json::from_value(data.clone()).map_err(|e| bad_request(e.to_string()))?;
            state
                .process_manager
                .start_sdr(req.config, session.clone())
                .await
                .map_err(gs_error_message)?;
            Ok(json!({}))
        }
        "stop_sdr" => {
            #[derive(Deserialize)]
            struct Req {
                sdr_id: String,
            }
            let req: Req = serde_json::from_value(data.clone()).map_err(|e| bad_request(e.to_string()))?;
            state.process_manager.stop_sdr(&req.sdr_id, session).await;
            Ok(json!({}))
        }
        "start_demodulator" => {
            #[derive(Deserialize)]
            struct Req {
                sdr_id: String,
                vfo: VfoNumber,
                channel_if_hz: f64,
                modulation: Modulation,
                bandwidth_hz: u32,
                squelch: i16,
            }
            let req: Req = serde_json::from_value(data.clone()).map_err(|e| bad_request(e.to_string()))?;
            state
                .process_manager
                .start_demodulator(&req.sdr_id, session.clone(), req.vfo, req.channel_if_hz, req.modulation, req.bandwidth_hz, req.squelch)
                .await
                .map_err(gs_error_message)?;
            Ok(json!({}))
        }
        "stop_demodulator" => {
            #[derive(Deserialize)]
            struct Req {
                sdr_id: String,
                #[serde(default)]
                vfo: Option<VfoNumber>,
            }
            let req: Req = serde_json::from_value(data.clone()).map_err(|e| bad_request(e.to_string()))?;
            let ok = state.process_manager.stop_demodulator(&req.sdr_id, session, req.vfo).await;
            Ok(json!({ "stopped": ok }))
        }
        "set_vfo" => {
            #[derive(Deserialize)]
            struct Req {
                vfo: VfoNumber,
                #[serde(default)]
                active: Option<bool>,
                #[serde(default)]
                selected: Option<bool>,
                #[serde(default)]
                volume: Option<u8>,
                #[serde(default)]
                modulation: Option<Modulation>,
            }
            let req: Req = serde_json::from_value(data.clone()).map_err(|e| bad_request(e.to_string()))?;
            let default_modulation = req.modulation.unwrap_or(Modulation::Fm);
            state.vfo_manager.lock().await.set(
                session.clone(),
                req.vfo,
                |vfo_state| {
                    if let Some(active) = req.active {
                        vfo_state.active = active;
                    }
                    if let Some(selected) = req.selected {
                        vfo_state.selected = selected;
                    }
                    if let Some(volume) = req.volume {
                        vfo_state.volume = volume;
                    }
                    if let Some(modulation) = req.modulation {
                        vfo_state.modulation = modulation;
                    }
                },
                default_modulation,
            );
            Ok(json!({}))
        }
        "schedule_observation" => {
            #[derive(Deserialize)]
            struct Req {
                observation: ScheduledObservation,
            }
            let req: Req = serde_json::from_value(data.clone()).map_err(|e| bad_request(e.to_string()))?;
            gs_scheduler::validate_transmitter_frequencies(&req.observation.sessions)
                .map_err(|invalid| format!("{} transmitter frequencies out of range", invalid.len()))?;
            state.observation_store.put(req.observation.clone()).await;
            Ok(json!({ "id": req.observation.id }))
        }
        "cancel_observation" => {
            #[derive(Deserialize)]
            struct Req {
                id: String,
            }
            let req: Req = serde_json::from_value(data.clone()).map_err(|e| bad_request(e.to_string()))?;
            let Some(mut obs) = state.observation_store.get(&req.id).await else {
                return Err(bad_request("no such observation"));
            };
            obs.status = ObservationStatus::Cancelled;
            state.observation_store.put(obs).await;
            Ok(json!({}))
        }
        "register_satellite" => {
            #[derive(Deserialize)]
            struct RigLinkReq {
                session_id: String,
                vfo: VfoNumber,
                downlink_freq_hz: f64,
                modulation: Modulation,
                bandwidth_hz: u32,
            }
            #[derive(Deserialize)]
            struct Req {
                norad_id: u32,
                tle_line1: String,
                tle_line2: String,
                station: StationLocation,
                #[serde(default)]
                rig_link: Option<RigLinkReq>,
            }
            let req: Req = serde_json::from_value(data.clone()).map_err(|e| bad_request(e.to_string()))?;
            let propagator = SatellitePropagator::from_tle(None, &req.tle_line1, &req.tle_line2).map_err(gs_error_message)?;
            let rig_link = req.rig_link.map(|link| RigTrackingLink {
                session: SessionId::from(link.session_id),
                vfo: link.vfo,
                downlink_freq_hz: link.downlink_freq_hz,
                modulation: link.modulation,
                bandwidth_hz: link.bandwidth_hz,
            });
            state
                .tracked_satellites
                .lock()
                .await
                .insert(req.norad_id, RegisteredSatellite { propagator, station: req.station, rig_link });
            Ok(json!({}))
        }
        "unregister_satellite" => {
            #[derive(Deserialize)]
            struct Req {
                norad_id: u32,
            }
            let req: Req = serde_json::from_value(data.clone()).map_err(|e| bad_request(e.to_string()))?;
            state.tracked_satellites.lock().await.remove(&req.norad_id);
            Ok(json!({}))
        }
        other => Err(bad_request(format!("unknown data_submission cmd: {other}"))),
    }
}

fn gs_error_message(err: GsError) -> String {
    err.to_string()
}
