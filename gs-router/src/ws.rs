// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The single `/events` WebSocket endpoint every client session connects
//! through (spec §6). Grounded on
//! `trx-client/trx-frontend/trx-frontend-http/src/audio.rs`'s
//! `actix_ws::handle` + `tokio::select!` multiplexing of several async
//! sources into one `actix_ws::Session` writer, generalized from one
//! binary stream to the full tagged event set plus the two command buses.

use std::collections::HashMap;
use std::time::Duration;

use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_ws::Message;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::interval;
use tracing::warn;

use gs_broadcaster::SubscriberHandle;
use gs_core::{AudioMessage, IqMessage, SessionId, VfoNumber};
use gs_dsp::{FftOverlap, FftProcessor, FftProcessorConfig, FftWindow};
use gs_session::SNAPSHOT_INTERVAL;

use crate::commands::{handle_data_request, handle_data_submission};
use crate::events::{
    AudioDataHeader, EventFrame, FftDataHeader, SatelliteTrackingPayload, SystemInfoPayload, UiTrackerStatePayload, EVENT_AUDIO_DATA,
    EVENT_OBSERVATION_STATUS_UPDATE, EVENT_SATELLITE_TRACKING, EVENT_SCHEDULED_OBSERVATIONS_CHANGED, EVENT_SDR_FFT_DATA,
    EVENT_SESSION_RUNTIME_SNAPSHOT, EVENT_SYSTEM_INFO, EVENT_UI_TRACKER_STATE,
};
use crate::state::SharedState;

const UI_TRACKER_STATE_INTERVAL: Duration = Duration::from_secs(2);
const SATELLITE_TRACKING_INTERVAL: Duration = Duration::from_secs(1);
const SCHEDULED_OBSERVATIONS_INTERVAL: Duration = Duration::from_secs(5);
const SYSTEM_INFO_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct SessionQuery {
    session: String,
}

/// One WS frame from the client: a command on one of the two buses (spec
/// §6), or a subscription request for one of the binary streams.
#[derive(Deserialize)]
#[serde(tag = "bus", rename_all = "snake_case")]
enum ClientFrame {
    DataRequest {
        cmd: String,
        #[serde(default)]
        data: Value,
        #[serde(default)]
        request_id: Option<String>,
    },
    DataSubmission {
        cmd: String,
        #[serde(default)]
        data: Value,
        #[serde(default)]
        request_id: Option<String>,
    },
}

#[derive(serde::Serialize)]
struct CommandReply<'a> {
    bus: &'a str,
    request_id: Option<String>,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[get("/events")]
pub async fn events_ws(req: HttpRequest, body: web::Payload, state: web::Data<SharedState>) -> Result<HttpResponse, Error> {
    let query = web::Query::<SessionQuery>::from_query(req.query_string()).map_err(actix_web::error::ErrorBadRequest)?;
    let session_id = SessionId(query.session.clone());

    let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let state = state.into_inner();

    actix_web::rt::spawn(async move {
        let mut audio_sub: Option<(VfoNumber, SubscriberHandle<AudioMessage>)> = None;
        let mut fft_sub: Option<(String, SubscriberHandle<IqMessage>, FftProcessor)> = None;
        let mut last_observation_statuses: HashMap<String, gs_core::ObservationStatus> = HashMap::new();

        let mut runtime_snapshot_ticker = interval(SNAPSHOT_INTERVAL);
        let mut ui_tracker_state_ticker = interval(UI_TRACKER_STATE_INTERVAL);
        let mut satellite_tracking_ticker = interval(SATELLITE_TRACKING_INTERVAL);
        let mut scheduled_observations_ticker = interval(SCHEDULED_OBSERVATIONS_INTERVAL);
        let mut system_info_ticker = interval(SYSTEM_INFO_INTERVAL);

        loop {
            tokio::select! {
                _ = runtime_snapshot_ticker.tick() => {
                    let snapshot = state.process_manager.snapshot().await;
                    if send_json(&mut session, EVENT_SESSION_RUNTIME_SNAPSHOT, &snapshot).await.is_err() {
                        break;
                    }
                }
                _ = ui_tracker_state_ticker.tick() => {
                    let satellites = state.tracking_registry.lock().await.all();
                    let payload = UiTrackerStatePayload { satellites };
                    if send_json(&mut session, EVENT_UI_TRACKER_STATE, &payload).await.is_err() {
                        break;
                    }
                }
                _ = satellite_tracking_ticker.tick() => {
                    if broadcast_satellite_tracking(&state, &mut session).await.is_err() {
                        break;
                    }
                }
                _ = scheduled_observations_ticker.tick() => {
                    let observations = state.observation_store.all().await;
                    if broadcast_observation_status_updates(&mut session, &observations, &mut last_observation_statuses).await.is_err() {
                        break;
                    }
                    if send_json(&mut session, EVENT_SCHEDULED_OBSERVATIONS_CHANGED, &serde_json::json!({ "observations": observations })).await.is_err() {
                        break;
                    }
                }
                _ = system_info_ticker.tick() => {
                    let payload = SystemInfoPayload {
                        server_version: state.server_version.clone(),
                        uptime_seconds: state.uptime_seconds(),
                        sdr_count: state.process_manager.snapshot().await.sdrs.len(),
                    };
                    if send_json(&mut session, EVENT_SYSTEM_INFO, &payload).await.is_err() {
                        break;
                    }
                }
                audio = recv_audio(&mut audio_sub) => {
                    match audio {
                        Some(msg) => {
                            let payload = state.vfo_manager.lock().await.handle_audio_message(&msg);
                            let Some(payload) = payload else { continue };
                            if send_audio(&mut session, &session_id, payload).await.is_err() {
                                break;
                            }
                        }
                        None => audio_sub = None,
                    }
                }
                fft_row = recv_fft(&mut fft_sub) => {
                    match fft_row {
                        Some((sdr_id, row)) => {
                            if send_fft(&mut session, &sdr_id, row).await.is_err() {
                                break;
                            }
                        }
                        None => fft_sub = None,
                    }
                }
                msg = msg_stream.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if handle_client_text(&state, &session_id, &text, &mut session, &mut audio_sub, &mut fft_sub).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => break,
                    }
                }
            }
        }

        state.vfo_manager.lock().await.remove_session(&session_id);
        let _ = session.close(None).await;
    });

    Ok(response)
}

async fn recv_audio(sub: &mut Option<(VfoNumber, SubscriberHandle<AudioMessage>)>) -> Option<AudioMessage> {
    match sub {
        Some((_, handle)) => handle.receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_fft(sub: &mut Option<(String, SubscriberHandle<IqMessage>, FftProcessor)>) -> Option<(String, gs_dsp::WaterfallRow)> {
    match sub {
        Some((sdr_id, handle, processor)) => loop {
            let Some(iq) = handle.receiver.recv().await else {
                return None;
            };
            let rows = processor.process(&iq);
            if let Some(row) = rows.into_iter().next() {
                return Some((sdr_id.clone(), row));
            }
        },
        None => std::future::pending().await,
    }
}

async fn send_json<T: serde::Serialize>(session: &mut actix_ws::Session, event: &str, data: &T) -> Result<(), ()> {
    let frame = EventFrame { event, data };
    let text = serde_json::to_string(&frame).map_err(|_| ())?;
    session.text(text).await.map_err(|_| ())
}

async fn send_audio(session: &mut actix_ws::Session, session_id: &SessionId, payload: gs_session::AudioRoomPayload) -> Result<(), ()> {
    let header = AudioDataHeader {
        event: EVENT_AUDIO_DATA,
        session_id: session_id.clone(),
        vfo_number: payload.vfo_snapshot.vfo_number,
        sample_rate_hz: payload.sample_rate_hz,
        channels: payload.channels,
        timestamp_ns: 0,
    };
    let header_text = serde_json::to_string(&header).map_err(|_| ())?;
    session.text(header_text).await.map_err(|_| ())?;
    let bytes: Vec<u8> = payload.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    session.binary(bytes).await.map_err(|_| ())
}

async fn send_fft(session: &mut actix_ws::Session, sdr_id: &str, row: gs_dsp::WaterfallRow) -> Result<(), ()> {
    let header = FftDataHeader {
        event: EVENT_SDR_FFT_DATA,
        sdr_id: sdr_id.to_string(),
        fft_size: row.power_db.len(),
        center_freq_hz: row.center_freq_hz,
        sample_rate_hz: row.sample_rate_hz,
        timestamp_ns: row.timestamp_ns,
    };
    let header_text = serde_json::to_string(&header).map_err(|_| ())?;
    session.text(header_text).await.map_err(|_| ())?;
    let bytes: Vec<u8> = row.power_db.iter().flat_map(|v| v.to_le_bytes()).collect();
    session.binary(bytes).await.map_err(|_| ())
}

async fn broadcast_satellite_tracking(state: &SharedState, session: &mut actix_ws::Session) -> Result<(), ()> {
    let satellites = state.tracked_satellites.lock().await;
    for (norad_id, registered) in satellites.iter() {
        let now = chrono::Utc::now();
        let Ok(point) = registered.propagator.track(registered.station, now) else {
            continue;
        };
        let payload = SatelliteTrackingPayload {
            norad_id: *norad_id,
            azimuth_deg: point.azimuth_deg,
            elevation_deg: point.elevation_deg,
            range_km: point.range_km,
            subpoint_latitude_deg: point.subpoint_latitude_deg,
            subpoint_longitude_deg: point.subpoint_longitude_deg,
            subpoint_altitude_km: point.subpoint_altitude_km,
            range_rate_km_s: point.range_rate_km_s,
        };
        send_json(session, EVENT_SATELLITE_TRACKING, &payload).await?;
    }
    Ok(())
}

async fn handle_client_text(
    state: &SharedState,
    session_id: &SessionId,
    text: &str,
    session: &mut actix_ws::Session,
    audio_sub: &mut Option<(VfoNumber, SubscriberHandle<AudioMessage>)>,
    fft_sub: &mut Option<(String, SubscriberHandle<IqMessage>, FftProcessor)>,
) -> Result<(), ()> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(error = %err, "malformed client frame");
            return Ok(());
        }
    };

    match frame {
        ClientFrame::DataRequest { cmd, data, request_id } => {
            let result = handle_data_request(state, &cmd, &data).await;
            reply(session, "data_request", request_id, result).await
        }
        ClientFrame::DataSubmission { cmd, data, request_id } => {
            let result = handle_subscription_or_submission(state, session_id, &cmd, &data, audio_sub, fft_sub).await;
            reply(session, "data_submission", request_id, result).await
        }
    }
}

async fn handle_subscription_or_submission(
    state: &SharedState,
    session_id: &SessionId,
    cmd: &str,
    data: &Value,
    audio_sub: &mut Option<(VfoNumber, SubscriberHandle<AudioMessage>)>,
    fft_sub: &mut Option<(String, SubscriberHandle<IqMessage>, FftProcessor)>,
) -> Result<Value, String> {
    #[derive(Deserialize)]
    struct SdrReq {
        sdr_id: String,
    }
    #[derive(Deserialize)]
    struct VfoReq {
        sdr_id: String,
        vfo: VfoNumber,
    }

    match cmd {
        "subscribe_audio" => {
            let req: VfoReq = serde_json::from_value(data.clone()).map_err(|e| e.to_string())?;
            let name = format!("router-audio:{}:{}:{}", req.sdr_id, session_id.0, req.vfo);
            let handle = state
                .process_manager
                .subscribe_audio(&req.sdr_id, session_id, req.vfo, name)
                .await
                .ok_or_else(|| "no running demodulator for that VFO".to_string())?;
            *audio_sub = Some((req.vfo, handle));
            Ok(serde_json::json!({}))
        }
        "unsubscribe_audio" => {
            *audio_sub = None;
            Ok(serde_json::json!({}))
        }
        "subscribe_fft" => {
            let req: SdrReq = serde_json::from_value(data.clone()).map_err(|e| e.to_string())?;
            let name = format!("router-fft:{}:{}", req.sdr_id, session_id.0);
            let handle = state
                .process_manager
                .subscribe_iq(&req.sdr_id, name)
                .await
                .ok_or_else(|| "no such SDR running".to_string())?;
            let fft_size = state.process_manager.fft_hint_size(&req.sdr_id).await.unwrap_or(1024);
            let processor = FftProcessor::new(FftProcessorConfig { fft_size, window: FftWindow::Hanning, averaging: 1, overlap: FftOverlap::None });
            *fft_sub = Some((req.sdr_id, handle, processor));
            Ok(serde_json::json!({}))
        }
        "unsubscribe_fft" => {
            *fft_sub = None;
            Ok(serde_json::json!({}))
        }
        other => handle_data_submission(state, session_id, other, data).await,
    }
}

async fn reply(session: &mut actix_ws::Session, bus: &'static str, request_id: Option<String>, result: Result<Value, String>) -> Result<(), ()> {
    let reply = match result {
        Ok(data) => CommandReply { bus, request_id, success: true, data: Some(data), error: None },
        Err(error) => CommandReply { bus, request_id, success: false, data: None, error: Some(error) },
    };
    let text = serde_json::to_string(&reply).map_err(|_| ())?;
    session.text(text).await.map_err(|_| ())
}

/// Emit one `observation-status-update` per row whose status changed since
/// the last `scheduled-observations-changed` tick (spec §7(v), §8 invariant
/// 5), so a client notices a transition immediately instead of having to
/// diff two full-table snapshots itself. `last` is this connection's own
/// view of prior statuses and is updated in place.
async fn broadcast_observation_status_updates(
    session: &mut actix_ws::Session,
    observations: &[gs_core::ScheduledObservation],
    last: &mut HashMap<String, gs_core::ObservationStatus>,
) -> Result<(), ()> {
    for obs in observations {
        if last.get(&obs.id) != Some(&obs.status) {
            let payload = crate::events::ObservationStatusUpdatePayload {
                id: obs.id.clone(),
                status: obs.status,
                error_message: obs.error_message.clone(),
            };
            send_json(session, EVENT_OBSERVATION_STATUS_UPDATE, &payload).await?;
            last.insert(obs.id.clone(), obs.status);
        }
    }
    Ok(())
}
