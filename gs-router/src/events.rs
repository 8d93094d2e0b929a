// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Event names and payload shapes for the client-facing event channel
//! (spec §6, verbatim event list). Grounded on
//! `trx-client/trx-frontend/trx-frontend-http/src/audio.rs`'s JSON-header
//! pattern: a tagged JSON frame precedes every binary frame, naming what
//! the bytes that follow mean.

use serde::Serialize;

use gs_core::{ScheduledObservation, SessionId, TrackingState, VfoNumber};

pub const EVENT_AUDIO_DATA: &str = "audio-data";
pub const EVENT_SDR_FFT_DATA: &str = "sdr-fft-data";
pub const EVENT_SATELLITE_TRACKING: &str = "satellite-tracking";
pub const EVENT_UI_TRACKER_STATE: &str = "ui-tracker-state";
pub const EVENT_SCHEDULED_OBSERVATIONS_CHANGED: &str = "scheduled-observations-changed";
pub const EVENT_OBSERVATION_STATUS_UPDATE: &str = "observation-status-update";
pub const EVENT_SESSION_RUNTIME_SNAPSHOT: &str = "session-runtime-snapshot";
pub const EVENT_SYSTEM_INFO: &str = "system-info";
pub const EVENT_FILE_BROWSER_STATE: &str = "file-browser-state";

/// A plain JSON event frame: `{"event": ..., "data": ...}`.
#[derive(Debug, Serialize)]
pub struct EventFrame<'a, T: Serialize> {
    pub event: &'a str,
    pub data: T,
}

/// The JSON header immediately preceding a binary `audio-data` frame (spec
/// §6 "binary payloads ... sent as separate binary WS frames immediately
/// preceded by a JSON header frame naming the session/vfo").
#[derive(Debug, Serialize)]
pub struct AudioDataHeader {
    pub event: &'static str,
    pub session_id: SessionId,
    pub vfo_number: VfoNumber,
    pub sample_rate_hz: u32,
    pub channels: u8,
    pub timestamp_ns: u64,
}

/// The JSON header immediately preceding a binary `sdr-fft-data` frame.
#[derive(Debug, Serialize)]
pub struct FftDataHeader {
    pub event: &'static str,
    pub sdr_id: String,
    pub fft_size: usize,
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    pub timestamp_ns: u64,
}

/// `satellite-tracking`: a live az/el/Doppler fix for one registered
/// satellite, computed by [`gs_tracker::SatellitePropagator`].
#[derive(Debug, Serialize)]
pub struct SatelliteTrackingPayload {
    pub norad_id: u32,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub subpoint_latitude_deg: f64,
    pub subpoint_longitude_deg: f64,
    pub subpoint_altitude_km: f64,
    pub range_rate_km_s: f64,
}

/// `ui-tracker-state`: the full [`TrackingState`] table (spec §3).
#[derive(Debug, Serialize)]
pub struct UiTrackerStatePayload {
    pub satellites: Vec<TrackingState>,
}

/// `scheduled-observations-changed`: the full observation table, pushed
/// whenever the generator or a client mutates it.
#[derive(Debug, Serialize)]
pub struct ScheduledObservationsChangedPayload {
    pub observations: Vec<ScheduledObservation>,
}

/// `observation-status-update`: one observation's status transitioned
/// (spec §8 invariant 5, the sweeper; spec §7(v), the executor).
#[derive(Debug, Serialize)]
pub struct ObservationStatusUpdatePayload {
    pub id: String,
    pub status: gs_core::ObservationStatus,
    pub error_message: Option<String>,
}

/// `system-info`: coarse server identity/health, analogous to the
/// teacher's rig status `pskreporter_status`-style one-line health strings.
#[derive(Debug, Serialize)]
pub struct SystemInfoPayload {
    pub server_version: String,
    pub uptime_seconds: u64,
    pub sdr_count: usize,
}

/// `file-browser-state`: a directory listing rooted at the server's
/// recordings directory, for the UI's recordings browser.
#[derive(Debug, Serialize)]
pub struct FileBrowserStatePayload {
    pub path: String,
    pub entries: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: u64,
}
