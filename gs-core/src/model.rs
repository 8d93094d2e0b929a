// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Core data model shared by every pipeline component (spec §3).

use std::sync::Arc;

use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Complex baseband sample, single precision.
pub type Complex32 = Complex<f32>;

/// Stable identifier for an SDR device.
pub type SdrId = String;

/// A VFO slot number within one SDR, 1-indexed.
pub type VfoNumber = u8;

/// A session identifier. User sessions are opaque strings created on
/// external connect; internal sessions use the `internal:<observation-id>[:<key>]`
/// form (spec §3 "Session").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn internal(observation_id: &str) -> Self {
        Self(format!("internal:{observation_id}"))
    }

    pub fn internal_keyed(observation_id: &str, key: &str) -> Self {
        Self(format!("internal:{observation_id}:{key}"))
    }

    pub fn is_internal(&self) -> bool {
        self.0.starts_with("internal:")
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One IQ chunk produced by an SDR Worker (spec §3 "IQ Message").
///
/// `samples` is reference-counted so the Broadcaster can fan it out to every
/// subscriber without a deep copy (spec §4.1, §9 "Deep-copy fan-out").
#[derive(Debug, Clone)]
pub struct IqMessage {
    pub samples: Arc<[Complex32]>,
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    pub timestamp_ns: u64,
    pub seq: u64,
    /// Set by the SDR Worker immediately after a retune/rate change so
    /// downstream averagers (FFT) can discard stale history (spec §4.2/§4.3).
    pub reset_averager: bool,
}

/// Demodulated audio chunk (spec §3 "Audio Message").
///
/// For stereo, samples are interleaved L,R,L,R,... `samples` is
/// reference-counted for the same reason as [`IqMessage::samples`]: audio
/// messages are small enough that the original spec source deep-copies per
/// subscriber, but the teacher's pattern is to avoid copies for anything
/// that can be shared read-only after publish (spec §9).
#[derive(Debug, Clone)]
pub struct AudioMessage {
    pub samples: Arc<[f32]>,
    pub sample_rate_hz: u32,
    pub channels: u8,
    pub vfo_snapshot: VfoState,
    pub session_id: SessionId,
    pub timestamp_ns: u64,
}

/// Demodulation mode of a VFO (spec §3 "VFOState").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modulation {
    Fm,
    Wfm,
    Am,
    Usb,
    Lsb,
    Cw,
}

impl Modulation {
    /// Default one-sided audio bandwidth for this mode, grounded on the
    /// teacher's `default_bandwidth_for_mode` (dsp/channel.rs).
    pub fn default_bandwidth_hz(self) -> u32 {
        match self {
            Modulation::Usb | Modulation::Lsb => 3_000,
            Modulation::Cw => 500,
            Modulation::Am => 9_000,
            Modulation::Fm => 12_500,
            Modulation::Wfm => 180_000,
        }
    }
}

/// Per-session, per-VFO receiver state (spec §3 "VFOState").
///
/// Invariants enforced by the VFO manager, not by this struct alone:
/// (i) at most one VFO per session has `selected = true`;
/// (ii) active+selected (or active alone) emits live audio;
/// (iii) selected but not active emits silence of the same length;
/// (iv) neither active nor selected emits no audio frames at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VfoState {
    pub vfo_number: VfoNumber,
    pub center_freq_hz: i64,
    pub bandwidth_hz: u32,
    pub modulation: Modulation,
    pub active: bool,
    pub selected: bool,
    pub volume: u8,
    pub squelch: i16,
}

impl VfoState {
    pub fn new(vfo_number: VfoNumber, center_freq_hz: i64, modulation: Modulation) -> Self {
        Self {
            vfo_number,
            center_freq_hz,
            bandwidth_hz: modulation.default_bandwidth_hz(),
            modulation,
            active: false,
            selected: false,
            volume: 80,
            squelch: i16::MIN,
        }
    }

    /// Selecting a VFO implies it becomes active (spec §3 invariant ii).
    pub fn select(&mut self) {
        self.selected = true;
        self.active = true;
    }
}

/// Origin of a [`Session`] (spec §3 and §4.6 "Internal vs user sessions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOrigin {
    User,
    Internal,
}

/// A logical client stream (spec §3 "Session").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub origin: SessionOrigin,
    pub sdr_id: Option<SdrId>,
    pub rig_id: Option<String>,
    pub selected_vfo: Option<VfoNumber>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Session {
    pub fn new_user(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            origin: SessionOrigin::User,
            sdr_id: None,
            rig_id: None,
            selected_vfo: None,
            user_agent: None,
            metadata: None,
        }
    }

    pub fn new_internal(observation_id: &str) -> Self {
        Self {
            session_id: SessionId::internal(observation_id),
            origin: SessionOrigin::Internal,
            sdr_id: None,
            rig_id: None,
            selected_vfo: None,
            user_agent: None,
            metadata: None,
        }
    }
}

/// Typed subscriber identity (spec §9 "Subscription key format": promote the
/// source's stringly-typed `demod:{session}:vfo{n}` keys to an enum).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriberId {
    Demod {
        session: SessionId,
        vfo: VfoNumber,
    },
    Recorder {
        session: SessionId,
    },
    AudioRecorder {
        session: SessionId,
        vfo: VfoNumber,
    },
    Decoder {
        session: SessionId,
        vfo: VfoNumber,
        kind: String,
    },
    Fft {
        session: SessionId,
    },
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriberId::Demod { session, vfo } => write!(f, "demod:{session}:vfo{vfo}"),
            SubscriberId::Recorder { session } => write!(f, "recorder:{session}"),
            SubscriberId::AudioRecorder { session, vfo } => {
                write!(f, "audio_recorder:{session}:vfo{vfo}")
            }
            SubscriberId::Decoder { session, vfo, kind } => {
                write!(f, "decoder:{kind}:{session}:vfo{vfo}")
            }
            SubscriberId::Fft { session } => write!(f, "fft:{session}"),
        }
    }
}

/// Per-subscriber delivery counters (spec §3 "Subscriber").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriberStats {
    pub name: String,
    pub capacity: usize,
    pub delivered: u64,
    pub dropped: u64,
    pub errors: u64,
}

/// Aggregate Broadcaster statistics (spec §4.1 "stats()").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcasterStats {
    pub received: u64,
    pub broadcast: u64,
    pub errors: u64,
    pub subscribers: Vec<SubscriberStats>,
}

/// Rotator state machine (spec §3 "TrackingState").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotatorState {
    Disconnected,
    Connected,
    Tracking,
    Stopped,
    Parked,
}

/// Rig (receiver) state machine (spec §3 "TrackingState").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RigTrackState {
    Disconnected,
    Connected,
    Tuning,
    Tracking,
}

/// Persisted per-pass tracking row (spec §3 "TrackingState"); the tracker
/// polls this and reacts on change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingState {
    pub norad_id: u32,
    pub group_id: Option<String>,
    pub rotator_state: RotatorState,
    pub rig_state: RigTrackState,
    pub rotator_id: Option<String>,
    pub rig_id: Option<String>,
    pub transmitter_id: Option<String>,
    pub rig_vfo: Option<VfoNumber>,
    pub vfo1: Option<i64>,
    pub vfo2: Option<i64>,
}

impl TrackingState {
    pub fn new(norad_id: u32) -> Self {
        Self {
            norad_id,
            group_id: None,
            rotator_state: RotatorState::Disconnected,
            rig_state: RigTrackState::Disconnected,
            rotator_id: None,
            rig_id: None,
            transmitter_id: None,
            rig_vfo: None,
            vfo1: None,
            vfo2: None,
        }
    }
}

/// Status of a [`ScheduledObservation`] (spec §4.7 "States").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationStatus {
    Scheduled,
    Running,
    Completed,
    Cancelled,
    Failed,
    Missed,
}

/// Conflict resolution strategy for overlapping passes (spec §4.7 "Generator").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    Priority,
    Skip,
    Force,
}

/// SDR acquisition configuration (spec §4.2 "Contract").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdrConfig {
    pub sdr_id: SdrId,
    pub driver: SdrDriverKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub serial: Option<String>,
    pub antenna: Option<String>,
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    pub gain: GainSetting,
    pub bias_t: bool,
    pub ppm_error: Option<f64>,
    pub fft_hint_size: usize,
    pub recording_path: Option<String>,
    pub loop_playback: bool,
    pub offset_freq: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SdrDriverKind {
    Rtlsdr,
    SoapyLocal,
    SoapyRemote,
    SigmfPlayback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GainSetting {
    Agc,
    Manual(f64),
}

/// One decoder/recorder task within a [`SessionPlan`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Task {
    Decoder {
        decoder_type: String,
        vfo: VfoNumber,
        overrides: Option<serde_json::Map<String, serde_json::Value>>,
    },
    Recorder {
        vfo: Option<VfoNumber>,
    },
    AudioRecorder {
        vfo: VfoNumber,
    },
}

/// Plan for one internal session within a [`ScheduledObservation`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPlan {
    pub sdr: SdrConfig,
    pub tasks: Vec<Task>,
}

/// A generated or executed pass (spec §3 "ScheduledObservation").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledObservation {
    pub id: String,
    pub norad_id: u32,
    pub monitored_satellite_id: Option<String>,
    pub event_start_utc: chrono::DateTime<chrono::Utc>,
    pub event_end_utc: chrono::DateTime<chrono::Utc>,
    pub task_start_utc: chrono::DateTime<chrono::Utc>,
    pub task_end_utc: chrono::DateTime<chrono::Utc>,
    /// Highest elevation reached during the pass this observation was
    /// generated from, for `Priority` conflict resolution (spec §4.7
    /// scenario 5, "keep higher peak elevation"). Defaults to `0.0` for a
    /// client-submitted ad-hoc observation that names no pass of its own.
    #[serde(default)]
    pub peak_elevation_deg: f64,
    pub status: ObservationStatus,
    pub error_message: Option<String>,
    pub error_count: u32,
    pub actual_start_utc: Option<chrono::DateTime<chrono::Utc>>,
    pub actual_end_utc: Option<chrono::DateTime<chrono::Utc>>,
    pub sessions: Vec<SessionPlan>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_implies_active() {
        let mut vfo = VfoState::new(1, 100_000_000, Modulation::Fm);
        assert!(!vfo.active);
        vfo.select();
        assert!(vfo.active);
        assert!(vfo.selected);
    }

    #[test]
    fn internal_session_id_is_isolated() {
        let sid = SessionId::internal_keyed("obs-42", "vfo1");
        assert_eq!(sid.0, "internal:obs-42:vfo1");
        assert!(sid.is_internal());
        assert!(!SessionId::from("user-abc").is_internal());
    }

    #[test]
    fn subscriber_id_format_matches_legacy_key_shape() {
        let id = SubscriberId::Demod {
            session: SessionId::from("sess1"),
            vfo: 2,
        };
        assert_eq!(id.to_string(), "demod:sess1:vfo2");
    }
}
