// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Process Manager (spec §4.8): owns the `{sdr_id → SDRRuntime}` table and
//! the lifecycle of every worker/demodulator/recorder/decoder hanging off
//! it. Grounded on
//! `original_source/backend/sdr/demodulatormanager.py::DemodulatorManager`
//! for the idempotent per-(sdr, session, vfo) start/stop shape, rebuilt
//! around async tasks and [`gs_broadcaster::Broadcaster`] instead of Python
//! threads and queues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use gs_broadcaster::Broadcaster;
use gs_core::{AudioMessage, IqMessage, Modulation, SdrConfig, SdrId, SessionId, VfoNumber};
use gs_decode::{DecodedFrame, Decoder};
use gs_dsp::Channel;
use gs_recorder::{AudioRecorder, AudioRecorderMetadata, IqRecorder};
use gs_sdr::SdrWorker;

/// Publish interval for the runtime snapshot (spec §4.8 "A runtime snapshot
/// ... is published every ~3 s").
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(3);

struct DemodRuntime {
    audio_broadcaster: Broadcaster<AudioMessage>,
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

struct RecorderRuntime {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

struct DecoderRuntime {
    frames_broadcaster: Broadcaster<DecodedFrame>,
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

struct SdrRuntime {
    worker: SdrWorker,
    iq_broadcaster: Broadcaster<IqMessage>,
    sample_rate_hz: f64,
    clients: std::collections::HashSet<SessionId>,
    demodulators: HashMap<SessionId, HashMap<VfoNumber, DemodRuntime>>,
    recorders: HashMap<SessionId, RecorderRuntime>,
    audio_recorders: HashMap<SessionId, HashMap<VfoNumber, RecorderRuntime>>,
    decoders: HashMap<SessionId, HashMap<VfoNumber, DecoderRuntime>>,
}

/// A point-in-time view of the process table, for the runtime snapshot
/// event (spec §4.8).
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSnapshot {
    pub sdrs: Vec<SdrSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SdrSnapshot {
    pub sdr_id: SdrId,
    pub client_count: usize,
    pub demodulator_count: usize,
    pub recorder_count: usize,
    pub decoder_count: usize,
}

/// Owns every SDR's worker/demodulator/recorder/decoder lifecycle (spec
/// §4.8). All operations are idempotent: starting something already running
/// is a no-op that returns `true`.
#[derive(Default)]
pub struct ProcessManager {
    sdrs: Mutex<HashMap<SdrId, SdrRuntime>>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or attach a client to an already-running) SDR worker.
    pub async fn start_sdr(&self, config: SdrConfig, session: SessionId) -> Result<(), gs_core::GsError> {
        let mut sdrs = self.sdrs.lock().await;
        if let Some(runtime) = sdrs.get_mut(&config.sdr_id) {
            runtime.clients.insert(session);
            return Ok(());
        }

        let (iq_broadcaster, iq_tx, _worker_task) = Broadcaster::<IqMessage>::spawn(
            format!("iq:{}", config.sdr_id),
            64,
        );
        let mut worker = SdrWorker::new(config.clone());
        worker.start(iq_tx)?;

        let mut clients = std::collections::HashSet::new();
        clients.insert(session);

        sdrs.insert(
            config.sdr_id.clone(),
            SdrRuntime {
                worker,
                iq_broadcaster,
                sample_rate_hz: config.sample_rate_hz,
                clients,
                demodulators: HashMap::new(),
                recorders: HashMap::new(),
                audio_recorders: HashMap::new(),
                decoders: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Detach a client; the worker and all of its consumers are torn down
    /// once the last client departs (spec §4.8 "terminates when its last
    /// client/observation departs").
    pub async fn stop_sdr(&self, sdr_id: &str, session: &SessionId) {
        let mut sdrs = self.sdrs.lock().await;
        let Some(runtime) = sdrs.get_mut(sdr_id) else {
            return;
        };
        runtime.clients.remove(session);
        if !runtime.clients.is_empty() {
            return;
        }

        let mut runtime = sdrs.remove(sdr_id).expect("just looked up");
        for (_, vfos) in runtime.demodulators.drain() {
            for (_, demod) in vfos {
                demod.stop.store(true, Ordering::SeqCst);
                demod.task.abort();
            }
        }
        for (_, recorder) in runtime.recorders.drain() {
            recorder.stop.store(true, Ordering::SeqCst);
            recorder.task.abort();
        }
        for (_, vfos) in runtime.audio_recorders.drain() {
            for (_, recorder) in vfos {
                recorder.stop.store(true, Ordering::SeqCst);
                recorder.task.abort();
            }
        }
        for (_, vfos) in runtime.decoders.drain() {
            for (_, decoder) in vfos {
                decoder.stop.store(true, Ordering::SeqCst);
                decoder.task.abort();
            }
        }
        runtime.worker.stop();
    }

    /// Start (or reconfigure) a demodulator for `(sdr_id, session, vfo)`
    /// (spec §4.8 `start_demodulator`). `channel_if_hz` is the VFO's offset
    /// from the SDR's center frequency, i.e. `vfo.center_freq - sdr.center_freq`
    /// (spec §4.4 step 1's NCO mixer input). Returns `GsError::configuration`
    /// and creates no subscriber when the resulting absolute VFO frequency
    /// falls outside the SDR's `[center - fs/2, center + fs/2]` Nyquist range
    /// (spec §8 Boundaries).
    pub async fn start_demodulator(
        &self,
        sdr_id: &str,
        session: SessionId,
        vfo: VfoNumber,
        channel_if_hz: f64,
        modulation: Modulation,
        bandwidth_hz: u32,
        squelch: i16,
    ) -> Result<(), gs_core::GsError> {
        let mut sdrs = self.sdrs.lock().await;
        let Some(runtime) = sdrs.get_mut(sdr_id) else {
            return Err(gs_core::GsError::configuration(format!("no such SDR: {sdr_id}")));
        };

        let center_freq_hz = runtime.worker.center_freq_hz();
        let half_span_hz = runtime.sample_rate_hz / 2.0;
        let vfo_freq_hz = center_freq_hz + channel_if_hz;
        let nyquist_range = (center_freq_hz - half_span_hz)..=(center_freq_hz + half_span_hz);
        if !nyquist_range.contains(&vfo_freq_hz) {
            return Err(gs_core::GsError::configuration(format!(
                "vfo frequency {vfo_freq_hz} outside SDR Nyquist range [{}, {}]",
                nyquist_range.start(),
                nyquist_range.end()
            )));
        }

        if let Some(existing) = runtime.demodulators.get(&session).and_then(|m| m.get(&vfo)) {
            let _ = existing;
            return Ok(());
        }

        let sub = runtime.iq_broadcaster.subscribe(format!("demod:{session}:{vfo}"), 32).await;
        let (audio_broadcaster, audio_tx, _audio_worker) =
            Broadcaster::<AudioMessage>::spawn(format!("audio:{sdr_id}:{session}:{vfo}"), 32);

        let stop = Arc::new(AtomicBool::new(false));
        let task_stop = stop.clone();
        let mut channel = Channel::new(
            channel_if_hz,
            modulation,
            bandwidth_hz,
            runtime.sample_rate_hz,
            gs_sdr::IQ_BLOCK_SIZE,
            squelch,
        );
        let session_for_task = session.clone();

        let mut receiver = sub.receiver;
        let task = tokio::spawn(async move {
            while !task_stop.load(Ordering::SeqCst) {
                let Some(iq) = receiver.recv().await else {
                    break;
                };
                let result = channel.process(&iq.samples);
                let vfo_snapshot = gs_core::VfoState::new(vfo, iq.center_freq_hz as i64, modulation);
                let msg = AudioMessage {
                    samples: Arc::from(result.samples.into_boxed_slice()),
                    sample_rate_hz: gs_dsp::OUTPUT_SAMPLE_RATE_HZ,
                    channels: result.channels,
                    vfo_snapshot,
                    session_id: session_for_task.clone(),
                    timestamp_ns: iq.timestamp_ns,
                };
                if audio_tx.send(msg).await.is_err() {
                    break;
                }
            }
        });

        runtime
            .demodulators
            .entry(session)
            .or_default()
            .insert(vfo, DemodRuntime { audio_broadcaster, stop, task });
        Ok(())
    }

    /// Stop one VFO's demodulator, or every VFO for the session when `vfo`
    /// is `None` (spec §4.8 `stop_demodulator`).
    pub async fn stop_demodulator(&self, sdr_id: &str, session: &SessionId, vfo: Option<VfoNumber>) -> bool {
        let mut sdrs = self.sdrs.lock().await;
        let Some(runtime) = sdrs.get_mut(sdr_id) else {
            return false;
        };
        let Some(vfos) = runtime.demodulators.get_mut(session) else {
            return false;
        };

        match vfo {
            Some(vfo_number) => {
                if let Some(demod) = vfos.remove(&vfo_number) {
                    demod.stop.store(true, Ordering::SeqCst);
                    demod.task.abort();
                }
            }
            None => {
                for (_, demod) in vfos.drain() {
                    demod.stop.store(true, Ordering::SeqCst);
                    demod.task.abort();
                }
            }
        }
        if vfos.is_empty() {
            runtime.demodulators.remove(session);
        }
        true
    }

    /// Start a whole-SDR IQ recorder for `session` (spec §4.8
    /// `start_recorder`, Task::Recorder). Idempotent per session.
    pub async fn start_recorder(
        &self,
        sdr_id: &str,
        session: SessionId,
        recording_path: String,
        target_satellite_norad_id: Option<u32>,
        target_satellite_name: Option<String>,
    ) -> Result<bool, gs_core::GsError> {
        let mut sdrs = self.sdrs.lock().await;
        let Some(runtime) = sdrs.get_mut(sdr_id) else {
            return Ok(false);
        };
        if runtime.recorders.contains_key(&session) {
            return Ok(true);
        }

        let sub = runtime.iq_broadcaster.subscribe(format!("recorder:{session}"), 64).await;
        let mut recorder = IqRecorder::create(
            &recording_path,
            runtime.sample_rate_hz,
            runtime.worker.center_freq_hz(),
            target_satellite_norad_id,
            target_satellite_name,
        )?;

        let stop = Arc::new(AtomicBool::new(false));
        let task_stop = stop.clone();
        let mut receiver = sub.receiver;
        let task = tokio::spawn(async move {
            while !task_stop.load(Ordering::SeqCst) {
                let Some(iq) = receiver.recv().await else {
                    break;
                };
                if let Err(err) = recorder.write_chunk(&iq.samples) {
                    tracing::warn!(error = %err, "failed to write IQ recording chunk");
                    break;
                }
            }
            if let Err(err) = recorder.finalize() {
                tracing::warn!(error = %err, "failed to finalize IQ recording");
            }
        });

        runtime.recorders.insert(session, RecorderRuntime { stop, task });
        Ok(true)
    }

    pub async fn stop_recorder(&self, sdr_id: &str, session: &SessionId) -> bool {
        let mut sdrs = self.sdrs.lock().await;
        let Some(runtime) = sdrs.get_mut(sdr_id) else {
            return false;
        };
        let Some(recorder) = runtime.recorders.remove(session) else {
            return false;
        };
        recorder.stop.store(true, Ordering::SeqCst);
        recorder.task.abort();
        true
    }

    /// Start a per-VFO demodulated-audio recorder (spec §4.8
    /// `start_audio_recorder`/`stop_audio_recorder`, `Task::AudioRecorder`).
    /// Like [`Self::start_decoder`], this requires the VFO's demodulator to
    /// already be running.
    pub async fn start_audio_recorder(
        &self,
        sdr_id: &str,
        session: SessionId,
        vfo: VfoNumber,
        recording_path: String,
        meta: AudioRecorderMetadata,
    ) -> Result<bool, gs_core::GsError> {
        let mut sdrs = self.sdrs.lock().await;
        let Some(runtime) = sdrs.get_mut(sdr_id) else {
            return Ok(false);
        };
        if runtime.audio_recorders.get(&session).and_then(|m| m.get(&vfo)).is_some() {
            return Ok(true);
        }
        let Some(demod) = runtime.demodulators.get(&session).and_then(|m| m.get(&vfo)) else {
            return Ok(false);
        };

        let sub = demod.audio_broadcaster.subscribe(format!("audio-recorder:{session}:{vfo}"), 32).await;
        let mut recorder = AudioRecorder::create(&recording_path, gs_dsp::OUTPUT_SAMPLE_RATE_HZ, meta)?;

        let stop = Arc::new(AtomicBool::new(false));
        let task_stop = stop.clone();
        let mut receiver = sub.receiver;
        let task = tokio::spawn(async move {
            while !task_stop.load(Ordering::SeqCst) {
                let Some(audio) = receiver.recv().await else {
                    break;
                };
                if let Err(err) = recorder.write_samples(&audio.samples) {
                    tracing::warn!(error = %err, "failed to write audio recording chunk");
                    break;
                }
            }
            if let Err(err) = recorder.finalize() {
                tracing::warn!(error = %err, "failed to finalize audio recording");
            }
        });

        runtime.audio_recorders.entry(session).or_default().insert(vfo, RecorderRuntime { stop, task });
        Ok(true)
    }

    pub async fn stop_audio_recorder(&self, sdr_id: &str, session: &SessionId, vfo: VfoNumber) -> bool {
        let mut sdrs = self.sdrs.lock().await;
        let Some(runtime) = sdrs.get_mut(sdr_id) else {
            return false;
        };
        let Some(vfos) = runtime.audio_recorders.get_mut(session) else {
            return false;
        };
        let Some(recorder) = vfos.remove(&vfo) else {
            return false;
        };
        recorder.stop.store(true, Ordering::SeqCst);
        recorder.task.abort();
        if vfos.is_empty() {
            runtime.audio_recorders.remove(session);
        }
        true
    }

    /// Attach `decoder` to an already-running `(sdr_id, session, vfo)`
    /// demodulator's audio stream (spec §4.5/§4.8 `start_decoder`). Fails if
    /// that demodulator isn't running yet, since decoders consume its
    /// audio output.
    pub async fn start_decoder(
        &self,
        sdr_id: &str,
        session: SessionId,
        vfo: VfoNumber,
        mut decoder: Box<dyn Decoder>,
    ) -> bool {
        let mut sdrs = self.sdrs.lock().await;
        let Some(runtime) = sdrs.get_mut(sdr_id) else {
            return false;
        };
        if runtime.decoders.get(&session).and_then(|m| m.get(&vfo)).is_some() {
            return true;
        }
        let Some(demod) = runtime.demodulators.get(&session).and_then(|m| m.get(&vfo)) else {
            return false;
        };

        let sub = demod
            .audio_broadcaster
            .subscribe(format!("decoder:{session}:{vfo}"), 32)
            .await;
        let (frames_broadcaster, frames_tx, _frames_worker) =
            Broadcaster::<DecodedFrame>::spawn(format!("frames:{sdr_id}:{session}:{vfo}"), 32);

        let stop = Arc::new(AtomicBool::new(false));
        let task_stop = stop.clone();
        let mut receiver = sub.receiver;
        let task = tokio::spawn(async move {
            while !task_stop.load(Ordering::SeqCst) {
                let Some(audio) = receiver.recv().await else {
                    break;
                };
                for frame in decoder.feed_audio(&audio.samples) {
                    if frames_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            }
        });

        runtime
            .decoders
            .entry(session)
            .or_default()
            .insert(vfo, DecoderRuntime { frames_broadcaster, stop, task });
        true
    }

    pub async fn stop_decoder(&self, sdr_id: &str, session: &SessionId, vfo: VfoNumber) -> bool {
        let mut sdrs = self.sdrs.lock().await;
        let Some(runtime) = sdrs.get_mut(sdr_id) else {
            return false;
        };
        let Some(vfos) = runtime.decoders.get_mut(session) else {
            return false;
        };
        let Some(decoder) = vfos.remove(&vfo) else {
            return false;
        };
        decoder.stop.store(true, Ordering::SeqCst);
        decoder.task.abort();
        if vfos.is_empty() {
            runtime.decoders.remove(session);
        }
        true
    }

    /// Subscribe to one decoder's `frames_out` port, for the event router
    /// to forward as `decoded-frame` events (spec §4.5).
    pub async fn subscribe_decoder_frames(
        &self,
        sdr_id: &str,
        session: &SessionId,
        vfo: VfoNumber,
        subscriber_name: impl Into<String>,
    ) -> Option<gs_broadcaster::SubscriberHandle<DecodedFrame>> {
        let sdrs = self.sdrs.lock().await;
        let decoder = sdrs.get(sdr_id)?.decoders.get(session)?.get(&vfo)?;
        Some(decoder.frames_broadcaster.subscribe(subscriber_name, 32).await)
    }

    /// Subscribe to an SDR's raw IQ broadcaster, for the event router's FFT
    /// task to turn into `sdr-fft-data` waterfall rows (spec §4.3).
    pub async fn subscribe_iq(
        &self,
        sdr_id: &str,
        subscriber_name: impl Into<String>,
    ) -> Option<gs_broadcaster::SubscriberHandle<IqMessage>> {
        let sdrs = self.sdrs.lock().await;
        Some(sdrs.get(sdr_id)?.iq_broadcaster.subscribe(subscriber_name, 16).await)
    }

    /// The FFT size hint configured for this SDR, for a client that doesn't
    /// request its own.
    pub async fn fft_hint_size(&self, sdr_id: &str) -> Option<usize> {
        let sdrs = self.sdrs.lock().await;
        Some(sdrs.get(sdr_id)?.worker.fft_hint_size())
    }

    /// Subscribe to one VFO's demodulated audio, for the event router to
    /// forward as `audio-data` events (spec §4.6).
    pub async fn subscribe_audio(
        &self,
        sdr_id: &str,
        session: &SessionId,
        vfo: VfoNumber,
        subscriber_name: impl Into<String>,
    ) -> Option<gs_broadcaster::SubscriberHandle<AudioMessage>> {
        let sdrs = self.sdrs.lock().await;
        let demod = sdrs.get(sdr_id)?.demodulators.get(session)?.get(&vfo)?;
        Some(demod.audio_broadcaster.subscribe(subscriber_name, 32).await)
    }

    pub async fn snapshot(&self) -> RuntimeSnapshot {
        let sdrs = self.sdrs.lock().await;
        RuntimeSnapshot {
            sdrs: sdrs
                .iter()
                .map(|(sdr_id, runtime)| SdrSnapshot {
                    sdr_id: sdr_id.clone(),
                    client_count: runtime.clients.len(),
                    demodulator_count: runtime.demodulators.values().map(|m| m.len()).sum(),
                    recorder_count: runtime.recorders.len() + runtime.audio_recorders.values().map(|m| m.len()).sum::<usize>(),
                    decoder_count: runtime.decoders.values().map(|m| m.len()).sum(),
                })
                .collect(),
        }
    }

    pub async fn is_sdr_running(&self, sdr_id: &str) -> bool {
        self.sdrs.lock().await.contains_key(sdr_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::{GainSetting, SdrDriverKind};

    fn test_config(sdr_id: &str) -> SdrConfig {
        SdrConfig {
            sdr_id: sdr_id.to_string(),
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
        }
    }

    #[tokio::test]
    async fn starting_unconfigurable_sdr_fails() {
        let pm = ProcessManager::new();
        let session = SessionId("s1".to_string());
        // sigmf-playback with no recording_path fails fast (spec §4.2).
        let err = pm.start_sdr(test_config("sdr0"), session).await;
        assert!(err.is_err());
        assert!(!pm.is_sdr_running("sdr0").await);
    }

    #[tokio::test]
    async fn stop_sdr_on_unknown_id_is_a_noop() {
        let pm = ProcessManager::new();
        pm.stop_sdr("nope", &SessionId("s1".to_string())).await;
    }

    #[tokio::test]
    async fn snapshot_on_empty_manager_is_empty() {
        let pm = ProcessManager::new();
        let snap = pm.snapshot().await;
        assert!(snap.sdrs.is_empty());
    }

    #[tokio::test]
    async fn stop_demodulator_on_unknown_sdr_returns_false() {
        let pm = ProcessManager::new();
        let ok = pm.stop_demodulator("nope", &SessionId("s1".to_string()), None).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn start_recorder_on_unknown_sdr_returns_false() {
        let pm = ProcessManager::new();
        let started = pm
            .start_recorder("nope", SessionId("s1".to_string()), "/tmp/whatever".to_string(), None, None)
            .await
            .unwrap();
        assert!(!started);
    }

    #[tokio::test]
    async fn start_audio_recorder_without_a_running_demodulator_returns_false() {
        let pm = ProcessManager::new();
        let meta = gs_recorder::AudioRecorderMetadata {
            vfo_number: 1,
            demodulator_type: gs_core::Modulation::Fm,
            center_frequency_hz: 145_800_000.0,
            vfo_frequency_hz: 145_825_000.0,
            session_id: SessionId("s1".to_string()),
            target_satellite_norad_id: None,
            target_satellite_name: None,
        };
        let started = pm
            .start_audio_recorder("nope", SessionId("s1".to_string()), 1, "/tmp/whatever".to_string(), meta)
            .await
            .unwrap();
        assert!(!started);
    }

    #[tokio::test]
    async fn stop_audio_recorder_on_unknown_sdr_returns_false() {
        let pm = ProcessManager::new();
        let ok = pm.stop_audio_recorder("nope", &SessionId("s1".to_string()), 1).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn start_decoder_without_a_running_demodulator_returns_false() {
        let pm = ProcessManager::new();
        let decoder: Box<dyn gs_decode::Decoder> = Box::new(gs_decode::CwToneDecoder::new(48_000));
        let started = pm.start_decoder("nope", SessionId("s1".to_string()), 1, decoder).await;
        assert!(!started);
    }

    #[tokio::test]
    async fn stop_decoder_on_unknown_sdr_returns_false() {
        let pm = ProcessManager::new();
        let ok = pm.stop_decoder("nope", &SessionId("s1".to_string()), 1).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn subscribe_iq_on_unknown_sdr_returns_none() {
        let pm = ProcessManager::new();
        assert!(pm.subscribe_iq("nope", "fft:s1").await.is_none());
    }

    #[tokio::test]
    async fn fft_hint_size_on_unknown_sdr_returns_none() {
        let pm = ProcessManager::new();
        assert!(pm.fft_hint_size("nope").await.is_none());
    }
}
