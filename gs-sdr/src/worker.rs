// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! SDR Worker (spec §4.2): the dedicated read-thread, its state machine,
//! and the control-command side channel. Grounded on
//! `dsp.rs::{SdrPipeline, iq_read_loop}` for the thread/retune-cmd/gain-cmd
//! pattern, generalized from a fixed channel list to a single IQ
//! broadcaster fed by one worker per configured SDR.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use gs_core::{Complex32, GainSetting, GsError, IqMessage, SdrConfig, SdrDriverKind};

use crate::source::{IqSource, SigmfPlaybackSource, SilenceSource};

/// Fixed-size read chunk (spec §4.2 "A fixed-size chunk is read from the
/// device on a dedicated thread").
pub const IQ_BLOCK_SIZE: usize = 4096;

/// Worker lifecycle (spec §4.2 "State machine").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Starting,
    Running,
    Reconfiguring,
    Stopping,
    Stopped,
}

struct Commands {
    retune: Mutex<Option<f64>>,
    gain: Mutex<Option<GainSetting>>,
    sample_rate: Mutex<Option<f64>>,
    antenna: Mutex<Option<String>>,
    stop: AtomicBool,
}

impl Commands {
    fn new() -> Self {
        Self {
            retune: Mutex::new(None),
            gain: Mutex::new(None),
            sample_rate: Mutex::new(None),
            antenna: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }
}

struct Shared {
    state: Mutex<WorkerState>,
    seq: AtomicU64,
}

/// Runs one SDR's capture pipeline: `start` spawns a dedicated OS thread
/// that reads fixed-size blocks and publishes [`IqMessage`]s into a
/// channel (typically a `gs_broadcaster::Broadcaster<IqMessage>`'s input).
pub struct SdrWorker {
    config: SdrConfig,
    shared: Arc<Shared>,
    commands: Arc<Commands>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl SdrWorker {
    pub fn new(config: SdrConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(WorkerState::Created),
                seq: AtomicU64::new(0),
            }),
            commands: Arc::new(Commands::new()),
            join: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.shared.state.lock().unwrap()
    }

    /// The SDR's configured center frequency. Does not reflect in-flight
    /// `retune` calls, which only update the read thread's local copy.
    pub fn center_freq_hz(&self) -> f64 {
        self.config.center_freq_hz
    }

    /// The FFT size hint from this worker's configuration, used by clients
    /// of the event router that don't pass their own.
    pub fn fft_hint_size(&self) -> usize {
        self.config.fft_hint_size
    }

    fn set_state(shared: &Shared, state: WorkerState) {
        *shared.state.lock().unwrap() = state;
    }

    /// Build the configured driver (spec §4.2 "Configuration"). The
    /// `soapysdr` feature gates the hardware drivers; `sigmf-playback` is
    /// always available.
    fn build_source(config: &SdrConfig) -> Result<Box<dyn IqSource>, GsError> {
        match config.driver {
            SdrDriverKind::SigmfPlayback => {
                let path = config
                    .recording_path
                    .as_deref()
                    .ok_or_else(|| GsError::configuration("sigmf-playback requires recording_path"))?;
                Ok(Box::new(SigmfPlaybackSource::open(path, config.loop_playback)?))
            }
            SdrDriverKind::Rtlsdr | SdrDriverKind::SoapyLocal | SdrDriverKind::SoapyRemote => {
                Self::build_hardware_source(config)
            }
        }
    }

    #[cfg(feature = "soapysdr")]
    fn build_hardware_source(config: &SdrConfig) -> Result<Box<dyn IqSource>, GsError> {
        let args = soapy_args(config);
        Ok(Box::new(crate::source::soapy::SoapySdrSource::new(
            &args,
            config.center_freq_hz,
            config.sample_rate_hz,
            config.gain.clone(),
        )?))
    }

    #[cfg(not(feature = "soapysdr"))]
    fn build_hardware_source(config: &SdrConfig) -> Result<Box<dyn IqSource>, GsError> {
        Err(GsError::configuration(format!(
            "driver {:?} requires the soapysdr feature, which is not enabled in this build",
            config.driver
        )))
    }

    /// Start capture, spawning the dedicated read thread (spec §4.2
    /// "Algorithm"). `iq_tx` is the producer side of an IQ broadcaster's
    /// input channel.
    pub fn start(&mut self, iq_tx: mpsc::Sender<IqMessage>) -> Result<(), GsError> {
        if self.state() != WorkerState::Created && self.state() != WorkerState::Stopped {
            return Err(GsError::configuration("worker already started"));
        }
        Self::set_state(&self.shared, WorkerState::Starting);

        let source = Self::build_source(&self.config)?;

        let shared = self.shared.clone();
        let commands = self.commands.clone();
        let sdr_id = self.config.sdr_id.clone();
        let mut center_freq_hz = self.config.center_freq_hz;
        let mut sample_rate_hz = self.config.sample_rate_hz;

        let handle = std::thread::Builder::new()
            .name(format!("sdr-worker-{sdr_id}"))
            .spawn(move || {
                Self::set_state(&shared, WorkerState::Running);
                Self::read_loop(source, &shared, &commands, &iq_tx, &mut center_freq_hz, &mut sample_rate_hz);
                Self::set_state(&shared, WorkerState::Stopped);
            })
            .map_err(|e| GsError::fatal(format!("failed to spawn SDR worker thread: {e}")))?;

        self.join = Some(handle);
        Ok(())
    }

    /// Request a graceful stop. Accepted from any state but `Stopped` (spec
    /// §4.2 "From any state except Stopped, `stop` is accepted").
    pub fn stop(&mut self) {
        if self.state() == WorkerState::Stopped {
            return;
        }
        self.commands.stop.store(true, Ordering::SeqCst);
        match self.join.take() {
            Some(handle) => {
                Self::set_state(&self.shared, WorkerState::Stopping);
                let _ = handle.join();
            }
            // Never started: nothing to join, go straight to Stopped.
            None => Self::set_state(&self.shared, WorkerState::Stopped),
        }
    }

    pub fn retune(&self, center_freq_hz: f64) {
        *self.commands.retune.lock().unwrap() = Some(center_freq_hz);
    }

    pub fn set_gain(&self, gain: GainSetting) {
        *self.commands.gain.lock().unwrap() = Some(gain);
    }

    pub fn set_sample_rate(&self, sample_rate_hz: f64) {
        *self.commands.sample_rate.lock().unwrap() = Some(sample_rate_hz);
    }

    pub fn set_agc(&self, enabled: bool) {
        let gain = if enabled { GainSetting::Agc } else { GainSetting::Manual(0.0) };
        self.set_gain(gain);
    }

    pub fn set_antenna(&self, antenna: impl Into<String>) {
        *self.commands.antenna.lock().unwrap() = Some(antenna.into());
    }

    #[allow(clippy::too_many_arguments)]
    fn read_loop(
        mut source: Box<dyn IqSource>,
        shared: &Shared,
        commands: &Commands,
        iq_tx: &mpsc::Sender<IqMessage>,
        center_freq_hz: &mut f64,
        sample_rate_hz: &mut f64,
    ) {
        let mut block = vec![Complex32::new(0.0, 0.0); IQ_BLOCK_SIZE];
        let throttle = !source.is_blocking();
        let mut read_error_streak: u32 = 0;
        let mut pending_reset_averager = false;

        while !commands.stop.load(Ordering::SeqCst) {
            if let Ok(mut cmd) = commands.retune.try_lock() {
                if let Some(hz) = cmd.take() {
                    drop(cmd);
                    Self::set_state(shared, WorkerState::Reconfiguring);
                    match source.set_center_freq(hz) {
                        Ok(()) => *center_freq_hz = hz,
                        Err(e) => tracing::warn!(sdr = "retune", error = %e, "retune failed"),
                    }
                    Self::set_state(shared, WorkerState::Running);
                }
            }
            if let Ok(mut cmd) = commands.gain.try_lock() {
                if let Some(gain) = cmd.take() {
                    drop(cmd);
                    if let Err(e) = source.set_gain(gain) {
                        tracing::warn!(error = %e, "gain change failed");
                    }
                }
            }
            if let Ok(mut cmd) = commands.sample_rate.try_lock() {
                if let Some(hz) = cmd.take() {
                    drop(cmd);
                    Self::set_state(shared, WorkerState::Reconfiguring);
                    match source.set_sample_rate(hz) {
                        Ok(()) => {
                            *sample_rate_hz = hz;
                            // Reset marker precedes the first chunk at the
                            // new rate (spec §4.2 "publishes a control tag
                            // {reset_averager: true}").
                            pending_reset_averager = true;
                        }
                        Err(e) => tracing::warn!(error = %e, "sample rate change failed"),
                    }
                    Self::set_state(shared, WorkerState::Running);
                }
            }
            if let Ok(mut cmd) = commands.antenna.try_lock() {
                if let Some(antenna) = cmd.take() {
                    drop(cmd);
                    if let Err(e) = source.set_antenna(&antenna) {
                        tracing::warn!(error = %e, "antenna selection failed");
                    }
                }
            }

            // No IQ is published while reconfiguring (spec §4.2 "In
            // Reconfiguring, no IQ is published"); the commands above
            // already return to Running before falling through here.

            let n = match source.read_into(&mut block) {
                Ok(n) => {
                    read_error_streak = 0;
                    n
                }
                Err(e) => {
                    read_error_streak = read_error_streak.saturating_add(1);
                    let recovered = source.handle_read_error(&e).unwrap_or(false);
                    tracing::warn!(error = %e, streak = read_error_streak, recovered, "IQ source read error");
                    let sleep_ms = 10u64.saturating_mul(1 << read_error_streak.saturating_sub(1).min(4)).min(250);
                    std::thread::sleep(std::time::Duration::from_millis(sleep_ms));
                    continue;
                }
            };

            if n == 0 {
                // Playback EOF without looping: stop (spec §4.2 "Failure").
                Self::set_state(shared, WorkerState::Stopping);
                break;
            }

            let seq = shared.seq.fetch_add(1, Ordering::Relaxed);
            let timestamp_ns = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            let msg = IqMessage {
                samples: Arc::from(&block[..n]),
                center_freq_hz: *center_freq_hz,
                sample_rate_hz: *sample_rate_hz,
                timestamp_ns,
                seq,
                reset_averager: pending_reset_averager,
            };
            pending_reset_averager = false;

            if iq_tx.blocking_send(msg).is_err() {
                // Broadcaster input closed: nothing left to publish to.
                break;
            }

            if throttle && *sample_rate_hz > 0.0 {
                let block_duration_ms = (n as f64 / *sample_rate_hz * 1000.0) as u64;
                std::thread::sleep(std::time::Duration::from_millis(block_duration_ms.max(1)));
            }
        }
    }
}

#[cfg(feature = "soapysdr")]
fn soapy_args(config: &SdrConfig) -> String {
    match config.driver {
        SdrDriverKind::Rtlsdr => {
            let mut args = "driver=rtlsdr".to_string();
            if let Some(serial) = &config.serial {
                args.push_str(&format!(",serial={serial}"));
            }
            args
        }
        SdrDriverKind::SoapyRemote => {
            let host = config.host.as_deref().unwrap_or("localhost");
            let port = config.port.unwrap_or(55132);
            format!("driver=remote,remote=tcp://{host}:{port}")
        }
        _ => String::new(),
    }
}

/// Convenience constructor used by tests and local demos that just want a
/// worker producing silence without a real backing file.
pub fn silence_worker(config: SdrConfig) -> (SdrWorker, Box<dyn IqSource>) {
    (SdrWorker::new(config), Box::new(SilenceSource))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::GainSetting;

    fn test_config(driver: SdrDriverKind) -> SdrConfig {
        SdrConfig {
            sdr_id: "test-sdr".to_string(),
            driver,
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

    #[test]
    fn starts_in_created_state() {
        let worker = SdrWorker::new(test_config(SdrDriverKind::SigmfPlayback));
        assert_eq!(worker.state(), WorkerState::Created);
    }

    #[test]
    fn start_without_recording_path_fails_configuration() {
        let mut worker = SdrWorker::new(test_config(SdrDriverKind::SigmfPlayback));
        let (tx, _rx) = mpsc::channel(4);
        let err = worker.start(tx).unwrap_err();
        assert!(matches!(err, GsError::Configuration(_)));
    }

    #[test]
    fn hardware_driver_without_soapysdr_feature_fails_configuration() {
        let mut worker = SdrWorker::new(test_config(SdrDriverKind::Rtlsdr));
        let (tx, _rx) = mpsc::channel(4);
        let err = worker.start(tx);
        #[cfg(not(feature = "soapysdr"))]
        assert!(matches!(err, Err(GsError::Configuration(_))));
        #[cfg(feature = "soapysdr")]
        let _ = err;
    }

    #[test]
    fn stop_is_idempotent_before_start() {
        let mut worker = SdrWorker::new(test_config(SdrDriverKind::SigmfPlayback));
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
    }
}
