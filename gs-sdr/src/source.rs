// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! IQ source abstraction and the always-available SigMF playback driver
//! (spec §4.2). Grounded on `dsp.rs::IqSource`/`MockIqSource` for the trait
//! shape and `real_iq_source.rs::RealIqSource` for the SoapySDR driver.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use gs_core::{Complex32, GainSetting, GsError};

/// Abstraction over any IQ sample source (real hardware or file playback).
pub trait IqSource: Send + 'static {
    /// Read the next block of IQ samples into `buf`, returning the number
    /// of samples written.
    fn read_into(&mut self, buf: &mut [Complex32]) -> Result<usize, String>;

    /// `true` when `read_into` blocks until samples are ready (hardware
    /// sources); the read loop skips its throttle sleep in that case.
    fn is_blocking(&self) -> bool {
        false
    }

    fn set_center_freq(&mut self, _hz: f64) -> Result<(), String> {
        Ok(())
    }

    fn set_gain(&mut self, _gain: GainSetting) -> Result<(), String> {
        Ok(())
    }

    fn set_sample_rate(&mut self, _hz: f64) -> Result<(), String> {
        Ok(())
    }

    fn set_antenna(&mut self, _antenna: &str) -> Result<(), String> {
        Ok(())
    }

    /// Gives a source a chance to recover from a read error (e.g.
    /// rearming a stalled stream). Returns `true` if a recovery action
    /// was attempted.
    fn handle_read_error(&mut self, _err: &str) -> Result<bool, String> {
        Ok(false)
    }
}

/// SigMF sidecar metadata, just enough to pace and retune playback (spec
/// §4.2 "For the sigmf-playback driver").
#[derive(Debug, Clone, serde::Deserialize)]
struct SigmfMeta {
    global: SigmfGlobal,
    #[serde(default)]
    captures: Vec<SigmfCapture>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct SigmfGlobal {
    #[serde(rename = "core:sample_rate")]
    sample_rate: f64,
    #[serde(rename = "core:datatype")]
    datatype: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct SigmfCapture {
    #[serde(rename = "core:sample_start", default)]
    sample_start: u64,
    #[serde(rename = "core:frequency", default)]
    frequency: Option<f64>,
}

/// Reads a `cf32_le` SigMF recording and loops it (spec §4.2).
///
/// `recording_path` names the data file without extension; `<path>.sigmf-meta`
/// and `<path>.sigmf-data` are expected alongside it.
pub struct SigmfPlaybackSource {
    data_path: PathBuf,
    file: File,
    sample_rate_hz: f64,
    captures: Vec<SigmfCapture>,
    loop_playback: bool,
    bytes_per_sample: usize,
    total_samples: u64,
    samples_read: u64,
}

impl SigmfPlaybackSource {
    pub fn open(recording_path: &str, loop_playback: bool) -> Result<Self, GsError> {
        let base = Path::new(recording_path);
        let meta_path = with_extension(base, "sigmf-meta");
        let data_path = with_extension(base, "sigmf-data");

        let meta_text = std::fs::read_to_string(&meta_path)
            .map_err(|e| GsError::configuration(format!("reading {}: {e}", meta_path.display())))?;
        let meta: SigmfMeta = serde_json::from_str(&meta_text)
            .map_err(|e| GsError::configuration(format!("parsing {}: {e}", meta_path.display())))?;

        if meta.global.datatype != "cf32_le" {
            return Err(GsError::configuration(format!(
                "unsupported SigMF datatype {:?}, only cf32_le is supported",
                meta.global.datatype
            )));
        }

        let file = File::open(&data_path)
            .map_err(|e| GsError::configuration(format!("opening {}: {e}", data_path.display())))?;
        let bytes_per_sample = 8; // two little-endian f32s
        let total_bytes = file
            .metadata()
            .map_err(|e| GsError::configuration(format!("stat {}: {e}", data_path.display())))?
            .len();
        let total_samples = total_bytes / bytes_per_sample as u64;

        Ok(Self {
            data_path,
            file,
            sample_rate_hz: meta.global.sample_rate,
            captures: meta.captures,
            loop_playback,
            bytes_per_sample,
            total_samples,
            samples_read: 0,
        })
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// The capture segment's declared frequency covering `sample_index`, if
    /// any segments were declared in the sidecar metadata.
    pub fn center_freq_at(&self, sample_index: u64) -> Option<f64> {
        self.captures
            .iter()
            .rev()
            .find(|c| c.sample_start <= sample_index)
            .and_then(|c| c.frequency)
    }
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut s = base.as_os_str().to_owned();
    // `recording_path` may already include `.sigmf-meta`/`.sigmf-data`, or
    // be the bare stem; either way normalize to `<stem>.<ext>`.
    let base_str = base.to_string_lossy();
    if let Some(stem) = base_str
        .strip_suffix(".sigmf-meta")
        .or_else(|| base_str.strip_suffix(".sigmf-data"))
    {
        PathBuf::from(format!("{stem}.{ext}"))
    } else {
        s.push(".");
        s.push(ext);
        PathBuf::from(s)
    }
}

impl IqSource for SigmfPlaybackSource {
    fn read_into(&mut self, buf: &mut [Complex32]) -> Result<usize, String> {
        let mut raw = vec![0u8; buf.len() * self.bytes_per_sample];
        let mut filled = 0usize;

        while filled < buf.len() {
            let want_bytes = (buf.len() - filled) * self.bytes_per_sample;
            let n = self
                .file
                .read(&mut raw[filled * self.bytes_per_sample..filled * self.bytes_per_sample + want_bytes])
                .map_err(|e| format!("SigMF playback read error: {e}"))?;
            if n == 0 {
                // EOF: loop back to the start or stop producing samples.
                if self.loop_playback && self.total_samples > 0 {
                    self.file
                        .seek(SeekFrom::Start(0))
                        .map_err(|e| format!("SigMF playback rewind error: {e}"))?;
                    self.samples_read = 0;
                    continue;
                }
                break;
            }
            let n_samples = n / self.bytes_per_sample;
            filled += n_samples;
        }

        for (i, sample) in buf[..filled].iter_mut().enumerate() {
            let off = i * self.bytes_per_sample;
            let re = f32::from_le_bytes(raw[off..off + 4].try_into().unwrap());
            let im = f32::from_le_bytes(raw[off + 4..off + 8].try_into().unwrap());
            *sample = Complex32::new(re, im);
        }
        self.samples_read += filled as u64;

        Ok(filled)
    }

    fn is_blocking(&self) -> bool {
        false
    }

    fn set_center_freq(&mut self, _hz: f64) -> Result<(), String> {
        // Playback frequency is driven by the recording's own capture
        // segments; a manual retune just changes what the rest of the
        // pipeline believes the center frequency is.
        Ok(())
    }
}

/// IQ source that produces silence. Used by tests and as a safe fallback.
pub struct SilenceSource;

impl IqSource for SilenceSource {
    fn read_into(&mut self, buf: &mut [Complex32]) -> Result<usize, String> {
        buf.fill(Complex32::new(0.0, 0.0));
        Ok(buf.len())
    }
}

#[cfg(feature = "soapysdr")]
pub mod soapy {
    use super::*;

    /// Real SoapySDR device IQ source (spec §4.2 `soapy-local`/`soapy-remote`/
    /// `rtlsdr` drivers, which all resolve to a SoapySDR device args string).
    /// Grounded on `real_iq_source.rs::RealIqSource`.
    pub struct SoapySdrSource {
        #[allow(dead_code)]
        device: ::soapysdr::Device,
        stream: ::soapysdr::RxStream<Complex32>,
    }

    impl SoapySdrSource {
        pub fn new(args: &str, center_freq_hz: f64, sample_rate_hz: f64, gain: GainSetting) -> Result<Self, GsError> {
            let device = ::soapysdr::Device::new(args)
                .map_err(|e| GsError::configuration(format!("opening SoapySDR device {args:?}: {e}")))?;
            device
                .set_sample_rate(::soapysdr::Direction::Rx, 0, sample_rate_hz)
                .map_err(|e| GsError::configuration(format!("setting sample rate: {e}")))?;
            device
                .set_frequency(::soapysdr::Direction::Rx, 0, center_freq_hz, ())
                .map_err(|e| GsError::configuration(format!("setting center frequency: {e}")))?;
            apply_gain(&device, gain)?;

            let mut stream = device
                .rx_stream::<Complex32>(&[0])
                .map_err(|e| GsError::configuration(format!("creating RX stream: {e}")))?;
            stream
                .activate(None)
                .map_err(|e| GsError::configuration(format!("activating RX stream: {e}")))?;

            Ok(Self { device, stream })
        }
    }

    fn apply_gain(device: &::soapysdr::Device, gain: GainSetting) -> Result<(), GsError> {
        match gain {
            GainSetting::Agc => device
                .set_gain_mode(::soapysdr::Direction::Rx, 0, true)
                .map_err(|e| GsError::configuration(format!("enabling AGC: {e}"))),
            GainSetting::Manual(db) => device
                .set_gain(::soapysdr::Direction::Rx, 0, db)
                .map_err(|e| GsError::configuration(format!("setting gain: {e}"))),
        }
    }

    impl IqSource for SoapySdrSource {
        fn read_into(&mut self, buf: &mut [Complex32]) -> Result<usize, String> {
            const TIMEOUT_US: i64 = 1_000_000;
            self.stream
                .read(&[buf], TIMEOUT_US)
                .map_err(|e| format!("SoapySDR stream read error: {e}"))
        }

        fn is_blocking(&self) -> bool {
            true
        }

        fn set_center_freq(&mut self, hz: f64) -> Result<(), String> {
            self.device
                .set_frequency(::soapysdr::Direction::Rx, 0, hz, ())
                .map_err(|e| format!("retune failed: {e}"))
        }

        fn set_gain(&mut self, gain: GainSetting) -> Result<(), String> {
            apply_gain(&self.device, gain).map_err(|e| e.to_string())
        }

        fn set_sample_rate(&mut self, hz: f64) -> Result<(), String> {
            self.device
                .set_sample_rate(::soapysdr::Direction::Rx, 0, hz)
                .map_err(|e| format!("sample rate change failed: {e}"))
        }

        fn set_antenna(&mut self, antenna: &str) -> Result<(), String> {
            self.device
                .set_antenna(::soapysdr::Direction::Rx, 0, antenna)
                .map_err(|e| format!("antenna selection failed: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn silence_source_fills_zeros() {
        let mut src = SilenceSource;
        let mut buf = vec![Complex32::new(1.0, 1.0); 16];
        let n = src.read_into(&mut buf).unwrap();
        assert_eq!(n, 16);
        assert!(buf.iter().all(|s| s.re == 0.0 && s.im == 0.0));
    }

    fn write_fixture(dir: &Path, stem: &str, sample_rate: f64, n_samples: usize) -> String {
        let meta_path = dir.join(format!("{stem}.sigmf-meta"));
        let data_path = dir.join(format!("{stem}.sigmf-data"));
        let meta = serde_json::json!({
            "global": {
                "core:sample_rate": sample_rate,
                "core:datatype": "cf32_le",
            },
            "captures": [
                {"core:sample_start": 0, "core:frequency": 145_800_000.0}
            ],
        });
        std::fs::write(&meta_path, meta.to_string()).unwrap();
        let mut f = File::create(&data_path).unwrap();
        for i in 0..n_samples {
            let re = (i as f32) * 0.001;
            let im = -(i as f32) * 0.001;
            f.write_all(&re.to_le_bytes()).unwrap();
            f.write_all(&im.to_le_bytes()).unwrap();
        }
        dir.join(stem).to_string_lossy().into_owned()
    }

    #[test]
    fn playback_reads_samples_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let stem_path = write_fixture(dir.path(), "rec", 48_000.0, 8);
        let mut src = SigmfPlaybackSource::open(&stem_path, false).unwrap();
        assert_eq!(src.sample_rate_hz(), 48_000.0);
        let mut buf = vec![Complex32::new(0.0, 0.0); 4];
        let n = src.read_into(&mut buf).unwrap();
        assert_eq!(n, 4);
        assert!((buf[1].re - 0.001).abs() < 1e-6);
    }

    #[test]
    fn playback_loops_on_eof_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let stem_path = write_fixture(dir.path(), "rec", 48_000.0, 4);
        let mut src = SigmfPlaybackSource::open(&stem_path, true).unwrap();
        let mut buf = vec![Complex32::new(0.0, 0.0); 6];
        let n = src.read_into(&mut buf).unwrap();
        assert_eq!(n, 6);
        assert!((buf[4].re - buf[0].re).abs() < 1e-6, "expected playback to wrap around");
    }

    #[test]
    fn playback_stops_at_eof_when_not_looping() {
        let dir = tempfile::tempdir().unwrap();
        let stem_path = write_fixture(dir.path(), "rec", 48_000.0, 4);
        let mut src = SigmfPlaybackSource::open(&stem_path, false).unwrap();
        let mut buf = vec![Complex32::new(0.0, 0.0); 6];
        let n = src.read_into(&mut buf).unwrap();
        assert_eq!(n, 4);
    }

    #[test]
    fn capture_segment_frequency_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let stem_path = write_fixture(dir.path(), "rec", 48_000.0, 4);
        let src = SigmfPlaybackSource::open(&stem_path, false).unwrap();
        assert_eq!(src.center_freq_at(0), Some(145_800_000.0));
    }
}
