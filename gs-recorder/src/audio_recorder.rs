// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Audio recorder: a hand-rolled RIFF/WAV writer (16-bit PCM, mono) plus a
//! JSON sidecar describing the recording. Grounded on
//! `original_source/backend/demodulators/audiorecorder.py::AudioRecorder`,
//! whose `wave.open(...)` call this mirrors byte-for-byte, and whose
//! `_write_preliminary_metadata` sidecar fields this struct carries across
//! unchanged.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use gs_core::{GsError, Modulation, SessionId, VfoNumber};

const BITS_PER_SAMPLE: u16 = 16;
const CHANNELS: u16 = 1;

/// Everything the sidecar needs that isn't derivable from the audio stream
/// itself. Mirrors the Python recorder's constructor arguments.
pub struct AudioRecorderMetadata {
    pub vfo_number: VfoNumber,
    pub demodulator_type: Modulation,
    pub center_frequency_hz: f64,
    pub vfo_frequency_hz: f64,
    pub session_id: SessionId,
    pub target_satellite_norad_id: Option<u32>,
    pub target_satellite_name: Option<String>,
}

/// Writes `<path>.wav` (RIFF/PCM) and `<path>.json` (sidecar metadata).
pub struct AudioRecorder {
    wav_path: PathBuf,
    json_path: PathBuf,
    file: File,
    sample_rate_hz: u32,
    frames_written: u64,
    start_time_iso: String,
    meta: AudioRecorderMetadata,
}

impl AudioRecorder {
    pub fn create(recording_path: &str, sample_rate_hz: u32, meta: AudioRecorderMetadata) -> Result<Self, GsError> {
        let wav_path = PathBuf::from(format!("{recording_path}.wav"));
        let json_path = PathBuf::from(format!("{recording_path}.json"));

        let mut file = File::create(&wav_path)
            .map_err(|e| GsError::transient(format!("creating {}: {e}", wav_path.display())))?;
        write_wav_header(&mut file, sample_rate_hz, 0)
            .map_err(|e| GsError::transient(format!("writing WAV header: {e}")))?;

        let recorder = Self {
            wav_path,
            json_path,
            file,
            sample_rate_hz,
            frames_written: 0,
            start_time_iso: chrono::Utc::now().to_rfc3339(),
            meta,
        };
        recorder.write_sidecar("recording")?;
        Ok(recorder)
    }

    /// Append one block of mono samples in `[-1.0, 1.0]`, quantized to
    /// 16-bit PCM the same way `numpy.int16` truncation does in the
    /// original recorder.
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<(), GsError> {
        let mut buf = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            let pcm = (clamped * i16::MAX as f32) as i16;
            buf.extend_from_slice(&pcm.to_le_bytes());
        }
        self.file
            .write_all(&buf)
            .map_err(|e| GsError::transient(format!("writing {}: {e}", self.wav_path.display())))?;
        self.frames_written += samples.len() as u64;
        Ok(())
    }

    fn write_sidecar(&self, status: &str) -> Result<(), GsError> {
        let mut doc = serde_json::json!({
            "status": status,
            "format": "wav",
            "sample_rate": self.sample_rate_hz,
            "channels": CHANNELS,
            "bit_depth": BITS_PER_SAMPLE,
            "vfo_number": self.meta.vfo_number,
            "demodulator_type": self.meta.demodulator_type,
            "center_frequency": self.meta.center_frequency_hz,
            "vfo_frequency": self.meta.vfo_frequency_hz,
            "start_time": self.start_time_iso,
            "session_id": self.meta.session_id,
        });
        if let Some(norad_id) = self.meta.target_satellite_norad_id {
            doc["target_satellite_norad_id"] = serde_json::json!(norad_id);
        }
        if let Some(name) = &self.meta.target_satellite_name {
            doc["target_satellite_name"] = serde_json::json!(name);
        }
        std::fs::write(&self.json_path, serde_json::to_string_pretty(&doc).unwrap())
            .map_err(|e| GsError::transient(format!("writing {}: {e}", self.json_path.display())))
    }

    /// Patch the RIFF/data chunk sizes now that the frame count is known,
    /// flush, and mark the sidecar complete.
    pub fn finalize(mut self) -> Result<(), GsError> {
        let data_bytes = self.frames_written * (BITS_PER_SAMPLE as u64 / 8);
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| write_wav_header(&mut self.file, self.sample_rate_hz, data_bytes))
            .map_err(|e| GsError::transient(format!("patching WAV header: {e}")))?;
        self.file
            .flush()
            .map_err(|e| GsError::transient(format!("flushing {}: {e}", self.wav_path.display())))?;
        self.write_sidecar("completed")
    }

    pub fn wav_path(&self) -> &Path {
        &self.wav_path
    }
}

/// Writes a 44-byte canonical PCM WAV header. `data_bytes` is the payload
/// size in bytes; pass 0 up front and patch it in once the total is known,
/// since the size isn't known until recording stops.
fn write_wav_header(w: &mut File, sample_rate_hz: u32, data_bytes: u64) -> std::io::Result<()> {
    let byte_rate = sample_rate_hz * CHANNELS as u32 * (BITS_PER_SAMPLE as u32 / 8);
    let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);
    let riff_size = 36 + data_bytes as u32;

    w.write_all(b"RIFF")?;
    w.write_all(&riff_size.to_le_bytes())?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?; // fmt chunk size
    w.write_all(&1u16.to_le_bytes())?; // PCM
    w.write_all(&CHANNELS.to_le_bytes())?;
    w.write_all(&sample_rate_hz.to_le_bytes())?;
    w.write_all(&byte_rate.to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

    w.write_all(b"data")?;
    w.write_all(&(data_bytes as u32).to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> AudioRecorderMetadata {
        AudioRecorderMetadata {
            vfo_number: 0,
            demodulator_type: Modulation::Fm,
            center_frequency_hz: 145_800_000.0,
            vfo_frequency_hz: 145_825_000.0,
            session_id: SessionId("s1".to_string()),
            target_satellite_norad_id: Some(25544),
            target_satellite_name: Some("ISS".to_string()),
        }
    }

    #[test]
    fn writes_valid_riff_header_and_pcm_samples() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("audio").to_string_lossy().into_owned();

        let mut rec = AudioRecorder::create(&stem, 44_100, meta()).unwrap();
        rec.write_samples(&[1.0, -1.0, 0.0]).unwrap();
        rec.finalize().unwrap();

        let bytes = std::fs::read(format!("{stem}.wav")).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[36..40], b"data");

        let data_size = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(data_size, 6); // 3 samples * 2 bytes
        assert_eq!(bytes.len(), 44 + 6);

        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(riff_size, 36 + 6);

        let first_sample = i16::from_le_bytes(bytes[44..46].try_into().unwrap());
        assert_eq!(first_sample, i16::MAX);
    }

    #[test]
    fn clamps_out_of_range_samples() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("clamp").to_string_lossy().into_owned();

        let mut rec = AudioRecorder::create(&stem, 44_100, meta()).unwrap();
        rec.write_samples(&[2.0, -2.0]).unwrap();
        rec.finalize().unwrap();

        let bytes = std::fs::read(format!("{stem}.wav")).unwrap();
        let s0 = i16::from_le_bytes(bytes[44..46].try_into().unwrap());
        let s1 = i16::from_le_bytes(bytes[46..48].try_into().unwrap());
        assert_eq!(s0, i16::MAX);
        assert_eq!(s1, -i16::MAX);
    }

    #[test]
    fn sidecar_carries_satellite_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("meta").to_string_lossy().into_owned();

        let rec = AudioRecorder::create(&stem, 44_100, meta()).unwrap();
        rec.finalize().unwrap();

        let text = std::fs::read_to_string(format!("{stem}.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["status"], "completed");
        assert_eq!(doc["format"], "wav");
        assert_eq!(doc["bit_depth"], 16);
        assert_eq!(doc["target_satellite_name"], "ISS");
    }
}
