// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! IQ recorder: raw `cf32_le` samples plus a SigMF JSON sidecar (spec §4.8
//! `start_recorder`/`stop_recorder`). Grounded on
//! `original_source/backend/server/recorder.py` for the naming/metadata
//! shape and `gs_sdr::source::SigmfPlaybackSource` for the SigMF sidecar
//! schema this writes (the two are inverses of each other).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use gs_core::{Complex32, GsError};

/// Writes `<path>.sigmf-data` (raw interleaved `cf32_le`) and
/// `<path>.sigmf-meta` (JSON sidecar), matching the format
/// [`gs_sdr::SigmfPlaybackSource`] reads back.
pub struct IqRecorder {
    data_path: PathBuf,
    meta_path: PathBuf,
    writer: BufWriter<File>,
    sample_rate_hz: f64,
    center_freq_hz: f64,
    start_time_iso: String,
    total_samples: u64,
    target_satellite_norad_id: Option<u32>,
    target_satellite_name: Option<String>,
}

impl IqRecorder {
    pub fn create(
        recording_path: &str,
        sample_rate_hz: f64,
        center_freq_hz: f64,
        target_satellite_norad_id: Option<u32>,
        target_satellite_name: Option<String>,
    ) -> Result<Self, GsError> {
        let data_path = PathBuf::from(format!("{recording_path}.sigmf-data"));
        let meta_path = PathBuf::from(format!("{recording_path}.sigmf-meta"));
        let file = File::create(&data_path)
            .map_err(|e| GsError::transient(format!("creating {}: {e}", data_path.display())))?;

        let recorder = Self {
            data_path,
            meta_path,
            writer: BufWriter::new(file),
            sample_rate_hz,
            center_freq_hz,
            start_time_iso: chrono::Utc::now().to_rfc3339(),
            total_samples: 0,
            target_satellite_norad_id,
            target_satellite_name,
        };
        recorder.write_sidecar("recording")?;
        Ok(recorder)
    }

    pub fn write_chunk(&mut self, samples: &[Complex32]) -> Result<(), GsError> {
        for s in samples {
            self.writer
                .write_all(&s.re.to_le_bytes())
                .and_then(|_| self.writer.write_all(&s.im.to_le_bytes()))
                .map_err(|e| GsError::transient(format!("writing IQ samples: {e}")))?;
        }
        self.total_samples += samples.len() as u64;
        Ok(())
    }

    fn write_sidecar(&self, status: &str) -> Result<(), GsError> {
        let mut doc = serde_json::json!({
            "global": {
                "core:sample_rate": self.sample_rate_hz,
                "core:datatype": "cf32_le",
                "core:version": "1.0.0",
            },
            "captures": [
                {"core:sample_start": 0, "core:frequency": self.center_freq_hz}
            ],
            "annotations": [],
            "status": status,
            "start_time": self.start_time_iso,
            "total_samples": self.total_samples,
        });
        if let Some(norad_id) = self.target_satellite_norad_id {
            doc["target_satellite_norad_id"] = serde_json::json!(norad_id);
        }
        if let Some(name) = &self.target_satellite_name {
            doc["target_satellite_name"] = serde_json::json!(name);
        }
        std::fs::write(&self.meta_path, serde_json::to_string_pretty(&doc).unwrap())
            .map_err(|e| GsError::transient(format!("writing {}: {e}", self.meta_path.display())))
    }

    /// Flush pending writes and mark the sidecar as complete.
    pub fn finalize(mut self) -> Result<(), GsError> {
        self.writer
            .flush()
            .map_err(|e| GsError::transient(format!("flushing {}: {e}", self.data_path.display())))?;
        self.write_sidecar("completed")
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_interleaved_cf32_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("rec").to_string_lossy().into_owned();

        let mut rec = IqRecorder::create(&stem, 48_000.0, 145_800_000.0, Some(25544), None).unwrap();
        rec.write_chunk(&[Complex32::new(1.0, -1.0), Complex32::new(0.5, 0.25)]).unwrap();
        rec.finalize().unwrap();

        let data = std::fs::read(format!("{stem}.sigmf-data")).unwrap();
        assert_eq!(data.len(), 2 * 8);
        let re0 = f32::from_le_bytes(data[0..4].try_into().unwrap());
        assert_eq!(re0, 1.0);

        let meta_text = std::fs::read_to_string(format!("{stem}.sigmf-meta")).unwrap();
        let meta: serde_json::Value = serde_json::from_str(&meta_text).unwrap();
        assert_eq!(meta["status"], "completed");
        assert_eq!(meta["total_samples"], 2);
        assert_eq!(meta["target_satellite_norad_id"], 25544);
    }
}
