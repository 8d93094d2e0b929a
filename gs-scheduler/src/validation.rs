// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transmitter frequency validation (spec §4.7 "Generator" Nyquist check).
//! Grounded on
//! `original_source/backend/observations/validation.py::validate_transmitter_frequencies`.

use gs_core::{SessionPlan, Task};

/// One decoder task whose configured frequency falls outside its session's
/// SDR Nyquist range.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidFrequency {
    pub session_index: usize,
    pub task_index: usize,
    pub frequency_hz: f64,
    pub min_allowed_hz: f64,
    pub max_allowed_hz: f64,
}

/// Check every `Task::Decoder`'s `overrides["frequency"]` (when present)
/// against `[center - sample_rate/2, center + sample_rate/2]`. A decoder
/// with no explicit frequency override inherits the VFO's tuned frequency
/// and is skipped, matching the original's "might use center_frequency as
/// default" short-circuit.
pub fn validate_transmitter_frequencies(sessions: &[SessionPlan]) -> Result<(), Vec<InvalidFrequency>> {
    let mut invalid = Vec::new();

    for (session_index, session) in sessions.iter().enumerate() {
        let nyquist_hz = session.sdr.sample_rate_hz / 2.0;
        let min_allowed_hz = session.sdr.center_freq_hz - nyquist_hz;
        let max_allowed_hz = session.sdr.center_freq_hz + nyquist_hz;

        for (task_index, task) in session.tasks.iter().enumerate() {
            let Task::Decoder { overrides, .. } = task else {
                continue;
            };
            let Some(frequency_hz) = overrides
                .as_ref()
                .and_then(|map| map.get("frequency"))
                .and_then(|v| v.as_f64())
            else {
                continue;
            };

            if frequency_hz < min_allowed_hz || frequency_hz > max_allowed_hz {
                invalid.push(InvalidFrequency {
                    session_index,
                    task_index,
                    frequency_hz,
                    min_allowed_hz,
                    max_allowed_hz,
                });
            }
        }
    }

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::{GainSetting, SdrConfig, SdrDriverKind};
    use serde_json::Map;

    fn sdr_config(center_freq_hz: f64, sample_rate_hz: f64) -> SdrConfig {
        SdrConfig {
            sdr_id: "sdr0".to_string(),
            driver: SdrDriverKind::SigmfPlayback,
            host: None,
            port: None,
            serial: None,
            antenna: None,
            center_freq_hz,
            sample_rate_hz,
            gain: GainSetting::Agc,
            bias_t: false,
            ppm_error: None,
            fft_hint_size: 1024,
            recording_path: None,
            loop_playback: true,
            offset_freq: None,
        }
    }

    fn decoder_task(frequency_hz: Option<f64>) -> Task {
        let overrides = frequency_hz.map(|f| {
            let mut map = Map::new();
            map.insert("frequency".to_string(), serde_json::json!(f));
            map
        });
        Task::Decoder { decoder_type: "afsk1200".to_string(), vfo: 1, overrides }
    }

    #[test]
    fn in_range_frequency_passes() {
        let sessions = vec![SessionPlan {
            sdr: sdr_config(145_800_000.0, 2_400_000.0),
            tasks: vec![decoder_task(Some(145_825_000.0))],
        }];
        assert!(validate_transmitter_frequencies(&sessions).is_ok());
    }

    #[test]
    fn out_of_range_frequency_is_reported() {
        let sessions = vec![SessionPlan {
            sdr: sdr_config(145_800_000.0, 2_400_000.0),
            tasks: vec![decoder_task(Some(148_000_000.0))],
        }];
        let err = validate_transmitter_frequencies(&sessions).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].session_index, 0);
        assert_eq!(err[0].task_index, 0);
    }

    #[test]
    fn missing_frequency_override_is_skipped() {
        let sessions = vec![SessionPlan { sdr: sdr_config(145_800_000.0, 2_400_000.0), tasks: vec![decoder_task(None)] }];
        assert!(validate_transmitter_frequencies(&sessions).is_ok());
    }

    #[test]
    fn non_decoder_tasks_are_ignored() {
        let sessions = vec![SessionPlan {
            sdr: sdr_config(145_800_000.0, 2_400_000.0),
            tasks: vec![Task::Recorder { vfo: None }],
        }];
        assert!(validate_transmitter_frequencies(&sessions).is_ok());
    }
}
