// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Recorders (spec §4.8): IQ-to-SigMF and demodulated-audio-to-WAV, each
//! with a JSON metadata sidecar. Grounded on
//! `original_source/backend/server/recorder.py` and
//! `original_source/backend/demodulators/audiorecorder.py`.

pub mod audio_recorder;
pub mod iq_recorder;

pub use audio_recorder::{AudioRecorder, AudioRecorderMetadata};
pub use iq_recorder::IqRecorder;
