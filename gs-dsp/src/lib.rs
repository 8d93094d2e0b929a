// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Signal-processing pipeline shared by every SDR channel and waterfall
//! view (spec §4.3, §4.4). Grounded on the teacher's `dsp/` module tree.

pub mod channel;
pub mod demod;
pub mod fft;
mod filter;

pub use channel::{Channel, ChannelAudio, OUTPUT_SAMPLE_RATE_HZ};
pub use demod::{Demodulator, WfmStereoDecoder};
pub use fft::{FftOverlap, FftProcessor, FftProcessorConfig, FftStats, FftWindow, WaterfallRow};
