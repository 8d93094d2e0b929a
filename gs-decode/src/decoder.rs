// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The decoder contract (spec §4.5): a black-box consumer of `iq_in` or
//! `audio_in` that produces `frames_out` and `status_out`. In-process
//! decoders implement [`Decoder`] directly; out-of-process ones are
//! wrapped by [`crate::external::ExternalDecoder`], which also implements
//! it so the Process Manager never has to distinguish the two.

use gs_core::Complex32;

use crate::frame::{DecodedFrame, DecoderStatus};

/// A framing consumer hanging off one `(sdr, session, vfo)`.
///
/// Most decoders only consume one of IQ or audio; the default
/// implementations make the unused port a no-op rather than forcing every
/// impl to implement both.
pub trait Decoder: Send {
    fn feed_iq(&mut self, _samples: &[Complex32]) -> Vec<DecodedFrame> {
        Vec::new()
    }

    fn feed_audio(&mut self, _samples: &[f32]) -> Vec<DecodedFrame> {
        Vec::new()
    }

    fn status(&self) -> DecoderStatus;

    /// Discard in-flight framing/clock-recovery state, e.g. after a retune
    /// (spec §4.5 restart-on-config-change).
    fn reset(&mut self);
}
