// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-mode demodulation (spec §4.4 step 4). Grounded on `demod.rs`'s
//! `Demodulator` enum and its per-mode submodules, retargeted from
//! `RigMode` onto [`gs_core::Modulation`].

mod agc;
mod am;
mod fm;
mod math;
mod ssb;
mod wfm;

use num_complex::Complex;

use gs_core::Modulation;

pub(crate) use agc::{DcBlocker, SoftAgc};
pub use wfm::WfmStereoDecoder;

/// Selects the demodulation algorithm for a channel (spec §4.4 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demodulator {
    Usb,
    Lsb,
    Am,
    Fm,
    Wfm,
    Cw,
}

impl Demodulator {
    pub fn for_mode(mode: Modulation) -> Self {
        match mode {
            Modulation::Usb => Self::Usb,
            Modulation::Lsb => Self::Lsb,
            Modulation::Am => Self::Am,
            Modulation::Fm => Self::Fm,
            Modulation::Wfm => Self::Wfm,
            Modulation::Cw => Self::Cw,
        }
    }

    /// Demodulate a block of baseband IQ samples (after mixing, filtering
    /// and decimation). WFM is handled separately by [`WfmStereoDecoder`]
    /// since it needs stereo state across calls; this only covers the
    /// single-channel modes.
    pub fn demodulate(&self, samples: &[Complex<f32>]) -> Vec<f32> {
        match self {
            Self::Usb | Self::Lsb | Self::Cw => ssb::demod_real_part(samples),
            Self::Am => am::demod_am(samples),
            Self::Fm => fm::demod_fm(samples),
            Self::Wfm => fm::demod_fm(samples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_mode_maps_every_modulation() {
        assert_eq!(Demodulator::for_mode(Modulation::Usb), Demodulator::Usb);
        assert_eq!(Demodulator::for_mode(Modulation::Lsb), Demodulator::Lsb);
        assert_eq!(Demodulator::for_mode(Modulation::Am), Demodulator::Am);
        assert_eq!(Demodulator::for_mode(Modulation::Fm), Demodulator::Fm);
        assert_eq!(Demodulator::for_mode(Modulation::Wfm), Demodulator::Wfm);
        assert_eq!(Demodulator::for_mode(Modulation::Cw), Demodulator::Cw);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        for demod in [
            Demodulator::Usb,
            Demodulator::Lsb,
            Demodulator::Am,
            Demodulator::Fm,
            Demodulator::Wfm,
            Demodulator::Cw,
        ] {
            assert!(demod.demodulate(&[]).is_empty());
        }
    }
}
