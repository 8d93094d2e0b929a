// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-VFO demodulation pipeline: NCO mixer, low-pass filter, decimate,
//! demodulate, resample to 44.1 kHz (spec §4.4). Grounded on
//! `dsp/channel.rs::ChannelDsp`, generalized from the teacher's single
//! in-process rig channel to one instance per `(session, vfo)`.

use num_complex::Complex;

use gs_core::Modulation;

use crate::demod::{DcBlocker, Demodulator, SoftAgc, WfmStereoDecoder};
use crate::filter::BlockFirFilterPair;

/// Output audio sample rate mandated by spec §4.4 step 5.
pub const OUTPUT_SAMPLE_RATE_HZ: u32 = 44_100;

const WFM_DEEMPHASIS_US: u32 = 75;
const FIR_TAPS: usize = 63;

fn agc_for_mode(mode: Modulation, sample_rate: f32) -> SoftAgc {
    match mode {
        Modulation::Cw => SoftAgc::new(sample_rate, 1.0, 50.0, 0.5, 30.0),
        Modulation::Am => SoftAgc::new(sample_rate, 500.0, 5_000.0, 0.5, 30.0),
        _ => SoftAgc::new(sample_rate, 5.0, 500.0, 0.5, 30.0),
    }
}

fn iq_agc_for_mode(mode: Modulation, sample_rate: f32) -> Option<SoftAgc> {
    match mode {
        Modulation::Fm => Some(SoftAgc::new(sample_rate, 0.5, 150.0, 0.8, 12.0)),
        _ => None,
    }
}

fn dc_for_mode(mode: Modulation) -> Option<DcBlocker> {
    match mode {
        Modulation::Wfm => None,
        _ => Some(DcBlocker::new(0.9999)),
    }
}

/// Result of demodulating one IQ chunk for one channel.
pub struct ChannelAudio {
    pub samples: Vec<f32>,
    pub channels: u8,
    /// Instantaneous channel power in dBFS, measured pre-demodulation, for
    /// the squelch decision (spec §4.4 "Mute / squelch").
    pub channel_power_db: f32,
}

/// A single demodulation channel bound to one (session, vfo).
pub struct Channel {
    modulation: Modulation,
    demodulator: Demodulator,
    lpf: BlockFirFilterPair,
    sdr_sample_rate_hz: f64,
    bandwidth_hz: u32,
    block_size: usize,
    decim_factor: usize,
    decim_counter: usize,
    channel_sample_rate_hz: u32,
    mixer_phase: f64,
    mixer_phase_inc: f64,
    wfm_decoder: Option<WfmStereoDecoder>,
    iq_agc: Option<SoftAgc>,
    audio_agc: SoftAgc,
    audio_dc: Option<DcBlocker>,
    squelch: i16,
    scratch_mixed_i: Vec<f32>,
    scratch_mixed_q: Vec<f32>,
    scratch_filtered_i: Vec<f32>,
    scratch_filtered_q: Vec<f32>,
    scratch_decimated: Vec<Complex<f32>>,
}

impl Channel {
    pub fn new(
        channel_if_hz: f64,
        modulation: Modulation,
        bandwidth_hz: u32,
        sdr_sample_rate_hz: f64,
        block_size: usize,
        squelch: i16,
    ) -> Self {
        let (decim_factor, channel_sample_rate_hz) =
            Self::pipeline_rates(modulation, sdr_sample_rate_hz, bandwidth_hz);
        let cutoff_norm = Self::cutoff_norm(bandwidth_hz, channel_sample_rate_hz, sdr_sample_rate_hz);
        let mixer_phase_inc = Self::mixer_phase_inc(channel_if_hz, sdr_sample_rate_hz);

        Self {
            modulation,
            demodulator: Demodulator::for_mode(modulation),
            lpf: BlockFirFilterPair::new(cutoff_norm, FIR_TAPS, block_size),
            sdr_sample_rate_hz,
            bandwidth_hz,
            block_size,
            decim_factor,
            decim_counter: 0,
            channel_sample_rate_hz,
            mixer_phase: 0.0,
            mixer_phase_inc,
            wfm_decoder: (modulation == Modulation::Wfm)
                .then(|| WfmStereoDecoder::new(channel_sample_rate_hz, 2, true, WFM_DEEMPHASIS_US)),
            iq_agc: iq_agc_for_mode(modulation, channel_sample_rate_hz as f32),
            audio_agc: agc_for_mode(modulation, OUTPUT_SAMPLE_RATE_HZ as f32),
            audio_dc: dc_for_mode(modulation),
            squelch,
            scratch_mixed_i: Vec::with_capacity(block_size),
            scratch_mixed_q: Vec::with_capacity(block_size),
            scratch_filtered_i: Vec::with_capacity(block_size),
            scratch_filtered_q: Vec::with_capacity(block_size),
            scratch_decimated: Vec::with_capacity(block_size / decim_factor.max(1) + 1),
        }
    }

    fn mixer_phase_inc(channel_if_hz: f64, sdr_sample_rate_hz: f64) -> f64 {
        if sdr_sample_rate_hz <= 0.0 {
            0.0
        } else {
            2.0 * std::f64::consts::PI * channel_if_hz / sdr_sample_rate_hz
        }
    }

    /// Pick a decimation factor landing the channel rate at least
    /// `2*bandwidth` above the output rate (spec §4.4 step 3).
    fn pipeline_rates(modulation: Modulation, sdr_sample_rate_hz: f64, bandwidth_hz: u32) -> (usize, u32) {
        if sdr_sample_rate_hz <= 0.0 {
            return (1, OUTPUT_SAMPLE_RATE_HZ);
        }
        let target_rate = if modulation == Modulation::Wfm {
            (bandwidth_hz * 2).max(OUTPUT_SAMPLE_RATE_HZ * 4)
        } else {
            (bandwidth_hz * 2).max(OUTPUT_SAMPLE_RATE_HZ)
        };
        let decim_factor = ((sdr_sample_rate_hz / target_rate.max(1) as f64) as usize).max(1);
        let channel_rate = ((sdr_sample_rate_hz / decim_factor as f64) as u32).max(1);
        (decim_factor, channel_rate)
    }

    fn cutoff_norm(bandwidth_hz: u32, channel_sample_rate_hz: u32, sdr_sample_rate_hz: f64) -> f32 {
        if sdr_sample_rate_hz <= 0.0 {
            return 0.1;
        }
        let cutoff_hz = bandwidth_hz.min(channel_sample_rate_hz.saturating_sub(1)) as f32 / 2.0;
        (cutoff_hz / sdr_sample_rate_hz as f32).min(0.499)
    }

    /// Linear-interpolation resample from `channel_sample_rate_hz` to
    /// `OUTPUT_SAMPLE_RATE_HZ` (spec §4.4 step 5). Each chunk is resampled
    /// independently (no phase carried across chunks), trading a small
    /// amount of resampling jitter at chunk boundaries for a much simpler
    /// implementation than a true polyphase streaming resampler.
    fn resample_audio(&self, input: &[f32], channels: u8) -> Vec<f32> {
        let channels = channels.max(1) as usize;
        let frames_in = input.len() / channels;
        if frames_in == 0 {
            return Vec::new();
        }
        if self.channel_sample_rate_hz == OUTPUT_SAMPLE_RATE_HZ {
            return input.to_vec();
        }
        let ratio = self.channel_sample_rate_hz as f64 / OUTPUT_SAMPLE_RATE_HZ as f64;
        let frames_out = ((frames_in as f64 / ratio) as usize).max(1);
        let mut out = Vec::with_capacity(frames_out * channels);
        for out_idx in 0..frames_out {
            let pos = out_idx as f64 * ratio;
            let idx0 = (pos.floor() as usize).min(frames_in - 1);
            let idx1 = (idx0 + 1).min(frames_in - 1);
            let frac = (pos - idx0 as f64) as f32;
            for ch in 0..channels {
                let a = input[idx0 * channels + ch];
                let b = input[idx1 * channels + ch];
                out.push(a + (b - a) * frac);
            }
        }
        out
    }

    pub fn set_channel_if_hz(&mut self, channel_if_hz: f64) {
        self.mixer_phase_inc = Self::mixer_phase_inc(channel_if_hz, self.sdr_sample_rate_hz);
    }

    /// Rebuild filters/AGCs/decimation for a new mode or bandwidth (spec
    /// §4.6 `apply_tracking_update`/`set` calling into the channel).
    pub fn reconfigure(&mut self, modulation: Modulation, bandwidth_hz: u32) {
        self.modulation = modulation;
        self.demodulator = Demodulator::for_mode(modulation);
        self.bandwidth_hz = bandwidth_hz;
        let (decim_factor, channel_sample_rate_hz) =
            Self::pipeline_rates(modulation, self.sdr_sample_rate_hz, bandwidth_hz);
        let cutoff_norm = Self::cutoff_norm(bandwidth_hz, channel_sample_rate_hz, self.sdr_sample_rate_hz);
        self.lpf = BlockFirFilterPair::new(cutoff_norm, FIR_TAPS, self.block_size);
        self.decim_factor = decim_factor;
        self.decim_counter = 0;
        self.channel_sample_rate_hz = channel_sample_rate_hz;
        self.wfm_decoder = (modulation == Modulation::Wfm)
            .then(|| WfmStereoDecoder::new(channel_sample_rate_hz, 2, true, WFM_DEEMPHASIS_US));
        self.iq_agc = iq_agc_for_mode(modulation, channel_sample_rate_hz as f32);
        self.audio_agc = agc_for_mode(modulation, OUTPUT_SAMPLE_RATE_HZ as f32);
        self.audio_dc = dc_for_mode(modulation);
    }

    pub fn set_squelch(&mut self, squelch: i16) {
        self.squelch = squelch;
    }

    pub fn wfm_stereo_detected(&self) -> bool {
        self.wfm_decoder.as_ref().map(WfmStereoDecoder::stereo_detected).unwrap_or(false)
    }

    /// Demodulate one IQ chunk (spec §4.4 steps 1-6, minus step 6's
    /// session/VFOState tagging, which belongs to the caller).
    pub fn process(&mut self, block: &[Complex<f32>]) -> ChannelAudio {
        let n = block.len();
        if n == 0 {
            return ChannelAudio {
                samples: Vec::new(),
                channels: 1,
                channel_power_db: f32::NEG_INFINITY,
            };
        }

        self.scratch_mixed_i.resize(n, 0.0);
        self.scratch_mixed_q.resize(n, 0.0);

        let phase_start = self.mixer_phase;
        let phase_inc = self.mixer_phase_inc;
        let (mut sin_phase, mut cos_phase) = phase_start.sin_cos();
        let (sin_inc, cos_inc) = phase_inc.sin_cos();
        for (idx, sample) in block.iter().enumerate() {
            let lo_re = cos_phase as f32;
            let lo_im = -(sin_phase as f32);
            self.scratch_mixed_i[idx] = sample.re * lo_re - sample.im * lo_im;
            self.scratch_mixed_q[idx] = sample.re * lo_im + sample.im * lo_re;
            let next_sin = sin_phase * cos_inc + cos_phase * sin_inc;
            let next_cos = cos_phase * cos_inc - sin_phase * sin_inc;
            sin_phase = next_sin;
            cos_phase = next_cos;
        }
        self.mixer_phase = (phase_start + n as f64 * phase_inc).rem_euclid(std::f64::consts::TAU);

        self.lpf.filter_block_into(
            &self.scratch_mixed_i,
            &self.scratch_mixed_q,
            &mut self.scratch_filtered_i,
            &mut self.scratch_filtered_q,
        );

        self.scratch_decimated.clear();
        for idx in 0..n {
            self.decim_counter += 1;
            if self.decim_counter >= self.decim_factor {
                self.decim_counter = 0;
                let fi = self.scratch_filtered_i.get(idx).copied().unwrap_or(0.0);
                let fq = self.scratch_filtered_q.get(idx).copied().unwrap_or(0.0);
                self.scratch_decimated.push(Complex::new(fi, fq));
            }
        }

        if self.scratch_decimated.is_empty() {
            return ChannelAudio {
                samples: Vec::new(),
                channels: 1,
                channel_power_db: f32::NEG_INFINITY,
            };
        }

        let power: f32 = self
            .scratch_decimated
            .iter()
            .map(|s| s.re * s.re + s.im * s.im)
            .sum::<f32>()
            / self.scratch_decimated.len() as f32;
        let channel_power_db = 10.0 * power.max(1e-12).log10();

        if let Some(iq_agc) = &mut self.iq_agc {
            for sample in self.scratch_decimated.iter_mut() {
                *sample = iq_agc.process_complex(*sample);
            }
        }

        if self.squelch != i16::MIN && channel_power_db < self.squelch as f32 {
            let channels = if self.wfm_decoder.is_some() { 2 } else { 1 };
            let zeros = vec![0.0; self.scratch_decimated.len() * channels as usize];
            return ChannelAudio {
                samples: self.resample_audio(&zeros, channels),
                channels,
                channel_power_db,
            };
        }

        let (samples, channels) = if let Some(decoder) = self.wfm_decoder.as_mut() {
            let composite = self.demodulator.demodulate(&self.scratch_decimated);
            let out = decoder.process(&composite);
            (out, decoder.channels())
        } else {
            let mut raw = self.demodulator.demodulate(&self.scratch_decimated);
            for sample in &mut raw {
                if let Some(dc) = &mut self.audio_dc {
                    *sample = dc.process(*sample);
                }
                *sample = self.audio_agc.process(*sample);
            }
            (raw, 1)
        };

        ChannelAudio {
            samples: self.resample_audio(&samples, channels),
            channels,
            channel_power_db,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processes_silence_without_panicking() {
        let mut channel = Channel::new(0.0, Modulation::Usb, 3_000, 48_000.0, 4096, i16::MIN);
        let block = vec![Complex::new(0.0_f32, 0.0_f32); 4096];
        let out = channel.process(&block);
        assert_eq!(out.channels, 1);
    }

    #[test]
    fn squelch_zeroes_weak_signal() {
        let mut channel = Channel::new(0.0, Modulation::Usb, 3_000, 48_000.0, 4096, -20);
        let block = vec![Complex::new(0.0001_f32, 0.0_f32); 4096];
        let out = channel.process(&block);
        assert!(out.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn reconfigure_switches_demodulator() {
        let mut channel = Channel::new(0.0, Modulation::Usb, 3_000, 48_000.0, 4096, i16::MIN);
        channel.reconfigure(Modulation::Fm, 12_500);
        assert_eq!(channel.demodulator, Demodulator::Fm);
    }
}
