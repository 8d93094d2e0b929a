// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! FFT/waterfall processing (spec §4.3). Grounded on
//! `dsp/spectrum.rs::SpectrumSnapshotter`'s Hann-window + rustfft + fftshift
//! pipeline, generalized from a fixed 1024-bin Hann-only snapshot to
//! configurable `fft_size`/`fft_window`/`fft_averaging`/`fft_overlap` with
//! the per-second stats reporting spec §4.3 step 5 names.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};

use num_complex::Complex;
use rustfft::num_complex::Complex as FftComplex;
use rustfft::{Fft, FftPlanner};

use gs_core::IqMessage;

/// Window function applied before the FFT (spec §4.3 "Parameters").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftWindow {
    Hanning,
    Hamming,
    Blackman,
    Kaiser,
    Bartlett,
}

impl FftWindow {
    /// Tie-break for an unrecognized window name is hanning (spec §4.3
    /// "Edge cases").
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "hamming" => Self::Hamming,
            "blackman" => Self::Blackman,
            "kaiser" => Self::Kaiser,
            "bartlett" => Self::Bartlett,
            _ => Self::Hanning,
        }
    }
}

fn bessel_i0(x: f32) -> f32 {
    let mut sum = 1.0_f32;
    let mut term = 1.0_f32;
    let half_x_sq = (x / 2.0) * (x / 2.0);
    for k in 1..=20 {
        term *= half_x_sq / (k * k) as f32;
        sum += term;
    }
    sum
}

fn build_window(window: FftWindow, n: usize) -> Vec<f32> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let m = (n - 1) as f32;
    match window {
        FftWindow::Hanning => (0..n).map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / m).cos())).collect(),
        FftWindow::Hamming => (0..n).map(|i| 0.54 - 0.46 * (2.0 * PI * i as f32 / m).cos()).collect(),
        FftWindow::Blackman => (0..n)
            .map(|i| {
                let x = 2.0 * PI * i as f32 / m;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect(),
        FftWindow::Bartlett => (0..n).map(|i| 1.0 - (2.0 * (i as f32 - m / 2.0) / m).abs()).collect(),
        FftWindow::Kaiser => {
            const BETA: f32 = 8.6;
            let i0_beta = bessel_i0(BETA);
            (0..n)
                .map(|i| {
                    let ratio = (2.0 * i as f32 / m) - 1.0;
                    bessel_i0(BETA * (1.0 - ratio * ratio).max(0.0).sqrt()) / i0_beta
                })
                .collect()
        }
    }
}

/// One row of a waterfall/spectrum display (spec §4.3 "Contract").
#[derive(Debug, Clone)]
pub struct WaterfallRow {
    pub power_db: Arc<[f32]>,
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    pub timestamp_ns: u64,
}

/// Processing statistics emitted every second (spec §4.3 step 5).
#[derive(Debug, Clone, Copy, Default)]
pub struct FftStats {
    pub chunks_in: u64,
    pub samples_in: u64,
    pub results_out: u64,
    pub errors: u64,
    pub timeouts: u64,
}

/// Whether consecutive FFT segments within a chunk overlap (spec §4.3
/// "Parameters").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftOverlap {
    None,
    Half,
}

pub struct FftProcessorConfig {
    pub fft_size: usize,
    pub window: FftWindow,
    pub averaging: usize,
    pub overlap: FftOverlap,
}

impl Default for FftProcessorConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            window: FftWindow::Hanning,
            averaging: 1,
            overlap: FftOverlap::None,
        }
    }
}

/// Turns a stream of [`IqMessage`]s into [`WaterfallRow`]s (spec §4.3).
pub struct FftProcessor {
    fft_size: usize,
    window_coeffs: Vec<f32>,
    window_power: f32,
    overlap: FftOverlap,
    averaging_depth: usize,
    fft: Arc<dyn Fft<f32>>,
    averager: Vec<f32>,
    averager_count: usize,
    stats: FftStats,
    stats_window_start: Instant,
}

impl FftProcessor {
    pub fn new(config: FftProcessorConfig) -> Self {
        let fft_size = config.fft_size.max(2);
        let window_coeffs = build_window(config.window, fft_size);
        let window_power = window_coeffs.iter().map(|w| w * w).sum::<f32>() / fft_size as f32;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft_size,
            window_coeffs,
            window_power,
            overlap: config.overlap,
            averaging_depth: config.averaging.max(1),
            fft,
            averager: vec![0.0; fft_size],
            averager_count: 0,
            stats: FftStats::default(),
            stats_window_start: Instant::now(),
        }
    }

    fn segment_stride(&self) -> usize {
        match self.overlap {
            FftOverlap::None => self.fft_size,
            FftOverlap::Half => self.fft_size / 2,
        }
    }

    fn segment_window_power(&self) -> f32 {
        match self.overlap {
            FftOverlap::None => self.window_power,
            FftOverlap::Half => 1.0,
        }
    }

    fn compute_segment_db(&self, segment: &[Complex<f32>]) -> Vec<f32> {
        let n = self.fft_size;
        let mut buf: Vec<FftComplex<f32>> = segment
            .iter()
            .zip(self.window_coeffs.iter())
            .map(|(s, &w)| FftComplex::new(s.re * w, s.im * w))
            .collect();
        self.fft.process(&mut buf);

        let half = n / 2;
        let w = self.segment_window_power().max(1e-12);
        buf[half..]
            .iter()
            .chain(buf[..half].iter())
            .map(|v| {
                let power = (v.re * v.re + v.im * v.im) / (n as f32 * w);
                10.0 * (power + 1e-12).log10()
            })
            .collect()
    }

    /// Discard averager state, e.g. after a retune/rate change (spec §4.3
    /// "Edge cases" / `IqMessage::reset_averager`).
    pub fn reset_averager(&mut self) {
        self.averager.iter_mut().for_each(|v| *v = 0.0);
        self.averager_count = 0;
    }

    /// Process one IQ chunk, returning zero or more waterfall rows (a row is
    /// emitted every `fft_averaging` inputs, spec §4.3 step 4).
    pub fn process(&mut self, msg: &IqMessage) -> Vec<WaterfallRow> {
        self.stats.chunks_in += 1;
        self.stats.samples_in += msg.samples.len() as u64;

        if msg.reset_averager {
            self.reset_averager();
        }

        let stride = self.segment_stride();
        if msg.samples.len() < self.fft_size || stride == 0 {
            return Vec::new();
        }

        let mut segment_dbs: Vec<Vec<f32>> = Vec::new();
        let mut start = 0;
        while start + self.fft_size <= msg.samples.len() {
            segment_dbs.push(self.compute_segment_db(&msg.samples[start..start + self.fft_size]));
            start += stride;
        }
        if segment_dbs.is_empty() {
            return Vec::new();
        }

        let mut chunk_row = vec![0.0_f32; self.fft_size];
        for row in &segment_dbs {
            for (acc, &v) in chunk_row.iter_mut().zip(row.iter()) {
                *acc += v;
            }
        }
        let n_segments = segment_dbs.len() as f32;
        for v in chunk_row.iter_mut() {
            *v /= n_segments;
        }

        for (acc, &v) in self.averager.iter_mut().zip(chunk_row.iter()) {
            *acc += v;
        }
        self.averager_count += 1;

        let mut rows = Vec::new();
        if self.averager_count >= self.averaging_depth {
            let depth = self.averager_count as f32;
            let row: Arc<[f32]> = self
                .averager
                .iter()
                .map(|v| v / depth)
                .collect::<Vec<_>>()
                .into();
            rows.push(WaterfallRow {
                power_db: row,
                center_freq_hz: msg.center_freq_hz,
                sample_rate_hz: msg.sample_rate_hz,
                timestamp_ns: msg.timestamp_ns,
            });
            self.reset_averager();
            self.stats.results_out += 1;
        }

        rows
    }

    /// Drains accumulated stats if a full second has elapsed, for the
    /// per-second reporting of spec §4.3 step 5.
    pub fn take_stats_if_due(&mut self) -> Option<FftStats> {
        if self.stats_window_start.elapsed() >= Duration::from_secs(1) {
            let stats = std::mem::take(&mut self.stats);
            self.stats_window_start = Instant::now();
            Some(stats)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    fn make_iq(n: usize, reset: bool) -> IqMessage {
        let samples: Vec<Complex<f32>> = (0..n).map(|i| Complex::new((i as f32 * 0.01).sin(), 0.0)).collect();
        IqMessage {
            samples: StdArc::from(samples),
            center_freq_hz: 100_000_000.0,
            sample_rate_hz: 2_048_000.0,
            timestamp_ns: 0,
            seq: 0,
            reset_averager: reset,
        }
    }

    #[test]
    fn short_chunk_is_skipped() {
        let mut proc = FftProcessor::new(FftProcessorConfig {
            fft_size: 1024,
            ..Default::default()
        });
        let rows = proc.process(&make_iq(100, false));
        assert!(rows.is_empty());
    }

    #[test]
    fn emits_one_row_per_averaging_depth() {
        let mut proc = FftProcessor::new(FftProcessorConfig {
            fft_size: 256,
            averaging: 3,
            ..Default::default()
        });
        let iq = make_iq(256, false);
        assert!(proc.process(&iq).is_empty());
        assert!(proc.process(&iq).is_empty());
        let rows = proc.process(&iq);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].power_db.len(), 256);
    }

    #[test]
    fn overlap_doubles_segment_count() {
        let mut none = FftProcessor::new(FftProcessorConfig {
            fft_size: 256,
            overlap: FftOverlap::None,
            ..Default::default()
        });
        let mut half = FftProcessor::new(FftProcessorConfig {
            fft_size: 256,
            overlap: FftOverlap::Half,
            ..Default::default()
        });
        let iq = make_iq(1024, false);
        let rows_none = none.process(&iq);
        let rows_half = half.process(&iq);
        assert_eq!(rows_none.len(), 1);
        assert_eq!(rows_half.len(), 1);
    }

    #[test]
    fn reset_averager_drops_partial_sum() {
        let mut proc = FftProcessor::new(FftProcessorConfig {
            fft_size: 256,
            averaging: 5,
            ..Default::default()
        });
        let iq = make_iq(256, false);
        proc.process(&iq);
        proc.process(&iq);
        assert_eq!(proc.averager_count, 2);
        let reset_iq = make_iq(256, true);
        proc.process(&reset_iq);
        assert_eq!(proc.averager_count, 1);
    }

    #[test]
    fn unknown_window_name_ties_break_to_hanning() {
        assert_eq!(FftWindow::parse("nonexistent"), FftWindow::Hanning);
        assert_eq!(FftWindow::parse("kaiser"), FftWindow::Kaiser);
    }
}
