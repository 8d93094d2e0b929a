// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! FFT-based overlap-save FIR low-pass filtering (spec §4.4 step 2).
//!
//! Grounded on `dsp/filter.rs::BlockFirFilterPair`, kept as-is: an
//! overlap-save complex FIR implemented via `rustfft`, driven by a
//! windowed-sinc kernel.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex as FftComplex;
use rustfft::{Fft, FftPlanner};

fn windowed_sinc_coeffs(cutoff_norm: f32, taps: usize) -> Vec<f32> {
    assert!(taps >= 1, "FIR filter must have at least 1 tap");
    let m = (taps - 1) as f32;
    let mut coeffs = Vec::with_capacity(taps);
    for i in 0..taps {
        let x = i as f32 - m / 2.0;
        let sinc = if x == 0.0 {
            2.0 * cutoff_norm
        } else {
            (2.0 * PI * cutoff_norm * x).sin() / (PI * x)
        };
        let window = if taps == 1 {
            1.0
        } else {
            0.5 * (1.0 - (2.0 * PI * i as f32 / m).cos())
        };
        coeffs.push(sinc * window);
    }
    let sum: f32 = coeffs.iter().sum();
    if sum.abs() > 1e-12 {
        let inv = 1.0 / sum;
        for coeff in &mut coeffs {
            *coeff *= inv;
        }
    }
    coeffs
}

/// Overlap-save complex FIR low-pass filter (block interface).
pub struct BlockFirFilterPair {
    h_freq: Vec<FftComplex<f32>>,
    overlap: Vec<FftComplex<f32>>,
    n_taps: usize,
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    scratch_freq: Vec<FftComplex<f32>>,
}

impl BlockFirFilterPair {
    pub fn new(cutoff_norm: f32, taps: usize, block_size: usize) -> Self {
        let taps = taps.max(1);
        let coeffs = windowed_sinc_coeffs(cutoff_norm, taps);
        let fft_size = (block_size + taps - 1).next_power_of_two();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let ifft = planner.plan_fft_inverse(fft_size);

        let mut h_buf: Vec<FftComplex<f32>> = coeffs
            .iter()
            .map(|&coeff| FftComplex::new(coeff, 0.0))
            .collect();
        h_buf.resize(fft_size, FftComplex::new(0.0, 0.0));
        fft.process(&mut h_buf);

        Self {
            h_freq: h_buf,
            overlap: vec![FftComplex::new(0.0, 0.0); taps.saturating_sub(1)],
            n_taps: taps,
            fft_size,
            fft,
            ifft,
            scratch_freq: vec![FftComplex::new(0.0, 0.0); fft_size],
        }
    }

    pub fn filter_block_into(
        &mut self,
        input_i: &[f32],
        input_q: &[f32],
        output_i: &mut Vec<f32>,
        output_q: &mut Vec<f32>,
    ) {
        let n_new = input_i.len().min(input_q.len());
        let n_overlap = self.n_taps.saturating_sub(1);

        let buf = &mut self.scratch_freq;
        buf.clear();
        buf.extend(self.overlap.iter().copied());
        for idx in 0..n_new {
            buf.push(FftComplex::new(input_i[idx], input_q[idx]));
        }
        buf.resize(self.fft_size, FftComplex::new(0.0, 0.0));

        self.fft.process(buf);
        let scale = 1.0 / self.fft_size as f32;
        for (x, &h) in buf.iter_mut().zip(self.h_freq.iter()) {
            *x = FftComplex::new(
                (x.re * h.re - x.im * h.im) * scale,
                (x.re * h.im + x.im * h.re) * scale,
            );
        }
        self.ifft.process(buf);

        let end = (n_overlap + n_new).min(buf.len());
        output_i.clear();
        output_q.clear();
        for sample in &buf[n_overlap..end] {
            output_i.push(sample.re);
            output_q.push(sample.im);
        }

        if n_overlap > 0 {
            if n_new >= n_overlap {
                let new_start = n_new - n_overlap;
                for (dst, idx) in self.overlap.iter_mut().zip(new_start..n_new) {
                    *dst = FftComplex::new(input_i[idx], input_q[idx]);
                }
            } else {
                let keep_old = n_overlap - n_new;
                self.overlap.copy_within(n_new..n_overlap, 0);
                for (dst, idx) in self.overlap[keep_old..].iter_mut().zip(0..n_new) {
                    *dst = FftComplex::new(input_i[idx], input_q[idx]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_dc_blocks_nyquist() {
        let mut filter = BlockFirFilterPair::new(0.05, 63, 256);
        let dc_i = vec![1.0_f32; 256];
        let dc_q = vec![0.0_f32; 256];
        let mut out_i = Vec::new();
        let mut out_q = Vec::new();
        // Run a few blocks through to let the overlap-save history settle.
        for _ in 0..4 {
            filter.filter_block_into(&dc_i, &dc_q, &mut out_i, &mut out_q);
        }
        let mean: f32 = out_i.iter().sum::<f32>() / out_i.len() as f32;
        assert!((mean - 1.0).abs() < 0.1, "expected DC passthrough, got {mean}");
    }
}
