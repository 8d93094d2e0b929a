// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;

use super::math::demod_fm_with_prev;

/// FM/WFM quadrature discriminator (spec §4.4 step 4).
pub(super) fn demod_fm(samples: &[Complex<f32>]) -> Vec<f32> {
    let mut prev = None;
    demod_fm_with_prev(samples, &mut prev)
}

#[cfg(test)]
mod tests {
    use super::demod_fm;
    use num_complex::Complex;
    use std::f32::consts::TAU;

    fn complex_tone(freq_norm: f32, len: usize) -> Vec<Complex<f32>> {
        (0..len)
            .map(|n| Complex::from_polar(1.0, TAU * freq_norm * n as f32))
            .collect()
    }

    #[test]
    fn tone_frequency_is_recovered() {
        let input = complex_tone(0.25, 16);
        let out = demod_fm(&input);
        assert_eq!(out.len(), 16);
        assert!(out[0].abs() < 1e-6);
        for &sample in &out[1..] {
            assert!((sample - 0.5).abs() < 0.01);
        }
    }

    #[test]
    fn silence_is_zero() {
        let input: Vec<Complex<f32>> = (0..8).map(|_| Complex::new(1.0, 0.0)).collect();
        let out = demod_fm(&input);
        assert!(out.iter().all(|&v| v.abs() < 1e-6));
    }
}
