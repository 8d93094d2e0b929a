// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;

/// AM envelope detector: magnitude of IQ (spec §4.4 step 4 "AM"). DC removal
/// happens downstream via [`super::DcBlocker`].
pub(super) fn demod_am(samples: &[Complex<f32>]) -> Vec<f32> {
    samples.iter().map(|s| (s.re * s.re + s.im * s.im).sqrt()).collect()
}

#[cfg(test)]
mod tests {
    use super::demod_am;
    use num_complex::Complex;

    #[test]
    fn constant_magnitude() {
        let input: Vec<Complex<f32>> = (0..8).map(|_| Complex::new(1.0, 0.0)).collect();
        let out = demod_am(&input);
        assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn varying_magnitude() {
        let input = vec![
            Complex::new(0.0_f32, 0.0),
            Complex::new(1.0, 0.0),
            Complex::new(0.0, 0.0),
            Complex::new(3.0, 4.0),
        ];
        let out = demod_am(&input);
        assert_eq!(out, vec![0.0, 1.0, 0.0, 5.0]);
    }
}
