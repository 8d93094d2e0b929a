// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;

/// USB/LSB/CW demodulator: the sideband is already centered at 0 Hz by the
/// mixer offset applied in [`super::Channel`] (spec §4.4 step 4
/// "USB/LSB/CW"), so demodulation is simply taking the real part.
pub(super) fn demod_real_part(samples: &[Complex<f32>]) -> Vec<f32> {
    samples.iter().map(|s| s.re).collect()
}

#[cfg(test)]
mod tests {
    use super::demod_real_part;
    use num_complex::Complex;

    #[test]
    fn takes_real_part() {
        let input = vec![
            Complex::new(1.0_f32, 2.0),
            Complex::new(3.0, 4.0),
            Complex::new(-1.0, 0.0),
        ];
        assert_eq!(demod_real_part(&input), vec![1.0, 3.0, -1.0]);
    }
}
