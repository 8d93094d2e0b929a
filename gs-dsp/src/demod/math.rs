// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;

#[inline]
fn fast_atan(z: f32) -> f32 {
    let abs_z = z.abs();
    if abs_z <= 1.0 {
        z * (std::f32::consts::FRAC_PI_4 + 0.273 * (1.0 - abs_z))
    } else {
        let inv = 1.0 / z;
        let base = inv * (std::f32::consts::FRAC_PI_4 + 0.273 * (1.0 - inv.abs()));
        if z > 0.0 {
            std::f32::consts::FRAC_PI_2 - base
        } else {
            -std::f32::consts::FRAC_PI_2 - base
        }
    }
}

#[inline]
pub(super) fn fast_atan2(y: f32, x: f32) -> f32 {
    if x == 0.0 {
        if y > 0.0 {
            return std::f32::consts::FRAC_PI_2;
        }
        if y < 0.0 {
            return -std::f32::consts::FRAC_PI_2;
        }
        return 0.0;
    }

    if x > 0.0 {
        fast_atan(y / x)
    } else if y >= 0.0 {
        fast_atan(y / x) + std::f32::consts::PI
    } else {
        fast_atan(y / x) - std::f32::consts::PI
    }
}

/// FM quadrature discriminator: instantaneous frequency via `arg(s[n] * conj(s[n-1]))`
/// (spec §4.4 step 4 "FM"), scaled to `[-1, 1]`.
pub(super) fn demod_fm_with_prev(samples: &[Complex<f32>], prev: &mut Option<Complex<f32>>) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let inv_pi = std::f32::consts::FRAC_1_PI;
    let mut output = Vec::with_capacity(samples.len());

    if let Some(prev_sample) = prev.as_ref().copied() {
        let product = samples[0] * prev_sample.conj();
        output.push(fast_atan2(product.im, product.re) * inv_pi);
    } else {
        output.push(0.0);
    }

    for idx in 1..samples.len() {
        let product = samples[idx] * samples[idx - 1].conj();
        output.push(fast_atan2(product.im, product.re) * inv_pi);
    }

    *prev = samples.last().copied();
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atan2_matches_std_within_tolerance() {
        for &(y, x) in &[(1.0_f32, 1.0_f32), (-1.0, 2.0), (3.0, -1.0), (-2.0, -3.0)] {
            let expected = y.atan2(x);
            let got = fast_atan2(y, x);
            assert!((got - expected).abs() < 0.01, "{got} vs {expected}");
        }
    }
}
