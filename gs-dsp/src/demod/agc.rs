// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;

/// Single-pole DC blocker used on narrowband audio paths (spec §4.4 step 4
/// "AM"). Grounded on `demod.rs::DcBlocker`.
#[derive(Debug, Clone)]
pub(crate) struct DcBlocker {
    r: f32,
    x1: f32,
    y1: f32,
}

impl DcBlocker {
    pub(crate) fn new(r: f32) -> Self {
        Self {
            r: r.clamp(0.9, 0.9999),
            x1: 0.0,
            y1: 0.0,
        }
    }

    pub(crate) fn process(&mut self, x: f32) -> f32 {
        let y = x - self.x1 + self.r * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }
}

/// Fast-attack/slow-release soft AGC (spec §4.4's audio path needs some gain
/// normalization upstream of the VFO manager's volume scaling). Grounded on
/// `demod.rs::SoftAgc`.
#[derive(Debug, Clone)]
pub(crate) struct SoftAgc {
    gain: f32,
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
    target: f32,
    max_gain: f32,
}

impl SoftAgc {
    pub(crate) fn new(sample_rate: f32, attack_ms: f32, release_ms: f32, target: f32, max_gain_db: f32) -> Self {
        let sr = sample_rate.max(1.0);
        let attack_coeff = 1.0 - (-1.0 / (attack_ms * 1e-3 * sr)).exp();
        let release_coeff = 1.0 - (-1.0 / (release_ms * 1e-3 * sr)).exp();
        Self {
            gain: 1.0,
            envelope: 0.0,
            attack_coeff,
            release_coeff,
            target: target.max(0.01),
            max_gain: 10.0_f32.powf(max_gain_db / 20.0),
        }
    }

    fn update_gain(&mut self, level: f32) -> f32 {
        let env_coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope += env_coeff * (level - self.envelope);
        if self.envelope > 1e-6 {
            let desired = (self.target / self.envelope).min(self.max_gain);
            let gain_coeff = if desired < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain += gain_coeff * (desired - self.gain);
        }
        self.gain
    }

    pub(crate) fn process(&mut self, x: f32) -> f32 {
        let gain = self.update_gain(x.abs());
        (x * gain).clamp(-1.0, 1.0)
    }

    pub(crate) fn process_complex(&mut self, x: Complex<f32>) -> Complex<f32> {
        let gain = self.update_gain((x.re * x.re + x.im * x.im).sqrt());
        let mut y = x * gain;
        let mag = (y.re * y.re + y.im * y.im).sqrt();
        if mag > 1.0 {
            y /= mag;
        }
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_blocker_removes_constant_offset() {
        let mut blocker = DcBlocker::new(0.9999);
        let mut last = 0.0;
        for _ in 0..5000 {
            last = blocker.process(1.0);
        }
        assert!(last.abs() < 0.01, "expected DC removed, got {last}");
    }

    #[test]
    fn agc_converges_toward_target() {
        let mut agc = SoftAgc::new(48_000.0, 5.0, 500.0, 0.5, 30.0);
        let mut last = 0.0;
        for _ in 0..20_000 {
            last = agc.process(0.05);
        }
        assert!((last.abs() - 0.5).abs() < 0.1, "expected convergence near 0.5, got {last}");
    }
}
