// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Goertzel single-tone CW (Morse) decoder with auto tone/WPM tracking.

use serde::{Deserialize, Serialize};

use crate::decoder::Decoder;
use crate::frame::{DecodedFrame, DecoderStatus};

fn morse_lookup(code: &str) -> Option<char> {
    match code {
        ".-" => Some('A'),
        "-..." => Some('B'),
        "-.-." => Some('C'),
        "-.." => Some('D'),
        "." => Some('E'),
        "..-." => Some('F'),
        "--." => Some('G'),
        "...." => Some('H'),
        ".." => Some('I'),
        ".---" => Some('J'),
        "-.-" => Some('K'),
        ".-.." => Some('L'),
        "--" => Some('M'),
        "-." => Some('N'),
        "---" => Some('O'),
        ".--." => Some('P'),
        "--.-" => Some('Q'),
        ".-." => Some('R'),
        "..." => Some('S'),
        "-" => Some('T'),
        "..-" => Some('U'),
        "...-" => Some('V'),
        ".--" => Some('W'),
        "-..-" => Some('X'),
        "-.--" => Some('Y'),
        "--.." => Some('Z'),
        "-----" => Some('0'),
        ".----" => Some('1'),
        "..---" => Some('2'),
        "...--" => Some('3'),
        "....-" => Some('4'),
        "....." => Some('5'),
        "-...." => Some('6'),
        "--..." => Some('7'),
        "---.." => Some('8'),
        "----." => Some('9'),
        ".-.-.-" => Some('.'),
        "--..--" => Some(','),
        "..--.." => Some('?'),
        ".----." => Some('\''),
        "-.-.--" => Some('!'),
        "-..-." => Some('/'),
        _ => None,
    }
}

fn goertzel_energy(buf: &[f32], coeff: f32) -> f32 {
    let mut s1: f32 = 0.0;
    let mut s2: f32 = 0.0;
    for &sample in buf {
        let s0 = coeff * s1 - s2 + sample;
        s2 = s1;
        s1 = s0;
    }
    let n2 = (buf.len() * buf.len()) as f32;
    (s1 * s1 + s2 * s2 - coeff * s1 * s2) / n2
}

const TONE_SCAN_LOW_HZ: u32 = 300;
const TONE_SCAN_HIGH_HZ: u32 = 1200;
const TONE_SCAN_STEP_HZ: u32 = 25;
const TONE_STABLE_NEEDED: u32 = 3;
const THRESHOLD: f32 = 0.05;
const WINDOW_MS: u32 = 50;
const DEFAULT_TONE_HZ: u32 = 700;

struct ToneScanBin {
    freq_hz: u32,
    coeff: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CwEventInfo {
    pub text: String,
    pub wpm: u32,
    pub tone_hz: u32,
    pub signal_on: bool,
}

/// CW (Morse) decoder (spec §4.5 `CwToneDecoder`). Tracks tone frequency
/// and keying speed adaptively unless pinned with [`Self::set_tone_hz`] /
/// [`Self::set_wpm`].
pub struct CwToneDecoder {
    sample_rate_hz: u32,
    window_size: usize,
    sample_buf: Vec<f32>,
    sample_idx: usize,

    tone_freq_hz: u32,
    coeff: f32,

    tone_on: bool,
    tone_on_at: f64,
    tone_off_at: f64,
    current_symbol: String,
    sample_counter: u64,

    wpm: u32,
    auto_tone: bool,
    auto_wpm: bool,

    tone_scan_bins: Vec<ToneScanBin>,
    tone_stable_bin: i32,
    tone_stable_count: u32,

    on_durations: Vec<f64>,
    status: DecoderStatus,
}

impl CwToneDecoder {
    pub fn new(sample_rate_hz: u32) -> Self {
        let window_size = (sample_rate_hz as usize * WINDOW_MS as usize) / 1000;
        let coeff = goertzel_coeff(DEFAULT_TONE_HZ, window_size, sample_rate_hz);

        let mut tone_scan_bins = Vec::new();
        let mut f = TONE_SCAN_LOW_HZ;
        while f <= TONE_SCAN_HIGH_HZ {
            tone_scan_bins.push(ToneScanBin { freq_hz: f, coeff: goertzel_coeff(f, window_size, sample_rate_hz) });
            f += TONE_SCAN_STEP_HZ;
        }

        Self {
            sample_rate_hz,
            window_size,
            sample_buf: vec![0.0; window_size],
            sample_idx: 0,
            tone_freq_hz: DEFAULT_TONE_HZ,
            coeff,
            tone_on: false,
            tone_on_at: 0.0,
            tone_off_at: 0.0,
            current_symbol: String::new(),
            sample_counter: 0,
            wpm: 15,
            auto_tone: true,
            auto_wpm: true,
            tone_scan_bins,
            tone_stable_bin: -1,
            tone_stable_count: 0,
            on_durations: Vec::new(),
            status: DecoderStatus::Running,
        }
    }

    pub fn set_auto(&mut self, enabled: bool) {
        self.auto_tone = enabled;
        self.auto_wpm = enabled;
    }

    pub fn set_wpm(&mut self, wpm: u32) {
        self.wpm = wpm.clamp(5, 40);
        self.auto_wpm = false;
    }

    pub fn set_tone_hz(&mut self, tone_hz: u32) {
        let tone_hz = tone_hz.clamp(TONE_SCAN_LOW_HZ, TONE_SCAN_HIGH_HZ);
        self.auto_tone = false;
        self.recompute_goertzel(tone_hz);
    }

    fn recompute_goertzel(&mut self, new_freq_hz: u32) {
        self.tone_freq_hz = new_freq_hz;
        self.coeff = goertzel_coeff(new_freq_hz, self.window_size, self.sample_rate_hz);
    }

    fn unit_ms(&self) -> f64 {
        1200.0 / self.wpm as f64
    }

    fn now_ms(&self) -> f64 {
        self.sample_counter as f64 * 1000.0 / self.sample_rate_hz as f64
    }

    fn goertzel_detect(&self) -> bool {
        let tone_energy = goertzel_energy(&self.sample_buf, self.coeff);
        let total_energy: f32 = self.sample_buf.iter().map(|s| s * s).sum();
        let avg_energy = total_energy / self.sample_buf.len() as f32;
        if avg_energy < 1e-10 {
            return false;
        }
        (tone_energy / avg_energy) > THRESHOLD
    }

    fn auto_detect_tone(&mut self) {
        let total_energy: f32 = self.sample_buf.iter().map(|s| s * s).sum();
        let avg_energy = total_energy / self.sample_buf.len() as f32;
        if avg_energy < 1e-10 {
            return;
        }

        let mut best_idx: i32 = -1;
        let mut best_ratio: f32 = 0.0;
        for (i, bin) in self.tone_scan_bins.iter().enumerate() {
            let ratio = goertzel_energy(&self.sample_buf, bin.coeff) / avg_energy;
            if ratio > best_ratio {
                best_ratio = ratio;
                best_idx = i as i32;
            }
        }

        if best_ratio < THRESHOLD || best_idx < 0 {
            self.tone_stable_count = 0;
            self.tone_stable_bin = -1;
            return;
        }

        if self.tone_stable_bin >= 0 && (best_idx - self.tone_stable_bin).unsigned_abs() <= 1 {
            self.tone_stable_count += 1;
        } else {
            self.tone_stable_bin = best_idx;
            self.tone_stable_count = 1;
        }

        if self.tone_stable_count >= TONE_STABLE_NEEDED {
            let detected_freq_hz = self.tone_scan_bins[self.tone_stable_bin as usize].freq_hz;
            if (detected_freq_hz as i32 - self.tone_freq_hz as i32).unsigned_abs() > TONE_SCAN_STEP_HZ {
                self.recompute_goertzel(detected_freq_hz);
            }
        }
    }

    fn auto_detect_wpm(&mut self) {
        if self.on_durations.len() < 8 {
            return;
        }
        let mut sorted = self.on_durations.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut best_boundary = 1usize;
        let mut best_score = f64::INFINITY;
        for i in 1..sorted.len() {
            let (c1, c2) = sorted.split_at(i);
            let mean1: f64 = c1.iter().sum::<f64>() / c1.len() as f64;
            let mean2: f64 = c2.iter().sum::<f64>() / c2.len() as f64;
            let score: f64 = c1.iter().map(|v| (v - mean1) * (v - mean1)).sum::<f64>()
                + c2.iter().map(|v| (v - mean2) * (v - mean2)).sum::<f64>();
            if score < best_score {
                best_score = score;
                best_boundary = i;
            }
        }

        let dit_cluster = &sorted[..best_boundary];
        if dit_cluster.is_empty() {
            return;
        }
        let dit_ms = dit_cluster[dit_cluster.len() / 2];
        if dit_ms < 10.0 {
            return;
        }
        self.wpm = (1200.0 / dit_ms).round().clamp(5.0, 40.0) as u32;
    }

    fn process_window(&mut self, out: &mut Vec<CwEventInfo>) {
        if self.auto_tone {
            self.auto_detect_tone();
        }

        let detected = self.goertzel_detect();
        let now = self.now_ms();

        if detected && !self.tone_on {
            self.tone_on = true;
            if self.tone_off_at > 0.0 {
                let off_duration = now - self.tone_off_at;
                let u = self.unit_ms();
                if off_duration > u * 5.0 {
                    self.flush_symbol(out);
                    out.push(self.event(" "));
                } else if off_duration > u * 2.0 {
                    self.flush_symbol(out);
                }
            }
            self.tone_on_at = now;
        } else if !detected && self.tone_on {
            self.tone_on = false;
            let on_duration = now - self.tone_on_at;
            let u = self.unit_ms();
            self.current_symbol.push(if on_duration > u * 2.0 { '-' } else { '.' });
            self.tone_off_at = now;

            if self.auto_wpm {
                self.on_durations.push(on_duration);
                if self.on_durations.len() > 30 {
                    self.on_durations.remove(0);
                }
                self.auto_detect_wpm();
            }
        }

        if !self.tone_on && !self.current_symbol.is_empty() && self.tone_off_at > 0.0 {
            let silence = now - self.tone_off_at;
            if silence > self.unit_ms() * 5.0 {
                self.flush_symbol(out);
            }
        }
    }

    fn flush_symbol(&mut self, out: &mut Vec<CwEventInfo>) {
        if self.current_symbol.is_empty() {
            return;
        }
        let ch = morse_lookup(&self.current_symbol).unwrap_or('?');
        self.current_symbol.clear();
        out.push(self.event(&ch.to_string()));
    }

    fn event(&self, text: &str) -> CwEventInfo {
        CwEventInfo { text: text.to_string(), wpm: self.wpm, tone_hz: self.tone_freq_hz, signal_on: self.tone_on }
    }
}

fn goertzel_coeff(freq_hz: u32, window_size: usize, sample_rate_hz: u32) -> f32 {
    let k = (freq_hz as f32 * window_size as f32 / sample_rate_hz as f32).round();
    let omega = (2.0 * std::f32::consts::PI * k) / window_size as f32;
    2.0 * omega.cos()
}

impl Decoder for CwToneDecoder {
    fn feed_audio(&mut self, samples: &[f32]) -> Vec<DecodedFrame> {
        let mut events = Vec::new();
        for &s in samples {
            self.sample_buf[self.sample_idx] = s;
            self.sample_idx += 1;
            self.sample_counter += 1;
            if self.sample_idx >= self.window_size {
                self.process_window(&mut events);
                self.sample_idx = 0;
            }
        }
        events
            .into_iter()
            .map(|event| DecodedFrame {
                payload: event.text.clone().into_bytes(),
                metadata: serde_json::to_value(&event).unwrap_or(serde_json::Value::Null),
                timestamp_ns: 0,
            })
            .collect()
    }

    fn status(&self) -> DecoderStatus {
        self.status
    }

    fn reset(&mut self) {
        let tone = self.tone_freq_hz;
        self.sample_buf.fill(0.0);
        self.sample_idx = 0;
        self.tone_on = false;
        self.tone_on_at = 0.0;
        self.tone_off_at = 0.0;
        self.current_symbol.clear();
        self.sample_counter = 0;
        self.recompute_goertzel(tone);
        self.tone_stable_bin = -1;
        self.tone_stable_count = 0;
        self.on_durations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_samples(freq_hz: f32, sample_rate_hz: u32, n: usize, amplitude: f32) -> Vec<f32> {
        (0..n)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq_hz * i as f32 / sample_rate_hz as f32).sin())
            .collect()
    }

    #[test]
    fn silence_emits_no_events() {
        let mut decoder = CwToneDecoder::new(8_000);
        let silence = vec![0.0f32; 8_000];
        assert!(decoder.feed_audio(&silence).is_empty());
    }

    #[test]
    fn steady_tone_is_detected_as_on() {
        let mut decoder = CwToneDecoder::new(8_000);
        decoder.set_auto(false);
        decoder.set_tone_hz(700);
        let tone = tone_samples(700.0, 8_000, 8_000, 0.8);
        let _ = decoder.feed_audio(&tone);
        assert!(decoder.tone_on);
    }

    #[test]
    fn reset_clears_symbol_and_pending_state() {
        let mut decoder = CwToneDecoder::new(8_000);
        decoder.current_symbol.push('.');
        decoder.tone_on = true;
        decoder.reset();
        assert!(decoder.current_symbol.is_empty());
        assert!(!decoder.tone_on);
    }

    #[test]
    fn set_wpm_clamps_to_valid_range() {
        let mut decoder = CwToneDecoder::new(8_000);
        decoder.set_wpm(200);
        assert_eq!(decoder.wpm, 40);
        decoder.set_wpm(0);
        assert_eq!(decoder.wpm, 5);
    }
}
