// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bell 202 AFSK correlation demodulator and AX.25/APRS framer. Grounded
//! on `original_source/backend/telemetry/ax25_parser.py` for the flag
//! byte, bit-stuffing, and FCS-16 constants.

use serde::{Deserialize, Serialize};

use crate::decoder::Decoder;
use crate::frame::{DecodedFrame, DecoderStatus};

const CRC_CCITT_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u16;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8408 } else { crc >> 1 };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

fn crc16ccitt(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in bytes {
        crc = (crc >> 8) ^ CRC_CCITT_TABLE[((crc ^ b as u16) & 0xFF) as usize];
    }
    crc ^ 0xFFFF
}

const BAUD: f32 = 1200.0;
const MARK_HZ: f32 = 1200.0;
const SPACE_HZ: f32 = 2200.0;
const TWO_PI: f32 = std::f32::consts::TAU;
const PLL_GAIN: f32 = 0.4;
const FLAG_FIELD_MIN_BITS: usize = 136;
const MIN_FRAME_BYTES: usize = 17;

struct RawFrame {
    payload: Vec<u8>,
    crc_ok: bool,
}

/// One correlation-filter instance. Two run in parallel at different
/// window widths so a slightly-off symbol clock still locks (see
/// [`AfskAx25Decoder::new`]).
struct CorrelationDemod {
    samples_per_bit: f32,

    energy_acc: f32,
    energy_count: usize,
    energy_window: usize,

    mark_phase: f32,
    space_phase: f32,
    mark_phase_inc: f32,
    space_phase_inc: f32,

    corr_len: usize,
    mark_i_buf: Vec<f32>,
    mark_q_buf: Vec<f32>,
    space_i_buf: Vec<f32>,
    space_q_buf: Vec<f32>,
    corr_idx: usize,
    mark_i_sum: f32,
    mark_q_sum: f32,
    space_i_sum: f32,
    space_q_sum: f32,

    last_bit: u8,
    bit_phase: f32,
    prev_sampled_bit: u8,

    ones: u32,
    frame_bits: Vec<u8>,
    in_frame: bool,

    frames: Vec<RawFrame>,
}

impl CorrelationDemod {
    fn new(sample_rate_hz: u32, window_factor: f32) -> Self {
        let sr = sample_rate_hz as f32;
        let samples_per_bit = sr / BAUD;
        let corr_len = (samples_per_bit * window_factor).round().max(2.0) as usize;
        let energy_window = (sr * 0.05).round() as usize;

        Self {
            samples_per_bit,
            energy_acc: 0.0,
            energy_count: 0,
            energy_window,
            mark_phase: 0.0,
            space_phase: 0.0,
            mark_phase_inc: TWO_PI * MARK_HZ / sr,
            space_phase_inc: TWO_PI * SPACE_HZ / sr,
            corr_len,
            mark_i_buf: vec![0.0; corr_len],
            mark_q_buf: vec![0.0; corr_len],
            space_i_buf: vec![0.0; corr_len],
            space_q_buf: vec![0.0; corr_len],
            corr_idx: 0,
            mark_i_sum: 0.0,
            mark_q_sum: 0.0,
            space_i_sum: 0.0,
            space_q_sum: 0.0,
            last_bit: 0,
            bit_phase: 0.0,
            prev_sampled_bit: 0,
            ones: 0,
            frame_bits: Vec::new(),
            in_frame: false,
            frames: Vec::new(),
        }
    }

    fn reset_state(&mut self) {
        self.mark_phase = 0.0;
        self.space_phase = 0.0;
        self.mark_i_buf.fill(0.0);
        self.mark_q_buf.fill(0.0);
        self.space_i_buf.fill(0.0);
        self.space_q_buf.fill(0.0);
        self.corr_idx = 0;
        self.mark_i_sum = 0.0;
        self.mark_q_sum = 0.0;
        self.space_i_sum = 0.0;
        self.space_q_sum = 0.0;
        self.last_bit = 0;
        self.bit_phase = 0.0;
        self.prev_sampled_bit = 0;
        self.ones = 0;
        self.frame_bits.clear();
        self.in_frame = false;
    }

    fn process_buffer(&mut self, samples: &[f32]) -> Vec<RawFrame> {
        for &s in samples {
            self.process_sample(s);
        }
        std::mem::take(&mut self.frames)
    }

    fn process_sample(&mut self, s: f32) {
        self.energy_acc += s * s;
        self.energy_count += 1;
        if self.energy_count >= self.energy_window {
            let rms = (self.energy_acc / self.energy_count as f32).sqrt();
            if rms < 0.001 {
                self.reset_state();
            }
            self.energy_acc = 0.0;
            self.energy_count = 0;
        }

        let m_i = s * self.mark_phase.cos();
        let m_q = s * self.mark_phase.sin();
        let s_i = s * self.space_phase.cos();
        let s_q = s * self.space_phase.sin();
        self.mark_phase += self.mark_phase_inc;
        self.space_phase += self.space_phase_inc;
        if self.mark_phase > TWO_PI {
            self.mark_phase -= TWO_PI;
        }
        if self.space_phase > TWO_PI {
            self.space_phase -= TWO_PI;
        }

        let idx = self.corr_idx;
        self.mark_i_sum += m_i - self.mark_i_buf[idx];
        self.mark_q_sum += m_q - self.mark_q_buf[idx];
        self.space_i_sum += s_i - self.space_i_buf[idx];
        self.space_q_sum += s_q - self.space_q_buf[idx];
        self.mark_i_buf[idx] = m_i;
        self.mark_q_buf[idx] = m_q;
        self.space_i_buf[idx] = s_i;
        self.space_q_buf[idx] = s_q;
        self.corr_idx = (idx + 1) % self.corr_len;

        let mark_energy = self.mark_i_sum * self.mark_i_sum + self.mark_q_sum * self.mark_q_sum;
        let space_energy = self.space_i_sum * self.space_i_sum + self.space_q_sum * self.space_q_sum;
        let bit: u8 = if mark_energy > space_energy { 1 } else { 0 };

        if bit != self.last_bit {
            self.last_bit = bit;
            let error = self.bit_phase - self.samples_per_bit / 2.0;
            self.bit_phase -= PLL_GAIN * error;
        }

        self.bit_phase -= 1.0;
        if self.bit_phase <= 0.0 {
            self.bit_phase += self.samples_per_bit;
            self.process_bit(bit);
        }
    }

    fn process_bit(&mut self, raw_bit: u8) {
        // NRZI: no transition = 1, transition = 0.
        let decoded_bit: u8 = if raw_bit == self.prev_sampled_bit { 1 } else { 0 };
        self.prev_sampled_bit = raw_bit;

        if decoded_bit == 1 {
            self.ones += 1;
            return;
        }

        if self.ones >= 7 {
            self.in_frame = false;
            self.frame_bits.clear();
            self.ones = 0;
            return;
        }
        if self.ones == 6 {
            if self.in_frame && self.frame_bits.len() >= FLAG_FIELD_MIN_BITS {
                if let Some(frame) = self.bits_to_bytes() {
                    self.frames.push(frame);
                }
            }
            self.frame_bits.clear();
            self.in_frame = true;
            self.ones = 0;
            return;
        }
        if self.ones == 5 {
            if self.in_frame {
                for _ in 0..5 {
                    self.frame_bits.push(1);
                }
            }
            self.ones = 0;
            return;
        }

        if self.in_frame {
            for _ in 0..self.ones {
                self.frame_bits.push(1);
            }
            self.frame_bits.push(0);
        }
        self.ones = 0;
    }

    fn bits_to_bytes(&self) -> Option<RawFrame> {
        let byte_len = self.frame_bits.len() / 8;
        if byte_len < MIN_FRAME_BYTES {
            return None;
        }
        let mut bytes = vec![0u8; byte_len];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let mut b: u8 = 0;
            for j in 0..8 {
                b |= self.frame_bits[i * 8 + j] << j;
            }
            *byte = b;
        }

        let payload = &bytes[..byte_len - 2];
        let fcs = bytes[byte_len - 2] as u16 | ((bytes[byte_len - 1] as u16) << 8);
        let crc_ok = crc16ccitt(payload) == fcs;

        Some(RawFrame { payload: payload.to_vec(), crc_ok })
    }
}

struct Ax25Address {
    call: String,
    ssid: u8,
    last: bool,
}

fn decode_ax25_address(bytes: &[u8], offset: usize) -> Ax25Address {
    let mut call = String::with_capacity(6);
    for i in 0..6 {
        let ch = bytes[offset + i] >> 1;
        if ch > 32 {
            call.push(ch as char);
        }
    }
    let call = call.trim_end().to_string();
    let ssid = (bytes[offset + 6] >> 1) & 0x0F;
    let last = (bytes[offset + 6] & 0x01) == 1;
    Ax25Address { call, ssid, last }
}

struct Ax25Frame {
    src: Ax25Address,
    dest: Ax25Address,
    digis: Vec<Ax25Address>,
    info: Vec<u8>,
}

fn parse_ax25(frame: &[u8]) -> Option<Ax25Frame> {
    if frame.len() < 16 {
        return None;
    }
    let dest = decode_ax25_address(frame, 0);
    let src = decode_ax25_address(frame, 7);

    let mut offset = 14;
    let mut digis = Vec::new();
    let mut last_addr = src.last;
    while !last_addr && offset + 7 <= frame.len() {
        let digi = decode_ax25_address(frame, offset);
        last_addr = digi.last;
        digis.push(digi);
        offset += 7;
    }

    if offset + 2 > frame.len() {
        return None;
    }
    let info = frame[offset + 2..].to_vec();

    Some(Ax25Frame { src, dest, digis, info })
}

fn format_call(addr: &Ax25Address) -> String {
    if addr.ssid != 0 {
        format!("{}-{}", addr.call, addr.ssid)
    } else {
        addr.call.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ax25PacketInfo {
    pub src_call: String,
    pub dest_call: String,
    pub path: String,
    pub info: String,
    pub crc_ok: bool,
}

fn describe(ax25: &Ax25Frame, crc_ok: bool) -> Ax25PacketInfo {
    let path = ax25.digis.iter().map(format_call).collect::<Vec<_>>().join(",");
    Ax25PacketInfo {
        src_call: format_call(&ax25.src),
        dest_call: format_call(&ax25.dest),
        path,
        info: String::from_utf8_lossy(&ax25.info).to_string(),
        crc_ok,
    }
}

/// AFSK/AX.25 decoder (spec §4.5 `AfskAx25Decoder`). Consumes demodulated
/// audio and emits one [`DecodedFrame`] per successfully-framed packet,
/// with an [`Ax25PacketInfo`] as metadata.
pub struct AfskAx25Decoder {
    demods: Vec<CorrelationDemod>,
    status: DecoderStatus,
}

impl AfskAx25Decoder {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            demods: vec![CorrelationDemod::new(sample_rate_hz, 1.0), CorrelationDemod::new(sample_rate_hz, 0.5)],
            status: DecoderStatus::Running,
        }
    }
}

impl Decoder for AfskAx25Decoder {
    fn feed_audio(&mut self, samples: &[f32]) -> Vec<DecodedFrame> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        for demod in &mut self.demods {
            for frame in demod.process_buffer(samples) {
                let key_len = frame.payload.len().min(14);
                let mut key = Vec::with_capacity(key_len + 4);
                key.extend_from_slice(&frame.payload[..key_len]);
                key.extend_from_slice(&(frame.payload.len() as u32).to_le_bytes());
                if !seen.insert(key) {
                    continue;
                }

                if let Some(ax25) = parse_ax25(&frame.payload) {
                    let info = describe(&ax25, frame.crc_ok);
                    out.push(DecodedFrame {
                        payload: frame.payload,
                        metadata: serde_json::to_value(&info).unwrap_or(serde_json::Value::Null),
                        timestamp_ns: 0,
                    });
                }
            }
        }
        out
    }

    fn status(&self) -> DecoderStatus {
        self.status
    }

    fn reset(&mut self) {
        for demod in &mut self.demods {
            demod.reset_state();
            demod.energy_acc = 0.0;
            demod.energy_count = 0;
            demod.frames.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_produces_no_frames() {
        let mut decoder = AfskAx25Decoder::new(48_000);
        let silence = vec![0.0f32; 4800];
        assert!(decoder.feed_audio(&silence).is_empty());
        assert_eq!(decoder.status(), DecoderStatus::Running);
    }

    #[test]
    fn crc_matches_known_vector() {
        // "123456789" with CRC-16/X-25 polynomial is the standard check value 0x906E.
        let crc = crc16ccitt(b"123456789");
        assert_eq!(crc, 0x906E);
    }

    #[test]
    fn reset_clears_accumulated_frame_state() {
        let mut decoder = AfskAx25Decoder::new(48_000);
        decoder.demods[0].in_frame = true;
        decoder.demods[0].frame_bits.push(1);
        decoder.reset();
        assert!(!decoder.demods[0].in_frame);
        assert!(decoder.demods[0].frame_bits.is_empty());
    }

    #[test]
    fn address_decode_trims_trailing_spaces_and_reads_ssid() {
        let mut bytes = [0u8; 7];
        for (i, ch) in b"N0CALL".iter().enumerate() {
            bytes[i] = ch << 1;
        }
        bytes[6] = (5 << 1) | 1;
        let addr = decode_ax25_address(&bytes, 0);
        assert_eq!(addr.call, "N0CALL");
        assert_eq!(addr.ssid, 5);
        assert!(addr.last);
    }
}
