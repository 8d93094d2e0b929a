// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! `resolve_decoder_config` (spec §4.5): picks the effective decoder
//! parameters from whichever of manual overrides, a satellite-specific
//! table entry, transmitter metadata, or a modulation-based default,
//! actually supplied a value, in that precedence order.

use gs_core::Modulation;
use serde::{Deserialize, Serialize};

/// Wire framing a decoder understands. Non-exhaustive in spirit: an
/// `ExternalDecoder` can speak a framing this enum never names, since it
/// never inspects the value itself (spec §4.5 `framing ∈ {ax25, usp,
/// geoscan, doka, ...}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    Ax25,
    Usp,
    Geoscan,
    Doka,
    CwTone,
    Other,
}

/// Where each field of a resolved [`DecoderConfig`] ultimately came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Manual,
    SatelliteConfig,
    TransmitterMetadata,
    SmartDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub baudrate: Option<u32>,
    pub framing: Framing,
    pub deviation_hz: Option<u32>,
    pub af_carrier_hz: Option<u32>,
    pub differential: Option<bool>,
    pub packet_size: Option<u32>,
    pub target_sample_rate_hz: u32,
    pub source: ConfigSource,
}

impl DecoderConfig {
    /// Two configs are equal for restart-decision purposes iff these five
    /// fields match (spec §4.5): everything else (source, sample rate,
    /// packet size) may differ without forcing a decoder restart.
    pub fn restart_equivalent(&self, other: &Self) -> bool {
        self.baudrate == other.baudrate
            && self.framing == other.framing
            && self.deviation_hz == other.deviation_hz
            && self.af_carrier_hz == other.af_carrier_hz
            && self.differential == other.differential
    }
}

/// Manual overrides supplied by a user; any field left `None` falls
/// through to the next precedence tier.
#[derive(Debug, Clone, Default)]
pub struct DecoderOverrides {
    pub baudrate: Option<u32>,
    pub framing: Option<Framing>,
    pub deviation_hz: Option<u32>,
    pub af_carrier_hz: Option<u32>,
    pub differential: Option<bool>,
    pub packet_size: Option<u32>,
}

/// A satellite's decoder table entry, e.g. from a TLE catalog annotation.
#[derive(Debug, Clone, Default)]
pub struct SatelliteDecoderEntry {
    pub baudrate: Option<u32>,
    pub framing: Option<Framing>,
    pub deviation_hz: Option<u32>,
    pub af_carrier_hz: Option<u32>,
    pub differential: Option<bool>,
}

/// Metadata carried by a transmitter record (e.g. SatNOGS DB transmitter
/// entry): baud rate and framing as published by the satellite operator.
#[derive(Debug, Clone, Default)]
pub struct TransmitterMetadata {
    pub baudrate: Option<u32>,
    pub framing: Option<Framing>,
    pub deviation_hz: Option<u32>,
}

fn smart_default_baudrate(modulation: Modulation) -> u32 {
    match modulation {
        Modulation::Cw => 20,
        _ => 1200,
    }
}

fn smart_default_framing(modulation: Modulation) -> Framing {
    match modulation {
        Modulation::Cw => Framing::CwTone,
        _ => Framing::Ax25,
    }
}

/// Resolve the effective decoder configuration. `decoder_modulation` drives
/// the smart-default tier; `vfo_freq_hz` is accepted for parity with the
/// contract signature but isn't consulted by any built-in default today.
pub fn resolve_decoder_config(
    decoder_modulation: Modulation,
    satellite: Option<&SatelliteDecoderEntry>,
    transmitter: Option<&TransmitterMetadata>,
    overrides: Option<&DecoderOverrides>,
    _vfo_freq_hz: f64,
    target_sample_rate_hz: u32,
) -> DecoderConfig {
    let mut source = ConfigSource::SmartDefault;
    let mut bump = |tier: ConfigSource| {
        if rank(tier) < rank(source) {
            source = tier;
        }
    };

    let baudrate = if let Some(v) = overrides.and_then(|o| o.baudrate) {
        bump(ConfigSource::Manual);
        Some(v)
    } else if let Some(v) = satellite.and_then(|s| s.baudrate) {
        bump(ConfigSource::SatelliteConfig);
        Some(v)
    } else if let Some(v) = transmitter.and_then(|t| t.baudrate) {
        bump(ConfigSource::TransmitterMetadata);
        Some(v)
    } else {
        Some(smart_default_baudrate(decoder_modulation))
    };

    let framing = if let Some(v) = overrides.and_then(|o| o.framing) {
        bump(ConfigSource::Manual);
        v
    } else if let Some(v) = satellite.and_then(|s| s.framing) {
        bump(ConfigSource::SatelliteConfig);
        v
    } else if let Some(v) = transmitter.and_then(|t| t.framing) {
        bump(ConfigSource::TransmitterMetadata);
        v
    } else {
        smart_default_framing(decoder_modulation)
    };

    let deviation_hz = if let Some(v) = overrides.and_then(|o| o.deviation_hz) {
        bump(ConfigSource::Manual);
        Some(v)
    } else if let Some(v) = satellite.and_then(|s| s.deviation_hz) {
        bump(ConfigSource::SatelliteConfig);
        Some(v)
    } else if let Some(v) = transmitter.and_then(|t| t.deviation_hz) {
        bump(ConfigSource::TransmitterMetadata);
        Some(v)
    } else {
        None
    };

    let af_carrier_hz = if let Some(v) = overrides.and_then(|o| o.af_carrier_hz) {
        bump(ConfigSource::Manual);
        Some(v)
    } else if let Some(v) = satellite.and_then(|s| s.af_carrier_hz) {
        bump(ConfigSource::SatelliteConfig);
        Some(v)
    } else {
        None
    };

    let differential = if let Some(v) = overrides.and_then(|o| o.differential) {
        bump(ConfigSource::Manual);
        Some(v)
    } else if let Some(v) = satellite.and_then(|s| s.differential) {
        bump(ConfigSource::SatelliteConfig);
        Some(v)
    } else {
        None
    };

    let manual_packet_size = overrides.and_then(|o| o.packet_size);

    DecoderConfig {
        baudrate,
        framing,
        deviation_hz,
        af_carrier_hz,
        differential,
        packet_size: manual_packet_size,
        target_sample_rate_hz,
        source,
    }
}

fn rank(source: ConfigSource) -> u8 {
    match source {
        ConfigSource::Manual => 0,
        ConfigSource::SatelliteConfig => 1,
        ConfigSource::TransmitterMetadata => 2,
        ConfigSource::SmartDefault => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_smart_default_with_nothing_supplied() {
        let cfg = resolve_decoder_config(Modulation::Fm, None, None, None, 145_825_000.0, 48_000);
        assert_eq!(cfg.baudrate, Some(1200));
        assert_eq!(cfg.framing, Framing::Ax25);
        assert_eq!(cfg.source, ConfigSource::SmartDefault);
    }

    #[test]
    fn cw_modulation_defaults_to_tone_framing() {
        let cfg = resolve_decoder_config(Modulation::Cw, None, None, None, 14_050_000.0, 8_000);
        assert_eq!(cfg.framing, Framing::CwTone);
        assert_eq!(cfg.baudrate, Some(20));
    }

    #[test]
    fn transmitter_metadata_beats_smart_default() {
        let transmitter = TransmitterMetadata { baudrate: Some(9600), framing: Some(Framing::Geoscan), deviation_hz: None };
        let cfg = resolve_decoder_config(Modulation::Fm, None, Some(&transmitter), None, 0.0, 48_000);
        assert_eq!(cfg.baudrate, Some(9600));
        assert_eq!(cfg.framing, Framing::Geoscan);
        assert_eq!(cfg.source, ConfigSource::TransmitterMetadata);
    }

    #[test]
    fn satellite_entry_beats_transmitter_metadata() {
        let satellite = SatelliteDecoderEntry { baudrate: Some(4800), ..Default::default() };
        let transmitter = TransmitterMetadata { baudrate: Some(9600), framing: None, deviation_hz: None };
        let cfg = resolve_decoder_config(Modulation::Fm, Some(&satellite), Some(&transmitter), None, 0.0, 48_000);
        assert_eq!(cfg.baudrate, Some(4800));
        assert_eq!(cfg.source, ConfigSource::SatelliteConfig);
    }

    #[test]
    fn manual_override_beats_everything() {
        let satellite = SatelliteDecoderEntry { baudrate: Some(4800), ..Default::default() };
        let overrides = DecoderOverrides { baudrate: Some(2400), ..Default::default() };
        let cfg = resolve_decoder_config(Modulation::Fm, Some(&satellite), None, Some(&overrides), 0.0, 48_000);
        assert_eq!(cfg.baudrate, Some(2400));
        assert_eq!(cfg.source, ConfigSource::Manual);
    }

    #[test]
    fn restart_equivalence_ignores_source_and_packet_size() {
        let a = resolve_decoder_config(Modulation::Fm, None, None, None, 0.0, 48_000);
        let mut b = a.clone();
        b.packet_size = Some(256);
        assert!(a.restart_equivalent(&b));
        b.baudrate = Some(9600);
        assert!(!a.restart_equivalent(&b));
    }
}
