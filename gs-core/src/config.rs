// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support.
//!
//! Config is loaded from `ground-station.toml`. Default search order:
//! 1. Path given via `--config`
//! 2. `./ground-station.toml`
//! 3. `~/.config/ground-station/ground-station.toml`
//! 4. `/etc/ground-station/ground-station.toml`
//!
//! This mirrors the teacher workspace's `trx_app::config::ConfigFile`
//! search-path convention, generalized from a single rig section to the
//! per-SDR map this spec needs.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{GainSetting, SdrConfig, SdrDriverKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, String),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, String),
}

/// Returns search paths for `ground-station.toml`, current directory first.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("ground-station.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("ground-station").join("ground-station.toml"));
    }
    paths.push(PathBuf::from("/etc/ground-station/ground-station.toml"));
    paths
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: Option<String>,
    pub secret_key: Option<String>,
    pub db_path: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_m: Option<f64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            secret_key: None,
            db_path: "ground-station.db".to_string(),
            latitude: None,
            longitude: None,
            altitude_m: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub track_interval_secs: u64,
    pub enable_soapy_discovery: bool,
    pub runonce_soapy_discovery: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_interval_secs: 2,
            enable_soapy_discovery: false,
            runonce_soapy_discovery: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How far ahead passes are (re)generated, in hours (spec §4.7 default 12h).
    pub regenerate_interval_hours: u32,
    /// Conflict-resolution strategy for overlapping passes.
    pub conflict_strategy: crate::model::ConflictStrategy,
    /// Lead time before `task_start_utc` at which the executor validates
    /// and starts an observation (the "δ" of spec §4.7).
    pub start_lead_secs: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            regenerate_interval_hours: 12,
            conflict_strategy: crate::model::ConflictStrategy::Priority,
            start_lead_secs: 10,
        }
    }
}

/// Raw, serializable form of an [`SdrConfig`] (TOML doesn't have a great way
/// to express the richer `SdrConfig` enums directly as a table, so the
/// on-disk shape stays flat and is converted on load).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdrEntryConfig {
    pub driver: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub serial: Option<String>,
    pub antenna: Option<String>,
    pub center_freq_hz: f64,
    pub sample_rate_hz: f64,
    pub gain_mode: String,
    pub gain_value_db: f64,
    pub bias_t: bool,
    pub ppm_error: Option<f64>,
    pub fft_hint_size: usize,
    pub recording_path: Option<String>,
    pub loop_playback: bool,
    pub offset_freq: Option<f64>,
}

impl Default for SdrEntryConfig {
    fn default() -> Self {
        Self {
            driver: "sigmf-playback".to_string(),
            host: None,
            port: None,
            serial: None,
            antenna: None,
            center_freq_hz: 100_000_000.0,
            sample_rate_hz: 2_048_000.0,
            gain_mode: "auto".to_string(),
            gain_value_db: 30.0,
            bias_t: false,
            ppm_error: None,
            fft_hint_size: 2048,
            recording_path: None,
            loop_playback: false,
            offset_freq: None,
        }
    }
}

impl SdrEntryConfig {
    pub fn to_sdr_config(&self, sdr_id: &str) -> Result<SdrConfig, String> {
        let driver = match self.driver.as_str() {
            "rtlsdr" => SdrDriverKind::Rtlsdr,
            "soapy-local" => SdrDriverKind::SoapyLocal,
            "soapy-remote" => SdrDriverKind::SoapyRemote,
            "sigmf-playback" => SdrDriverKind::SigmfPlayback,
            other => return Err(format!("unknown SDR driver: {other}")),
        };
        let gain = match self.gain_mode.as_str() {
            "auto" | "agc" => GainSetting::Agc,
            "manual" => GainSetting::Manual(self.gain_value_db),
            other => return Err(format!("unknown gain mode: {other}")),
        };
        Ok(SdrConfig {
            sdr_id: sdr_id.to_string(),
            driver,
            host: self.host.clone(),
            port: self.port,
            serial: self.serial.clone(),
            antenna: self.antenna.clone(),
            center_freq_hz: self.center_freq_hz,
            sample_rate_hz: self.sample_rate_hz,
            gain,
            bias_t: self.bias_t,
            ppm_error: self.ppm_error,
            fft_hint_size: self.fft_hint_size,
            recording_path: self.recording_path.clone(),
            loop_playback: self.loop_playback,
            offset_freq: self.offset_freq,
        })
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    pub listen: ListenConfig,
    pub tracker: TrackerConfig,
    pub scheduler: SchedulerConfig,
    #[serde(rename = "sdr")]
    pub sdrs: HashMap<String, SdrEntryConfig>,
}

impl ServerConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in default_config_paths() {
            if path.exists() {
                let cfg = Self::load_from_file(&path)?;
                return Ok((cfg, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// Validate cross-field invariants (spec §5/§6/§7), matching the
    /// teacher's `ServerConfig::validate() -> Result<(), String>` style.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen.port == 0 {
            return Err("[listen].port must be > 0".to_string());
        }
        if let Some(lat) = self.general.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err("[general].latitude must be in -90..=90".to_string());
            }
        }
        if let Some(lon) = self.general.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err("[general].longitude must be in -180..=180".to_string());
            }
        }
        if self.tracker.track_interval_secs == 0 {
            return Err("[tracker].track_interval_secs must be > 0".to_string());
        }
        if self.scheduler.regenerate_interval_hours == 0 {
            return Err("[scheduler].regenerate_interval_hours must be > 0".to_string());
        }
        for (id, sdr) in &self.sdrs {
            if sdr.sample_rate_hz <= 0.0 {
                return Err(format!("[sdr.{id}].sample_rate_hz must be > 0"));
            }
            if sdr.to_sdr_config(id).is_err() {
                return Err(format!(
                    "[sdr.{id}] invalid driver/gain_mode: {}/{}",
                    sdr.driver, sdr.gain_mode
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_port() {
        let mut cfg = ServerConfig::default();
        cfg.listen.port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let mut cfg = ServerConfig::default();
        cfg.sdrs.insert("rtl0".to_string(), SdrEntryConfig::default());
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.sdrs.len(), 1);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ground-station.toml");
        std::fs::write(&path, "[listen]\nport = 9090\n").unwrap();
        let cfg = ServerConfig::load_from_file(&path).unwrap();
        assert_eq!(cfg.listen.port, 9090);
    }
}
