//! Persistent session configuration
//!
//! Stores the flush cadence, enabled streams, per-stream conversion profiles
//! and the capture directory in a JSON file at
//! `<data_dir>/synchrony/config.json`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use synchrony_core::{ConversionProfile, DataType, Demultiplexer, NotifyFlags};

fn default_flush_interval_ms() -> u64 {
    synchrony_core::DEFAULT_FLUSH_INTERVAL_MS
}

fn default_notify_flags() -> Vec<String> {
    ["EEG", "ECG", "IMPEDANCE", "SATURATION"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Persistent session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between timer-driven flushes
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Enabled stream names ("EEG", "ECG", "ACC", "GYRO", "IMPEDANCE", "SATURATION")
    #[serde(default = "default_notify_flags")]
    pub notify_flags: Vec<String>,
    #[serde(default)]
    pub eeg: Option<ConversionProfile>,
    #[serde(default)]
    pub ecg: Option<ConversionProfile>,
    #[serde(default)]
    pub acc: Option<ConversionProfile>,
    #[serde(default)]
    pub gyro: Option<ConversionProfile>,
    /// Where notification captures are written (None = capture off)
    #[serde(default)]
    pub capture_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            notify_flags: default_notify_flags(),
            eeg: None,
            ecg: None,
            acc: None,
            gyro: None,
            capture_dir: None,
        }
    }
}

impl SessionConfig {
    /// Config file path: `<data_dir>/synchrony/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synchrony")
            .join("config.json")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Enabled streams; unknown names are skipped with a warning
    pub fn flags(&self) -> NotifyFlags {
        let mut flags = NotifyFlags::empty();
        for name in &self.notify_flags {
            match NotifyFlags::from_name(name) {
                Some(flag) => flags.insert(flag),
                None => tracing::warn!(name = %name, "Ignoring unknown stream name in notify_flags"),
            }
        }
        flags
    }

    /// Configured profiles, one per channel stream that has one
    pub fn profiles(&self) -> Vec<(DataType, ConversionProfile)> {
        [
            (DataType::Eeg, &self.eeg),
            (DataType::Ecg, &self.ecg),
            (DataType::Acc, &self.acc),
            (DataType::Gyro, &self.gyro),
        ]
        .into_iter()
        .filter_map(|(data_type, profile)| profile.clone().map(|p| (data_type, p)))
        .collect()
    }

    /// Build a demultiplexer with these flags and profiles
    pub fn build_demultiplexer(&self) -> anyhow::Result<Demultiplexer> {
        let demux = Demultiplexer::new(self.flags());
        for (data_type, profile) in self.profiles() {
            demux
                .configure(data_type, profile)
                .map_err(|e| anyhow::anyhow!("invalid {} profile: {}", data_type, e))?;
        }
        Ok(demux)
    }
}
