use std::path::{Path, PathBuf};

use gbsig_core::apu::{AudioConfig, DEFAULT_SAMPLE_RATE};
use gbsig_core::hardware::Model;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HostModel {
    #[default]
    Dmg,
    Cgb,
}

impl From<HostModel> for Model {
    fn from(model: HostModel) -> Self {
        match model {
            HostModel::Dmg => Model::Dmg,
            HostModel::Cgb => Model::Cgb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HostConfig {
    pub model: HostModel,
    /// Used when no audio device is open; playback follows the device rate.
    pub sample_rate: u32,
    /// Audio stream size in bytes.
    pub stream_capacity: usize,
    /// Playback gain, 0.0 to 1.0.
    pub volume: f32,
    /// Frames between stream diagnostics; 0 disables them.
    pub stats_interval_frames: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        let audio = AudioConfig::default();
        Self {
            model: HostModel::Dmg,
            sample_rate: DEFAULT_SAMPLE_RATE,
            stream_capacity: audio.stream_capacity,
            volume: 0.5,
            stats_interval_frames: 300,
        }
    }
}

impl HostConfig {
    pub fn audio(&self, sample_rate: u32) -> AudioConfig {
        AudioConfig {
            sample_rate,
            stream_capacity: self.stream_capacity,
        }
    }

    pub fn clamped_volume(&self) -> f32 {
        if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("gbsig").join("host.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("gbsig").join("host.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("gbsig")
            .join("host.toml");
    }

    PathBuf::from("host.toml")
}

pub fn parse(text: &str) -> Result<HostConfig, HostError> {
    Ok(toml::from_str::<HostConfig>(text)?)
}

/// Reads `path`, falling back to defaults when it is missing or malformed.
pub fn load_from_file(path: &Path) -> HostConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return HostConfig::default(),
    };

    match parse(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse host config {}: {e}; using defaults",
                path.display()
            );
            HostConfig::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &HostConfig) -> Result<(), HostError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HostError::io(parent, e))?;
    }
    let text = toml::to_string_pretty(cfg)?;
    std::fs::write(path, text).map_err(|e| HostError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("host.toml");
        let cfg = HostConfig {
            model: HostModel::Cgb,
            sample_rate: 48_000,
            stream_capacity: 8192,
            volume: 0.25,
            stats_interval_frames: 60,
        };
        save_to_file(&path, &cfg).unwrap();
        assert_eq!(load_from_file(&path), cfg);
    }

    #[test]
    fn keys_are_kebab_case() {
        let text = toml::to_string_pretty(&HostConfig::default()).unwrap();
        assert!(text.contains("stream-capacity"));
        assert!(text.contains("model = \"dmg\""));
    }

    #[test]
    fn missing_keys_take_defaults() {
        let cfg = parse("model = \"cgb\"\n").unwrap();
        assert_eq!(cfg.model, HostModel::Cgb);
        assert_eq!(cfg.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(Model::from(cfg.model), Model::Cgb);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.toml");
        std::fs::write(&path, "model = 7\nvolume = [").unwrap();
        assert_eq!(load_from_file(&path), HostConfig::default());
        assert!(parse("model = \"sgb\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_from_file(&dir.path().join("absent.toml"));
        assert_eq!(cfg, HostConfig::default());
    }

    #[test]
    fn volume_is_clamped() {
        let mut cfg = HostConfig {
            volume: 3.0,
            ..HostConfig::default()
        };
        assert_eq!(cfg.clamped_volume(), 1.0);
        cfg.volume = f32::NAN;
        assert_eq!(cfg.clamped_volume(), 0.0);
    }
}
