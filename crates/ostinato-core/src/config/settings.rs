//! Looper application settings and their YAML persistence

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;
use crate::types::{DEFAULT_NUM_TRACKS, MAX_LOOP_SECONDS, MAX_TRACKS, PREROLL_CAPACITY};

/// Top-level looper configuration
///
/// Persisted as YAML via [`OstinatoConfig::load`] / [`OstinatoConfig::save`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OstinatoConfig {
    /// Number of looper tracks to create
    pub num_tracks: usize,

    /// Upper bound on loop length; each track pre-allocates this much audio
    pub max_loop_seconds: usize,

    /// Pre-roll spliced into an immediately started recording, in
    /// milliseconds. Compensates the latency between playing a sound and
    /// hitting the record trigger.
    pub pre_roll_ms: u32,

    /// Audio device and buffer settings
    pub audio: AudioConfig,
}

impl Default for OstinatoConfig {
    fn default() -> Self {
        Self {
            num_tracks: DEFAULT_NUM_TRACKS,
            max_loop_seconds: MAX_LOOP_SECONDS,
            pre_roll_ms: 0,
            audio: AudioConfig::default(),
        }
    }
}

impl OstinatoConfig {
    /// Track count clamped to the supported range
    pub fn effective_num_tracks(&self) -> usize {
        self.num_tracks.clamp(1, MAX_TRACKS)
    }

    /// Pre-roll length converted to samples at the given rate, bounded by
    /// the pre-roll ring capacity
    pub fn pre_roll_samples(&self, sample_rate: u32) -> usize {
        let samples = (self.pre_roll_ms as u64 * sample_rate as u64 / 1000) as usize;
        samples.min(PREROLL_CAPACITY)
    }

    /// Read the looper config from `path`, falling back to defaults
    ///
    /// A missing file is the normal first-run case. An unreadable or
    /// malformed file is logged and ignored so a bad edit never keeps the
    /// looper from starting.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no config at {:?}, starting with defaults", path);
                return Self::default();
            }
            Err(e) => {
                log::warn!("could not read {:?} ({}), starting with defaults", path, e);
                return Self::default();
            }
        };
        match serde_yaml::from_str(&contents) {
            Ok(config) => {
                log::info!("loaded looper config from {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("malformed config {:?} ({}), starting with defaults", path, e);
                Self::default()
            }
        }
    }

    /// Write the looper config as YAML, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {:?}", parent))?;
        }
        let yaml = serde_yaml::to_string(self).context("serializing looper config")?;
        std::fs::write(path, yaml).with_context(|| format!("writing config to {:?}", path))?;
        log::info!("saved looper config to {:?}", path);
        Ok(())
    }
}
