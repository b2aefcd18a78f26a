//! Persisted looper settings
//!
//! `OstinatoConfig` carries the track count, loop bound, pre-roll, and audio
//! device settings, stored as YAML in the standard config location.
//!
//! # Usage
//!
//! ```ignore
//! use ostinato_core::config::{default_config_path, OstinatoConfig};
//!
//! let path = default_config_path("config.yaml");
//! let config = OstinatoConfig::load(&path);
//! ```

mod paths;
mod settings;

pub use paths::{data_dir, default_config_path};
pub use settings::OstinatoConfig;
