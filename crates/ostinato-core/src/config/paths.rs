//! Path utilities for ostinato configuration files

use std::path::PathBuf;

/// Get the ostinato data directory
///
/// Returns: `~/.config/ostinato`
pub fn data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ostinato")
}

/// Get the default config file path
///
/// Returns: `~/.config/ostinato/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    data_dir().join(filename)
}
