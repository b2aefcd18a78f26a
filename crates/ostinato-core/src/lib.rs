//! Ostinato Core - Real-time multi-track looper engine

pub mod audio;
pub mod config;
pub mod engine;
pub mod transport;
pub mod types;

pub use types::*;
