//! Cross-platform audio backend
//!
//! Runs the looper engine inside a CPAL duplex stream pair following a
//! lock-free design for real-time safety:
//!
//! - **Control thread**: Sends commands via lock-free ringbuffer
//! - **Audio thread**: Owns the LooperEngine exclusively, processes commands
//! - **Atomics**: Control side reads track state via relaxed atomics (no locks)
//!
//! # Example Usage
//!
//! ```ignore
//! use ostinato_core::audio::{start_audio_system, AudioConfig};
//! use ostinato_core::engine::{LooperCommand, TrackIntent};
//!
//! let config = AudioConfig::default();
//! let mut system = start_audio_system(&config, 8, 30)?;
//!
//! // Trigger track 0 from the control thread
//! system.command_sender.send(LooperCommand::Trigger {
//!     track: 0,
//!     intent: TrackIntent::RecordOrPlay,
//! })?;
//!
//! // Read state via atomics (no locks)
//! let state = system.track_atomics[0].state();
//! ```

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
};
pub use cpal_backend::{
    start_audio_system, AudioSystemResult, CommandSender, CpalAudioHandle,
};
pub use device::{find_device_by_id, get_devices, AudioDevice, DeviceDirection};
pub use error::{AudioError, AudioResult};
