//! Audio backend configuration
//!
//! Defines configuration for the audio system including device selection
//! and buffer settings.

use serde::{Deserialize, Serialize};

/// Maximum buffer size to pre-allocate (covers typical configurations)
/// Common values: 64, 128, 256, 512, 1024, 2048, 4096 frames
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames)
/// 512 frames is a safe default that works on most systems
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default sample rate for the audio system (48kHz)
/// Loop lengths and the tempo grid are derived from whatever rate the
/// device actually delivers, so a fallback rate stays musically correct.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose the default buffer size
    Default,
    /// Request a specific buffer size in frames (may be adjusted by the system)
    Fixed(u32),
    /// Small known-good buffer for responsive overdub triggering
    LowLatency,
}

impl Default for BufferSize {
    fn default() -> Self {
        Self::Default
    }
}

impl BufferSize {
    /// Get the buffer size in frames, or None for system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
            BufferSize::LowLatency => Some(256),
        }
    }

    /// Calculate latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> Option<f32> {
        self.as_frames()
            .map(|frames| (frames as f32 / sample_rate as f32) * 1000.0)
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (JACK, ALSA, etc.)
/// so a device can be selected unambiguously on systems with multiple
/// audio backends available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "JACK", "ALSA", "CoreAudio")
    /// If None, uses the default/preferred host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device for the live signal (None = use system default)
    pub input_device: Option<DeviceId>,

    /// Output device for the track mix (None = use system default)
    pub output_device: Option<DeviceId>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = use device default, typically 44100 or 48000)
    pub sample_rate: Option<u32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            buffer_size: BufferSize::default(),
            sample_rate: None,
        }
    }
}

impl AudioConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            buffer_size: BufferSize::LowLatency,
            ..Default::default()
        }
    }

    /// Set the input device
    pub fn with_input_device(mut self, device: DeviceId) -> Self {
        self.input_device = Some(device);
        self
    }

    /// Set the output device
    pub fn with_output_device(mut self, device: DeviceId) -> Self {
        self.output_device = Some(device);
        self
    }

    /// Set the preferred buffer size
    pub fn with_buffer_size(mut self, size: BufferSize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}
