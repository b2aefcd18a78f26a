//! CPAL audio backend implementation
//!
//! Runs the looper as a duplex pair of CPAL streams: a capture stream feeds
//! the live input into a lock-free ring buffer, and the playback stream owns
//! the `LooperEngine` and drives it once per output block.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Control Thread  │───push()───────────►│   Command Queue     │
//! │  (UI / stdin)    │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         │                                           │
//!         │ Relaxed atomics                           │ pop()
//!         ▼                                           ▼
//! ┌──────────────────┐   ┌──────────────┐  ┌─────────────────────┐
//! │   TrackAtomics   │◄──│ Input Stream │─►│   Output Stream     │
//! │   (lock-free)    │   │ (mono downmix│  │  (owns LooperEngine)│
//! └──────────────────┘   │  into SPSC)  │  └─────────────────────┘
//!                        └──────────────┘
//! ```
//!
//! The input stream never blocks: it downmixes each captured frame to mono
//! and pushes it into the sample queue, dropping samples if the output side
//! falls behind. The output stream pops whatever input is available, pads
//! underruns with silence, and fans the engine's mono mix out to every
//! output channel.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};
use super::device::{find_device_by_id, get_default_cpal_device, DeviceDirection};
use super::error::{AudioError, AudioResult};
use crate::engine::{command_channel, LooperCommand, LooperEngine, TrackAtomics};
use crate::transport::TransportClock;
use crate::types::{MonoBuffer, Sample};

/// CPAL-specific audio handle
///
/// Keeps the audio streams alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    /// Capture stream feeding the input queue
    _input_stream: Stream,
    /// Playback stream owning the engine
    _output_stream: Stream,
    /// Sample rate of the audio system
    sample_rate: u32,
    /// Actual buffer size in frames (as negotiated with the device)
    buffer_size: u32,
}

impl CpalAudioHandle {
    /// Get the sample rate of the audio system
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the actual buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Get the audio latency in milliseconds (one-way, output only)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Result of starting the audio system
///
/// Contains all the handles and communication channels needed by the
/// control side.
pub struct AudioSystemResult {
    /// Handle to keep audio alive (drop to stop)
    pub handle: CpalAudioHandle,
    /// Command sender for the control thread (lock-free)
    pub command_sender: CommandSender,
    /// Per-track atomics for lock-free state reads, in track order
    pub track_atomics: Vec<Arc<TrackAtomics>>,
    /// Shared transport clock (read-only use outside the audio thread)
    pub transport: Arc<TransportClock>,
    /// Sample rate of the audio system
    pub sample_rate: u32,
    /// Actual buffer size in frames
    pub buffer_size: u32,
    /// Audio latency in milliseconds (one-way, output only)
    pub latency_ms: f32,
}

/// Command sender for the control thread
///
/// Wraps the lock-free producer for sending LooperCommand to the audio
/// thread. All operations are non-blocking.
pub struct CommandSender {
    pub(crate) producer: rtrb::Producer<LooperCommand>,
}

impl CommandSender {
    /// Send a command to the looper engine (non-blocking)
    ///
    /// Returns `Ok(())` if the command was queued successfully,
    /// or `Err(cmd)` if the queue is full (command is returned).
    pub fn send(&mut self, cmd: LooperCommand) -> Result<(), LooperCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }
}

/// Start the duplex audio system with the given configuration
///
/// Builds the capture and playback streams, wires them together through the
/// input sample queue, and hands the engine to the playback callback.
pub fn start_audio_system(
    config: &AudioConfig,
    num_tracks: usize,
    max_loop_seconds: usize,
) -> AudioResult<AudioSystemResult> {
    let input_device = match &config.input_device {
        Some(id) => find_device_by_id(id, DeviceDirection::Input)?,
        None => get_default_cpal_device(DeviceDirection::Input)?,
    };
    let output_device = match &config.output_device {
        Some(id) => find_device_by_id(id, DeviceDirection::Output)?,
        None => get_default_cpal_device(DeviceDirection::Output)?,
    };

    let input_name = input_device.name().unwrap_or_else(|_| "Unknown".to_string());
    let output_name = output_device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Input device: {}", input_name);
    log::info!("Output device: {}", output_name);

    let (input_supported, input_buffer_size) =
        get_stream_config(&input_device, config, DeviceDirection::Input)?;
    let (output_supported, output_buffer_size) =
        get_stream_config(&output_device, config, DeviceDirection::Output)?;

    let input_rate = input_supported.sample_rate().0;
    let output_rate = output_supported.sample_rate().0;
    // Both sides must agree; resampling the live input would add latency
    if input_rate != output_rate {
        return Err(AudioError::SampleRateMismatch {
            input: input_rate,
            output: output_rate,
        });
    }
    let sample_rate = output_rate;
    // Use the larger buffer size if they differ (for stability)
    let buffer_size = input_buffer_size.max(output_buffer_size);

    let input_stream_config = StreamConfig {
        channels: input_supported.channels(),
        sample_rate: input_supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };
    let output_stream_config = StreamConfig {
        channels: output_supported.channels(),
        sample_rate: output_supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;
    log::info!(
        "Audio config: in {}ch / out {}ch, {}Hz, {} frames (~{:.1}ms latency)",
        input_stream_config.channels,
        output_stream_config.channels,
        sample_rate,
        buffer_size,
        latency_ms
    );

    // Create engine and extract the lock-free state handles
    let engine = LooperEngine::new(num_tracks, sample_rate, max_loop_seconds);
    let track_atomics = engine.track_atomics();
    let transport = engine.transport();

    let (command_tx, command_rx) = command_channel();

    // Lock-free ring buffer carrying mono input to the output stream.
    // Capacity: 4x buffer size to absorb timing jitter between streams.
    let input_queue_capacity = (buffer_size as usize) * 4;
    let (input_producer, input_consumer) = rtrb::RingBuffer::<Sample>::new(input_queue_capacity);
    log::debug!(
        "Input sample ring buffer created with capacity {} samples",
        input_queue_capacity
    );

    let input_stream =
        build_input_stream(&input_device, &input_stream_config, input_producer)?;
    let output_stream = build_output_stream(
        &output_device,
        &output_stream_config,
        engine,
        command_rx,
        input_consumer,
    )?;

    input_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Input: {}", e)))?;
    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(format!("Output: {}", e)))?;

    log::info!("Audio streams started (duplex, lock-free)");

    let handle = CpalAudioHandle {
        _input_stream: input_stream,
        _output_stream: output_stream,
        sample_rate,
        buffer_size,
    };

    Ok(AudioSystemResult {
        handle,
        command_sender: CommandSender {
            producer: command_tx,
        },
        track_atomics,
        transport,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// Get the best stream configuration for a device in one direction
///
/// Returns (SupportedStreamConfig, actual_buffer_size_in_frames)
fn get_stream_config(
    device: &cpal::Device,
    config: &AudioConfig,
    direction: DeviceDirection,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<cpal::SupportedStreamConfigRange> = match direction {
        DeviceDirection::Input => device
            .supported_input_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
        DeviceDirection::Output => device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .collect(),
    };

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported stream configurations".to_string(),
        ));
    }

    let target_sample_rate = config
        .sample_rate
        .unwrap_or(super::config::DEFAULT_SAMPLE_RATE);

    // Prefer f32 format with the target sample rate in range
    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .find(|c| {
            target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable stream configuration found".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let stream_config = best_config.clone().with_sample_rate(sample_rate);

    let buffer_size = match config.buffer_size {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        BufferSize::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE as u32),
        BufferSize::LowLatency => 256,
    };

    log::debug!(
        "Selected buffer size: {} frames for {:?} mode",
        buffer_size,
        config.buffer_size
    );

    Ok((stream_config, buffer_size))
}

/// Build the capture stream
///
/// Downmixes each captured frame to mono and pushes it into the input
/// queue. On a full queue samples are dropped; the output side pads the
/// gap with silence.
fn build_input_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: rtrb::Producer<Sample>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels) {
                    let mono = frame.iter().sum::<f32>() / channels as f32;
                    if producer.push(mono).is_err() {
                        // Queue full: output stream is behind, drop the rest
                        break;
                    }
                }
            },
            move |err| {
                log::error!("Input audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}

/// State owned by the playback callback
struct OutputCallbackState {
    engine: LooperEngine,
    command_rx: rtrb::Consumer<LooperCommand>,
    input_rx: rtrb::Consumer<Sample>,
    /// Pre-allocated mono work buffer
    io_buffer: MonoBuffer,
}

impl OutputCallbackState {
    fn new(
        engine: LooperEngine,
        command_rx: rtrb::Consumer<LooperCommand>,
        input_rx: rtrb::Consumer<Sample>,
    ) -> Self {
        Self {
            engine,
            command_rx,
            input_rx,
            io_buffer: MonoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    /// Run one engine block: gather input, apply commands, process
    fn process(&mut self, n_frames: usize) {
        // Set working buffer length (RT-safe: no allocation)
        self.io_buffer.set_len_from_capacity(n_frames);

        // Pull whatever input is available; pad underruns with silence
        for sample in self.io_buffer.as_mut_slice() {
            *sample = self.input_rx.pop().unwrap_or(0.0);
        }

        self.engine.process_commands(&mut self.command_rx);
        self.engine.process(self.io_buffer.as_mut_slice());
    }

    fn mix(&self) -> &[Sample] {
        self.io_buffer.as_slice()
    }
}

/// Build the playback stream, handing it exclusive ownership of the engine
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    engine: LooperEngine,
    command_rx: rtrb::Consumer<LooperCommand>,
    input_rx: rtrb::Consumer<Sample>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let mut state = OutputCallbackState::new(engine, command_rx, input_rx);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let n_frames = data.len() / channels;
                state.process(n_frames);

                // Fan the mono mix out to every output channel
                let mix = state.mix();
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    let sample = if i < mix.len() { mix[i] } else { 0.0 };
                    for ch in frame.iter_mut() {
                        *ch = sample;
                    }
                }
            },
            move |err| {
                log::error!("Output audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}
